// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sender core for Coldflow: the account allocator, dispatch queue,
//! worker loop, transport circuit breaker, and scheduler assembly.
//!
//! Producers talk to [`Outreach`]; operators run [`Scheduler`]. Everything
//! in between — claiming an account atomically, pacing, retry/backoff,
//! crash recovery — happens inside the worker loop.

pub mod allocator;
pub mod breaker;
pub mod queue;
pub mod scheduler;
pub mod shutdown;
pub mod worker;


pub use allocator::{AccountAllocator, Allocation, AllocationOutcome};
pub use breaker::CircuitBreaker;
pub use queue::DispatchQueue;
pub use scheduler::{Outreach, Scheduler};
pub use worker::SenderWorker;
