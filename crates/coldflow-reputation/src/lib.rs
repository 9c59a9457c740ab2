// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reputation store for the Coldflow send scheduler.
//!
//! Owns all mutable per-account scheduling state: day-keyed send counters
//! with atomic cap enforcement, claim tokens with expiry, cooldowns,
//! provider blocks with warm-down, warm-up ramps, the bounce-rate breaker,
//! and the recipient-domain throttle. Everything else in the system reads
//! snapshots from here and mutates through its atomic operations.

pub mod counter;
pub mod domains;
pub mod store;
pub mod warmup;

pub use domains::DomainThrottle;
pub use store::{Candidate, ClaimDenied, ReputationStore};
pub use warmup::{warmdown_cap, warmup_cap, warmup_week};
