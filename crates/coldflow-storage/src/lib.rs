// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Coldflow send scheduler.
//!
//! Three concerns live here:
//! - the durable dispatch queue (`queue`): send-request rows with a
//!   race-free status-guarded claim,
//! - reputation persistence (`reputation`): day-keyed counters, the outcome
//!   ledger, domain counters, and account metadata for restart recovery,
//! - connection lifecycle (`database`): PRAGMAs, WAL, idempotent schema.

pub mod database;
pub mod queue;
pub mod reputation;

pub use database::{ts_from_string, ts_to_string, Database};
pub use reputation::{AccountMeta, OutcomeCounts};
