// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pacing policies for the Coldflow send scheduler.
//!
//! Three pure-ish leaves the allocator consults before every send:
//! - [`calendar::CalendarGate`] — is sending allowed at all right now?
//! - [`sessions::SessionPlanner`] — is this account inside a planned burst?
//! - [`jitter::JitterPolicy`] — when may this account send next?

pub mod calendar;
pub mod jitter;
pub mod sessions;

pub use calendar::{CalendarGate, ClosedReason};
pub use jitter::{hour_multiplier, JitterPolicy, PaceContext};
pub use sessions::{
    availability, plan_sessions, Session, SessionAvailability, SessionPlanner,
};
