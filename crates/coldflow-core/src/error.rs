// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Coldflow send scheduler.

use thiserror::Error;

use crate::types::{AccountId, ClaimId};

/// The primary error type used across all Coldflow crates.
///
/// Capacity and availability conditions are deliberately NOT represented
/// here: an empty eligible account set or a full queue is normal steady
/// state and is modeled as a value (`Unavailable`, deferred queue rows),
/// never as an error.
#[derive(Debug, Error)]
pub enum ColdflowError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database open, query failure, corrupt row).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transport adapter setup errors (bad credentials reference, relay
    /// config). Per-send failures use [`crate::types::TransportFailure`].
    #[error("transport error: {0}")]
    Transport(String),

    /// An atomic increment would push an account past its effective daily cap.
    ///
    /// Recoverable by construction: the allocator excludes the account and
    /// retries; this never reaches producers.
    #[error("daily cap reached for {account}: {cap}")]
    CapExceeded { account: AccountId, cap: u32 },

    /// A claim token was redeemed after its expiry had already swept it.
    #[error("claim {claim} expired before redemption")]
    ClaimExpired { claim: ClaimId },

    /// A follow-up with thread affinity was about to dispatch from the wrong
    /// account. This corrupts conversation threading and must fail loudly
    /// rather than send.
    #[error("thread affinity violation: expected {expected}, got {actual}")]
    ThreadAffinityViolation {
        expected: AccountId,
        actual: AccountId,
    },

    /// The sender loop halted after too many consecutive transport failures
    /// across all accounts (systemic outage, e.g. revoked credentials).
    #[error("circuit breaker open after {failures} consecutive transport failures")]
    CircuitOpen { failures: u32 },

    /// An operation referenced an account that is not configured.
    #[error("unknown account: {0}")]
    UnknownAccount(AccountId),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
