// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Coldflow send scheduler.
//!
//! This crate provides the foundational error type, identifiers, domain
//! types, and the transport trait used throughout the Coldflow workspace.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ColdflowError;
pub use traits::TransportAdapter;
pub use types::{
    Account, AccountId, AccountState, AccountSummary, ClaimId, ClaimToken, FailureKind,
    OutboundEmail, Recipient, RequestId, RequestKind, RequestStatus, SendOutcome, SendReceipt,
    SendRequest, ThreadHeaders, TransportFailure,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_kind_are_distinct_namespaces() {
        // Both serialize snake_case; make sure parsing stays strict.
        use std::str::FromStr;
        assert!(RequestStatus::from_str("initial").is_err());
        assert!(RequestKind::from_str("pending").is_err());
    }

    #[test]
    fn transport_adapter_is_object_safe() {
        fn _takes_dyn(_t: &dyn TransportAdapter) {}
    }

    #[test]
    fn send_outcome_parses_ledger_rows() {
        use std::str::FromStr;
        for s in ["sent", "bounced", "complained", "rejected"] {
            assert!(SendOutcome::from_str(s).is_ok(), "{s} should parse");
        }
    }
}
