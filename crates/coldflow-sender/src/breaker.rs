// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport circuit breaker.
//!
//! Counts consecutive transport-level failures across ALL accounts. Past
//! the threshold the sender loop halts entirely: a systemic outage (revoked
//! credentials, relay down) must surface as one loud stop, not hide inside
//! per-account cooldowns. Distinct from the per-account bounce-rate
//! breaker in the reputation store.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tracing::{error, warn};

/// Consecutive-failure breaker shared by all sender workers.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    consecutive: AtomicU32,
    open: AtomicBool,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive: AtomicU32::new(0),
            open: AtomicBool::new(false),
        }
    }

    /// Record one transport-level failure. Returns `true` if this failure
    /// tripped the breaker.
    pub fn record_failure(&self) -> bool {
        let count = self.consecutive.fetch_add(1, Ordering::AcqRel) + 1;
        if count >= self.threshold {
            let tripped = !self.open.swap(true, Ordering::AcqRel);
            if tripped {
                error!(
                    consecutive = count,
                    threshold = self.threshold,
                    "circuit breaker tripped, halting sender loop"
                );
            }
            return tripped;
        }
        warn!(
            consecutive = count,
            threshold = self.threshold,
            "consecutive transport failure"
        );
        false
    }

    /// A successful send resets the streak. Once open, the breaker stays
    /// open: recovery is an operator restart, not silent self-healing.
    pub fn record_success(&self) {
        self.consecutive.store(0, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn failures(&self) -> u32 {
        self.consecutive.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_at_threshold() {
        let b = CircuitBreaker::new(3);
        assert!(!b.record_failure());
        assert!(!b.record_failure());
        assert!(!b.is_open());
        assert!(b.record_failure(), "third failure should trip");
        assert!(b.is_open());
        // Tripping again reports false (already open).
        assert!(!b.record_failure());
    }

    #[test]
    fn success_resets_the_streak() {
        let b = CircuitBreaker::new(3);
        b.record_failure();
        b.record_failure();
        b.record_success();
        assert_eq!(b.failures(), 0);
        b.record_failure();
        b.record_failure();
        assert!(!b.is_open(), "streak restarted after a success");
    }

    #[test]
    fn open_breaker_stays_open() {
        let b = CircuitBreaker::new(1);
        b.record_failure();
        assert!(b.is_open());
        b.record_success();
        assert!(b.is_open(), "an open breaker does not self-heal");
    }
}
