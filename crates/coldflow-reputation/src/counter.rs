// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Day-keyed atomic counter.
//!
//! Packs `(day, count)` into one `AtomicU64` so the midnight rollover and
//! the cap check are a single compare-and-swap: no read-then-write window,
//! no reset mutation. A counter read under yesterday's key is simply zero.

use std::sync::atomic::{AtomicU64, Ordering};

fn pack(day: u32, count: u32) -> u64 {
    (u64::from(day) << 32) | u64::from(count)
}

fn unpack(v: u64) -> (u32, u32) {
    ((v >> 32) as u32, v as u32)
}

/// A per-account counter that implicitly resets when the day key changes.
#[derive(Debug, Default)]
pub struct DayCounter(AtomicU64);

impl DayCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Current count for `today`; stale days read as zero.
    pub fn get(&self, today: u32) -> u32 {
        let (day, count) = unpack(self.0.load(Ordering::Acquire));
        if day == today {
            count
        } else {
            0
        }
    }

    /// Atomically increment if the result stays within `cap`.
    ///
    /// This is the race-safe check-and-increment the whole scheduler hangs
    /// off: under concurrent callers at most `cap` increments can ever
    /// succeed for one day. Returns the new count, or `Err(current)` when
    /// the cap has no room left.
    pub fn try_increment(&self, today: u32, cap: u32) -> Result<u32, u32> {
        let mut result = 0;
        match self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
            let (day, count) = unpack(v);
            let count = if day == today { count } else { 0 };
            if count >= cap {
                None
            } else {
                result = count + 1;
                Some(pack(today, count + 1))
            }
        }) {
            Ok(_) => Ok(result),
            Err(v) => {
                let (day, count) = unpack(v);
                Err(if day == today { count } else { 0 })
            }
        }
    }

    /// Unconditional increment (no cap), returning the new count.
    pub fn increment(&self, today: u32) -> u32 {
        let mut result = 0;
        let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
            let (day, count) = unpack(v);
            let count = if day == today { count } else { 0 };
            result = count + 1;
            Some(pack(today, count + 1))
        });
        result
    }

    /// Return a previously reserved slot. No-ops if the day has rolled
    /// over since the reservation (the new day starts from zero anyway).
    pub fn decrement(&self, today: u32) -> u32 {
        let mut result = 0;
        match self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
            let (day, count) = unpack(v);
            if day != today || count == 0 {
                None
            } else {
                result = count - 1;
                Some(pack(day, count - 1))
            }
        }) {
            Ok(_) => result,
            Err(_) => self.get(today),
        }
    }

    /// Overwrite the count for `today` (startup hydration).
    pub fn set(&self, today: u32, value: u32) {
        self.0.store(pack(today, value), Ordering::Release);
    }
}
