// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Warm-up and warm-down ramps.
//!
//! Young accounts ramp their daily cap up week by week from their first
//! recorded send. Accounts returning from a provider block ramp back up
//! over three days before resuming their normal cap.

use chrono::{DateTime, NaiveDate, Utc};

use coldflow_config::model::WarmupConfig;

/// Warm-down schedule after an unblock: day 0 -> 3, day 1 -> 5, day 2 -> 10,
/// then back to normal.
const WARMDOWN_RAMP: [u32; 3] = [3, 5, 10];

/// 1-based warm-up week from the first recorded send. An account that has
/// never sent is in week 1.
pub fn warmup_week(first_send_day: Option<NaiveDate>, today: NaiveDate) -> u32 {
    let Some(first) = first_send_day else {
        return 1;
    };
    let age_days = (today - first).num_days().max(0) as u32;
    age_days / 7 + 1
}

/// The weekly ramp limit; `None` when warm-up is disabled.
pub fn warmup_cap(config: &WarmupConfig, week: u32) -> Option<u32> {
    if !config.enabled {
        return None;
    }
    Some(match week {
        0 | 1 => config.week1_limit,
        2 => config.week2_limit,
        3 => config.week3_limit,
        _ => config.week4_limit,
    })
}

/// Reduced cap for an account recently returned from a block, keyed by
/// whole days since the unblock instant. `None` once the ramp is over.
pub fn warmdown_cap(unblocked_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<u32> {
    let anchor = unblocked_at?;
    if now < anchor {
        return None;
    }
    let days = (now - anchor).num_days();
    WARMDOWN_RAMP.get(days as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn week_progression() {
        let first = day("2026-03-02");
        assert_eq!(warmup_week(Some(first), day("2026-03-02")), 1);
        assert_eq!(warmup_week(Some(first), day("2026-03-08")), 1);
        assert_eq!(warmup_week(Some(first), day("2026-03-09")), 2);
        assert_eq!(warmup_week(Some(first), day("2026-03-23")), 4);
        assert_eq!(warmup_week(Some(first), day("2026-06-01")), 13);
    }

    #[test]
    fn unsent_account_is_week_one() {
        assert_eq!(warmup_week(None, day("2026-03-02")), 1);
    }

    #[test]
    fn weekly_caps_follow_config() {
        let config = WarmupConfig::default();
        assert_eq!(warmup_cap(&config, 1), Some(5));
        assert_eq!(warmup_cap(&config, 2), Some(12));
        assert_eq!(warmup_cap(&config, 3), Some(25));
        assert_eq!(warmup_cap(&config, 4), Some(45));
        assert_eq!(warmup_cap(&config, 9), Some(45));
    }

    #[test]
    fn disabled_warmup_has_no_cap() {
        let mut config = WarmupConfig::default();
        config.enabled = false;
        assert_eq!(warmup_cap(&config, 1), None);
    }

    #[test]
    fn warmdown_ramp_over_three_days() {
        let unblocked = Utc::now();
        assert_eq!(warmdown_cap(Some(unblocked), unblocked), Some(3));
        assert_eq!(
            warmdown_cap(Some(unblocked), unblocked + Duration::days(1)),
            Some(5)
        );
        assert_eq!(
            warmdown_cap(Some(unblocked), unblocked + Duration::days(2)),
            Some(10)
        );
        assert_eq!(warmdown_cap(Some(unblocked), unblocked + Duration::days(3)), None);
    }

    #[test]
    fn no_unblock_means_no_warmdown() {
        assert_eq!(warmdown_cap(None, Utc::now()), None);
    }
}
