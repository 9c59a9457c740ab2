// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Jitter/timing policy: human-like cooldowns between sends.
//!
//! Combines a uniform base delay, an hour-of-day multiplier, and Gaussian
//! jitter (2σ within the configured ±range). Queries are monotonic per
//! account: without an intervening send, repeated calls never move the
//! allowed instant earlier. When a global daily target is set and the fleet
//! is behind, cooldowns shorten toward a deliverability floor — catch-up
//! only accelerates, never slows.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::debug;

use coldflow_config::model::PacingConfig;
use coldflow_core::types::AccountId;

/// Hard lower bound on any cooldown, for deliverability.
const FLOOR_MINS: i64 = 5;
/// Catch-up pacing bounds in minutes.
const CATCHUP_FLOOR_MINS: f64 = 3.0;
const CATCHUP_CEILING_MINS: f64 = 20.0;

/// Multiplier applied to the base cooldown by local hour of day. Higher
/// means longer delays. The profile is deliberately flat (max 1.15) so it
/// reads human without gutting throughput.
pub fn hour_multiplier(hour: u32) -> f64 {
    match hour {
        7 => 1.1,
        8 => 1.05,
        9 | 10 => 1.0,
        11 => 1.05,
        12 => 1.15, // lunch
        13 => 1.05,
        14 | 15 => 1.0,
        16 => 1.05,
        17 => 1.1,
        18 => 1.15,
        _ => 1.0,
    }
}

/// Fleet pacing context for catch-up toward a global daily target.
#[derive(Debug, Clone, Copy)]
pub struct PaceContext {
    pub global_daily_target: u32,
    pub sent_today_total: u32,
    pub active_accounts: u32,
    pub window_end_hour: u8,
}

/// Turns nominal delays into randomized, monotonic per-account cooldowns.
pub struct JitterPolicy {
    tz: Tz,
    config: PacingConfig,
    rng: Mutex<rand::rngs::StdRng>,
    /// Per-account high-water marks (unix millis) enforcing monotonicity.
    marks: DashMap<AccountId, i64>,
}

impl JitterPolicy {
    pub fn new(config: PacingConfig, tz: Tz) -> Self {
        let rng = match config.seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_entropy(),
        };
        Self {
            tz,
            config,
            rng: Mutex::new(rng),
            marks: DashMap::new(),
        }
    }

    /// Uniform base delay drawn from the configured range.
    pub fn base_delay(&self) -> Duration {
        let mut rng = self.rng.lock().expect("rng lock");
        let mins = rng.gen_range(self.config.min_delay_mins..=self.config.max_delay_mins);
        Duration::minutes(i64::from(mins))
    }

    /// Apply the hour multiplier and Gaussian jitter to a base delay.
    ///
    /// σ is chosen so 2σ equals the configured jitter range: ~95% of draws
    /// land within ±jitter_pct of the adjusted base.
    fn jittered(&self, base: Duration, local_hour: u32) -> Duration {
        let adjusted = base.num_minutes() as f64 * hour_multiplier(local_hour);
        let sigma = adjusted * self.config.jitter_pct / 2.0;
        let mins = if sigma > 0.0 {
            let normal = Normal::new(adjusted, sigma).expect("valid normal distribution");
            let mut rng = self.rng.lock().expect("rng lock");
            normal.sample(&mut *rng)
        } else {
            adjusted
        };
        Duration::minutes((mins.round() as i64).max(FLOOR_MINS))
    }

    /// Shorten the cooldown when the fleet is behind its daily target.
    /// Returns the chosen cooldown; never longer than `normal`.
    fn catch_up(&self, normal: Duration, now: DateTime<Utc>, pace: &PaceContext) -> Duration {
        if pace.global_daily_target == 0 {
            return normal;
        }
        let remaining = pace
            .global_daily_target
            .saturating_sub(pace.sent_today_total);
        if remaining == 0 || pace.active_accounts == 0 {
            return normal;
        }

        let local = now.with_timezone(&self.tz);
        let hour = local.hour() as f64 + f64::from(local.minute()) / 60.0;
        let hours_left = (f64::from(pace.window_end_hour) - hour).max(0.25);

        let per_account_per_hour =
            f64::from(remaining) / hours_left / f64::from(pace.active_accounts);
        let ideal_mins = if per_account_per_hour > 0.0 {
            60.0 / per_account_per_hour
        } else {
            return normal;
        };

        let dynamic = Duration::minutes(
            ideal_mins.clamp(CATCHUP_FLOOR_MINS, CATCHUP_CEILING_MINS).round() as i64,
        );
        let chosen = dynamic.min(normal);
        if chosen < normal {
            debug!(
                remaining,
                hours_left,
                cooldown_mins = chosen.num_minutes(),
                normal_mins = normal.num_minutes(),
                "behind daily target, accelerating"
            );
        }
        chosen
    }

    /// The earliest instant the account may send next.
    ///
    /// Monotonic: without an intervening [`note_send`](Self::note_send), the
    /// result never moves earlier than a previous call's result for the
    /// same account.
    pub fn next_allowed_at(
        &self,
        account: &AccountId,
        base: Duration,
        now: DateTime<Utc>,
        pace: Option<PaceContext>,
    ) -> DateTime<Utc> {
        let local_hour = now.with_timezone(&self.tz).hour();
        let mut cooldown = self.jittered(base, local_hour);
        if let Some(ref pace) = pace {
            cooldown = self.catch_up(cooldown, now, pace);
        }
        let candidate = now + cooldown;

        let mut entry = self.marks.entry(account.clone()).or_insert(i64::MIN);
        let candidate_ms = candidate.timestamp_millis();
        if candidate_ms > *entry {
            *entry = candidate_ms;
            candidate
        } else {
            DateTime::from_timestamp_millis(*entry).unwrap_or(candidate)
        }
    }

    /// Clear the monotonic mark after a send completes, so the next
    /// cooldown is computed fresh from the send instant.
    pub fn note_send(&self, account: &AccountId) {
        self.marks.remove(account);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    fn policy(seed: u64) -> JitterPolicy {
        let mut config = PacingConfig::default();
        config.seed = Some(seed);
        JitterPolicy::new(config, New_York)
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn lunch_hour_is_slowest() {
        let max = (0..24).map(hour_multiplier).fold(0.0_f64, f64::max);
        assert_eq!(hour_multiplier(12), max);
        assert_eq!(hour_multiplier(9), 1.0);
    }

    #[test]
    fn jittered_delay_stays_within_sane_bounds() {
        let p = policy(7);
        // Many draws: all at least the floor, none absurdly large.
        for _ in 0..500 {
            let d = p.jittered(Duration::minutes(25), 12);
            assert!(d >= Duration::minutes(FLOOR_MINS), "below floor: {d}");
            assert!(d <= Duration::minutes(90), "implausibly large: {d}");
        }
    }

    #[test]
    fn next_allowed_at_is_after_now() {
        let p = policy(11);
        let now = utc("2026-03-03T15:00:00Z");
        let at = p.next_allowed_at(&"alice".into(), Duration::minutes(25), now, None);
        assert!(at > now);
    }

    #[test]
    fn repeated_queries_are_monotonic() {
        let p = policy(3);
        let account: AccountId = "alice".into();
        let now = utc("2026-03-03T15:00:00Z");

        let mut prev = p.next_allowed_at(&account, Duration::minutes(25), now, None);
        for i in 1..50 {
            let at = p.next_allowed_at(
                &account,
                Duration::minutes(25),
                now + Duration::seconds(i),
                None,
            );
            assert!(at >= prev, "monotonicity violated: {at} < {prev}");
            prev = at;
        }
    }

    #[test]
    fn note_send_resets_the_mark() {
        let p = policy(5);
        let account: AccountId = "alice".into();
        let now = utc("2026-03-03T15:00:00Z");

        // Push the mark far into the future.
        let far = p.next_allowed_at(&account, Duration::minutes(300), now, None);
        assert!(far > now + Duration::hours(2));

        p.note_send(&account);
        let fresh = p.next_allowed_at(&account, Duration::minutes(20), now, None);
        assert!(fresh < far, "mark should clear after a send");
    }

    #[test]
    fn accounts_have_independent_marks() {
        let p = policy(9);
        let now = utc("2026-03-03T15:00:00Z");
        let a = p.next_allowed_at(&"alice".into(), Duration::minutes(300), now, None);
        let b = p.next_allowed_at(&"bob".into(), Duration::minutes(20), now, None);
        assert!(b < a, "bob must not inherit alice's mark");
    }

    #[test]
    fn catch_up_accelerates_when_behind() {
        let p = policy(13);
        // 12:00 EST with 5 hours left, 140 remaining across 2 accounts:
        // 14/acct/hr -> ~4 min ideal, well under any normal cooldown.
        let now = utc("2026-03-03T15:00:00Z");
        let pace = PaceContext {
            global_daily_target: 160,
            sent_today_total: 20,
            active_accounts: 2,
            window_end_hour: 17,
        };
        let chosen = p.catch_up(Duration::minutes(30), now, &pace);
        assert!(chosen < Duration::minutes(30));
        assert!(chosen >= Duration::minutes(CATCHUP_FLOOR_MINS as i64));
    }

    #[test]
    fn catch_up_never_slows_down() {
        let p = policy(17);
        let now = utc("2026-03-03T15:00:00Z");
        // Nearly done: ideal cooldown is long, but we keep the normal pace.
        let pace = PaceContext {
            global_daily_target: 100,
            sent_today_total: 99,
            active_accounts: 8,
            window_end_hour: 17,
        };
        let normal = Duration::minutes(12);
        assert_eq!(p.catch_up(normal, now, &pace), normal);
    }

    #[test]
    fn catch_up_noop_when_target_met_or_unset() {
        let p = policy(19);
        let now = utc("2026-03-03T15:00:00Z");
        let normal = Duration::minutes(25);
        let met = PaceContext {
            global_daily_target: 50,
            sent_today_total: 50,
            active_accounts: 4,
            window_end_hour: 17,
        };
        assert_eq!(p.catch_up(normal, now, &met), normal);
        let unset = PaceContext {
            global_daily_target: 0,
            sent_today_total: 0,
            active_accounts: 4,
            window_end_hour: 17,
        };
        assert_eq!(p.catch_up(normal, now, &unset), normal);
    }

    #[test]
    fn fixed_seed_is_deterministic() {
        let now = utc("2026-03-03T15:00:00Z");
        let a = policy(42).next_allowed_at(&"alice".into(), Duration::minutes(25), now, None);
        let b = policy(42).next_allowed_at(&"alice".into(), Duration::minutes(25), now, None);
        assert_eq!(a, b);
    }
}
