// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session planning: a day's sending is a few bursts, not a steady drip.
//!
//! Each account gets 2-3 sessions per day, each a handful of emails with
//! intra-session gaps, separated by long breaks. Plans are deterministic
//! for a fixed seed and regenerated once per account per day the first time
//! the account is consulted. Outside all planned sessions an account is
//! unavailable until its next session start; the allocator treats that
//! exactly like cooldown.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use tracing::debug;

use coldflow_config::model::PacingConfig;
use coldflow_core::types::AccountId;

/// One contiguous sending window for one account on one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Minute-of-day of the first send in this session.
    pub start_minute: u32,
    /// Planned email count.
    pub email_count: u32,
    /// Average gap between emails within the session, minutes.
    pub intra_gap_mins: u32,
}

impl Session {
    pub fn end_minute(&self) -> u32 {
        self.start_minute + self.email_count * self.intra_gap_mins
    }

    pub fn contains(&self, minute: u32) -> bool {
        (self.start_minute..=self.end_minute()).contains(&minute)
    }
}

/// Whether an account may send at a given minute, per its session plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAvailability {
    /// Inside an active session.
    Active,
    /// Between sessions; available again at this minute-of-day.
    NextStart(u32),
    /// All sessions for the day are over.
    DoneForToday,
}

fn plan_seed(account: &AccountId, date: NaiveDate, seed: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    account.0.hash(&mut hasher);
    date.hash(&mut hasher);
    hasher.finish() ^ seed
}

/// Plan one account's sessions for a day.
///
/// Deterministic for a fixed `(account, date, seed)`. Total planned emails
/// never exceed `daily_budget`; sessions never start past the window end.
pub fn plan_sessions(
    account: &AccountId,
    date: NaiveDate,
    config: &PacingConfig,
    window: (u8, u8),
    daily_budget: u32,
    seed: u64,
) -> Vec<Session> {
    let (start_hour, end_hour) = window;
    let window_start = u32::from(start_hour) * 60;
    let window_end = u32::from(end_hour) * 60;
    if window_end <= window_start || daily_budget == 0 {
        return Vec::new();
    }
    let total_window = window_end - window_start;

    let mut rng = rand::rngs::StdRng::seed_from_u64(plan_seed(account, date, seed));
    let session_count =
        rng.gen_range(config.sessions_per_day_min..=config.sessions_per_day_max);

    // Email counts per session, bounded by the day's budget.
    let mut counts = Vec::new();
    let mut remaining = daily_budget;
    for _ in 0..session_count {
        if remaining == 0 {
            break;
        }
        let upper = config.session_emails_max.min(remaining);
        let lower = config.session_emails_min.min(upper);
        let count = rng.gen_range(lower..=upper);
        counts.push(count);
        remaining -= count;
    }
    if counts.is_empty() {
        return Vec::new();
    }

    let avg_gap = rng.gen_range(config.min_delay_mins..=config.max_delay_mins);

    // Split the idle time into breaks between (and before) sessions.
    let total_active: u32 = counts.iter().map(|c| c * avg_gap).sum();
    let total_break = total_window.saturating_sub(total_active);
    let break_per_slot = total_break / (counts.len() as u32 + 1);

    let mut sessions = Vec::new();
    let mut cursor = window_start;
    for count in counts {
        let jittered_break = if break_per_slot > 5 {
            (f64::from(break_per_slot) * rng.gen_range(0.6..=1.4)).round() as u32
        } else {
            break_per_slot
        };
        cursor += jittered_break;
        if cursor >= window_end {
            break;
        }
        let session = Session {
            start_minute: cursor,
            email_count: count,
            intra_gap_mins: avg_gap,
        };
        cursor += session.email_count * session.intra_gap_mins;
        sessions.push(session);
    }

    debug!(
        account = %account,
        %date,
        sessions = sessions.len(),
        emails = sessions.iter().map(|s| s.email_count).sum::<u32>(),
        "sessions planned"
    );
    sessions
}

/// Availability of a minute within a plan.
pub fn availability(sessions: &[Session], minute: u32) -> SessionAvailability {
    if sessions.iter().any(|s| s.contains(minute)) {
        return SessionAvailability::Active;
    }
    sessions
        .iter()
        .map(|s| s.start_minute)
        .filter(|start| *start > minute)
        .min()
        .map(SessionAvailability::NextStart)
        .unwrap_or(SessionAvailability::DoneForToday)
}

/// Caches one plan per (account, day), regenerating on day change.
pub struct SessionPlanner {
    config: PacingConfig,
    window: (u8, u8),
    seed: u64,
    plans: DashMap<(AccountId, NaiveDate), Arc<Vec<Session>>>,
}

impl SessionPlanner {
    pub fn new(config: PacingConfig, window: (u8, u8)) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        Self {
            config,
            window,
            seed,
            plans: DashMap::new(),
        }
    }

    /// The plan for an account on a date, computed on first consultation.
    ///
    /// `daily_budget` only matters for the first call of the day (the plan
    /// is frozen after that), so callers pass the account's effective cap.
    pub fn sessions_for(
        &self,
        account: &AccountId,
        date: NaiveDate,
        daily_budget: u32,
    ) -> Arc<Vec<Session>> {
        if let Some(plan) = self.plans.get(&(account.clone(), date)) {
            return plan.clone();
        }
        // Yesterday's plans are dead weight once a new day starts.
        self.plans.retain(|(_, d), _| *d == date);

        let plan = Arc::new(plan_sessions(
            account,
            date,
            &self.config,
            self.window,
            daily_budget,
            self.seed,
        ));
        self.plans
            .entry((account.clone(), date))
            .or_insert_with(|| plan.clone())
            .clone()
    }

    /// Session availability for an account at a minute-of-day.
    pub fn availability(
        &self,
        account: &AccountId,
        date: NaiveDate,
        minute: u32,
        daily_budget: u32,
    ) -> SessionAvailability {
        let plan = self.sessions_for(account, date, daily_budget);
        availability(&plan, minute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config() -> PacingConfig {
        let mut c = PacingConfig::default();
        c.seed = Some(99);
        c
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 3).unwrap()
    }

    #[test]
    fn plans_are_deterministic_for_fixed_seed() {
        let a = plan_sessions(&"alice".into(), date(), &config(), (9, 17), 25, 42);
        let b = plan_sessions(&"alice".into(), date(), &config(), (9, 17), 25, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn different_accounts_get_different_plans() {
        let a = plan_sessions(&"alice".into(), date(), &config(), (9, 17), 25, 42);
        let b = plan_sessions(&"bob".into(), date(), &config(), (9, 17), 25, 42);
        assert_ne!(a, b, "plans should differ across accounts");
    }

    #[test]
    fn session_counts_respect_config_ranges() {
        let cfg = config();
        let plan = plan_sessions(&"alice".into(), date(), &cfg, (9, 17), 25, 42);
        assert!(!plan.is_empty());
        assert!(plan.len() <= cfg.sessions_per_day_max as usize);
        for s in &plan {
            assert!(s.email_count >= 1);
            assert!(s.email_count <= cfg.session_emails_max);
        }
    }

    #[test]
    fn zero_budget_plans_nothing() {
        assert!(plan_sessions(&"alice".into(), date(), &config(), (9, 17), 0, 42).is_empty());
    }

    #[test]
    fn tiny_budget_bounds_total_emails() {
        let plan = plan_sessions(&"alice".into(), date(), &config(), (9, 17), 4, 42);
        let total: u32 = plan.iter().map(|s| s.email_count).sum();
        assert!(total <= 4, "planned {total} emails against a budget of 4");
    }

    #[test]
    fn availability_transitions() {
        let sessions = vec![
            Session { start_minute: 9 * 60, email_count: 3, intra_gap_mins: 20 },
            Session { start_minute: 14 * 60, email_count: 2, intra_gap_mins: 20 },
        ];
        assert_eq!(availability(&sessions, 9 * 60 + 30), SessionAvailability::Active);
        assert_eq!(
            availability(&sessions, 12 * 60),
            SessionAvailability::NextStart(14 * 60)
        );
        assert_eq!(availability(&sessions, 16 * 60), SessionAvailability::DoneForToday);
    }

    #[test]
    fn planner_caches_per_day() {
        let planner = SessionPlanner::new(config(), (9, 17));
        let account: AccountId = "alice".into();
        let first = planner.sessions_for(&account, date(), 25);
        // A different budget on re-consultation must not change the frozen plan.
        let second = planner.sessions_for(&account, date(), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn planner_regenerates_on_new_day() {
        let planner = SessionPlanner::new(config(), (9, 17));
        let account: AccountId = "alice".into();
        let d1 = planner.sessions_for(&account, date(), 25);
        let d2 = planner.sessions_for(&account, date().succ_opt().unwrap(), 25);
        assert_ne!(d1, d2);
    }

    proptest! {
        #[test]
        fn sessions_stay_within_window_and_budget(
            budget in 1u32..200,
            seed in any::<u64>(),
        ) {
            let cfg = PacingConfig::default();
            let plan = plan_sessions(&"p".into(), date(), &cfg, (9, 17), budget, seed);
            let total: u32 = plan.iter().map(|s| s.email_count).sum();
            prop_assert!(total <= budget);
            for s in &plan {
                prop_assert!(s.start_minute >= 9 * 60);
                prop_assert!(s.start_minute < 17 * 60);
            }
            // Sessions are ordered and non-overlapping.
            for pair in plan.windows(2) {
                prop_assert!(pair[0].end_minute() <= pair[1].start_minute);
            }
        }
    }
}
