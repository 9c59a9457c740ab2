// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The reputation store: single source of truth for per-account send state.
//!
//! All mutation happens through atomic, per-account operations; no lock
//! ever spans two accounts. A claim reserves a capacity slot via one
//! compare-and-swap against the effective cap, so concurrent workers can
//! never over-commit an account — the invariant
//! `committed + open_claims <= effective_cap` holds by construction.
//!
//! The store is authoritative while the process runs; daily counters,
//! the outcome ledger, and block metadata are written through to SQLite
//! and hydrated back on startup.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use coldflow_config::model::{LimitsConfig, WarmupConfig};
use coldflow_core::types::{
    Account, AccountId, AccountState, AccountSummary, ClaimId, ClaimToken, RequestId, SendOutcome,
};
use coldflow_core::ColdflowError;
use coldflow_storage::{reputation as repdb, Database, OutcomeCounts};

use crate::counter::DayCounter;
use crate::warmup::{warmdown_cap, warmup_cap, warmup_week};

/// Provider-side absolute ceiling on daily sends per mailbox.
const PROVIDER_HARD_CAP: u32 = 500;

/// Below this many outcomes in the rolling window, the bounce rate is
/// treated as noise and the breaker stays disengaged.
const MIN_WINDOW_VOLUME: u32 = 10;

/// Why a claim was refused. All variants mean "try another account";
/// none of them ever propagate to producers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimDenied {
    /// The atomic increment found no room under the effective cap.
    CapExceeded { cap: u32 },
    /// The account already has an unredeemed claim in flight.
    InFlight,
    /// The account is blocked.
    Blocked,
    /// Not a configured account.
    UnknownAccount,
}

struct AccountEntry {
    account: Account,
    /// Committed sends plus open claims (capacity reservations).
    reserved: DayCounter,
    /// Redeemed (actually transmitted) sends.
    committed: DayCounter,
    /// At most one claim per account at any instant; mirrors the rule that
    /// an account usefully serves one SMTP submission at a time.
    in_flight: AtomicBool,
    /// Unix millis; 0 = never sent.
    last_send_at: AtomicI64,
    /// Unix millis; 0 = no cooldown.
    cooldown_until: AtomicI64,
    /// Unix millis; 0 = not blocked, i64::MAX = blocked until unblocked.
    blocked_until: AtomicI64,
    block_reason: Mutex<Option<String>>,
    /// Unix millis of the most recent unblock; anchors the warm-down ramp.
    unblocked_at: AtomicI64,
    first_send_day: Mutex<Option<NaiveDate>>,
    /// Rolling outcome window, refreshed from the ledger on every outcome.
    window: Mutex<OutcomeCounts>,
    /// Bounce-rate breaker: while engaged the effective cap is halved.
    breaker_engaged: AtomicBool,
}

impl AccountEntry {
    fn new(account: Account) -> Self {
        Self {
            account,
            reserved: DayCounter::new(),
            committed: DayCounter::new(),
            in_flight: AtomicBool::new(false),
            last_send_at: AtomicI64::new(0),
            cooldown_until: AtomicI64::new(0),
            blocked_until: AtomicI64::new(0),
            block_reason: Mutex::new(None),
            unblocked_at: AtomicI64::new(0),
            first_send_day: Mutex::new(None),
            window: Mutex::new(OutcomeCounts::default()),
            breaker_engaged: AtomicBool::new(false),
        }
    }

    fn is_blocked(&self, now_ms: i64) -> bool {
        self.blocked_until.load(Ordering::Acquire) > now_ms
    }

    /// Warm-down anchor: the later of an explicit unblock and a naturally
    /// expired block.
    fn warmdown_anchor(&self, now_ms: i64) -> Option<DateTime<Utc>> {
        let unblocked = self.unblocked_at.load(Ordering::Acquire);
        let blocked_until = self.blocked_until.load(Ordering::Acquire);
        let expired_block = if blocked_until > 0 && blocked_until != i64::MAX && blocked_until <= now_ms
        {
            blocked_until
        } else {
            0
        };
        let anchor = unblocked.max(expired_block);
        if anchor > 0 {
            DateTime::from_timestamp_millis(anchor)
        } else {
            None
        }
    }
}

/// A per-account snapshot the allocator filters and orders.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub account: Account,
    pub effective_cap: u32,
    pub committed: u32,
    pub open_claims: u32,
    pub remaining: u32,
    pub in_flight: bool,
    pub blocked: bool,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_send_at: Option<DateTime<Utc>>,
}

/// Durable per-account record of sends, claims, cooldowns, blocks, and
/// rolling reputation.
pub struct ReputationStore {
    entries: DashMap<AccountId, Arc<AccountEntry>>,
    /// Stable (config) iteration order.
    order: Vec<AccountId>,
    claims: DashMap<ClaimId, ClaimToken>,
    db: Database,
    tz: Tz,
    limits: LimitsConfig,
    warmup: WarmupConfig,
}

impl ReputationStore {
    pub fn new(
        accounts: Vec<Account>,
        db: Database,
        tz: Tz,
        limits: LimitsConfig,
        warmup: WarmupConfig,
    ) -> Self {
        let entries = DashMap::new();
        let mut order = Vec::with_capacity(accounts.len());
        for account in accounts {
            order.push(account.id.clone());
            entries.insert(account.id.clone(), Arc::new(AccountEntry::new(account)));
        }
        Self {
            entries,
            order,
            claims: DashMap::new(),
            db,
            tz,
            limits,
            warmup,
        }
    }

    /// Restore today's counters, block metadata, and rolling windows from
    /// storage (restart recovery). Open claims are not restored: crashed
    /// claims died with the process, and the queue's stale-claim release
    /// returns their requests to pending.
    pub async fn hydrate(&self, now: DateTime<Utc>) -> Result<(), ColdflowError> {
        let local = self.local_date(now);
        let today = day_number(local);
        let since = now - Duration::days(i64::from(self.limits.reputation_window_days));

        for id in &self.order {
            let entry = self.entry(id)?;

            let (count, last) = repdb::load_daily(&self.db, id, local).await?;
            entry.committed.set(today, count);
            entry.reserved.set(today, count);
            if let Some(last) = last {
                entry.last_send_at.store(last.timestamp_millis(), Ordering::Release);
            }

            let meta = repdb::load_meta(&self.db, id).await?;
            *entry.first_send_day.lock().expect("meta lock") = meta.first_send_day;
            if let Some(until) = meta.blocked_until {
                entry
                    .blocked_until
                    .store(until.timestamp_millis(), Ordering::Release);
                *entry.block_reason.lock().expect("meta lock") = meta.block_reason;
            }
            if let Some(at) = meta.unblocked_at {
                entry.unblocked_at.store(at.timestamp_millis(), Ordering::Release);
            }

            let counts = repdb::outcome_window(&self.db, id, since).await?;
            let engaged = counts.total() >= MIN_WINDOW_VOLUME
                && counts.bounce_rate() > self.limits.bounce_rate_threshold;
            *entry.window.lock().expect("window lock") = counts;
            entry.breaker_engaged.store(engaged, Ordering::Release);

            debug!(
                account = %id,
                sends_today = count,
                bounce_rate = counts.bounce_rate(),
                breaker = engaged,
                "reputation hydrated"
            );
        }
        Ok(())
    }

    fn entry(&self, account: &AccountId) -> Result<Arc<AccountEntry>, ColdflowError> {
        self.entries
            .get(account)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| ColdflowError::UnknownAccount(account.clone()))
    }

    /// Calendar date at `now` in the target timezone: the day key.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    fn today(&self, now: DateTime<Utc>) -> u32 {
        day_number(self.local_date(now))
    }

    /// Configured accounts in config order.
    pub fn accounts(&self) -> Vec<Account> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).map(|e| e.account.clone()))
            .collect()
    }

    /// Accounts currently in rotation (not blocked).
    pub fn active_count(&self, now: DateTime<Utc>) -> u32 {
        let now_ms = now.timestamp_millis();
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .filter(|e| !e.is_blocked(now_ms))
            .count() as u32
    }

    /// Committed sends across all accounts today (catch-up pacing input).
    pub fn sent_today_total(&self, now: DateTime<Utc>) -> u32 {
        let today = self.today(now);
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|e| e.committed.get(today))
            .sum()
    }

    fn effective_cap_for(&self, entry: &AccountEntry, now: DateTime<Utc>) -> u32 {
        let now_ms = now.timestamp_millis();
        if entry.is_blocked(now_ms) {
            return 0;
        }
        // A fresh unblock overrides everything else.
        if let Some(ramp) = warmdown_cap(entry.warmdown_anchor(now_ms), now) {
            return ramp.min(PROVIDER_HARD_CAP);
        }

        let mut cap = entry.account.daily_cap;
        if self.limits.global_daily_target > 0 {
            let active = self.active_count(now).max(1);
            let per_account = self.limits.global_daily_target.div_ceil(active);
            cap = cap.min(per_account);
        }
        let week = warmup_week(
            *entry.first_send_day.lock().expect("meta lock"),
            self.local_date(now),
        );
        if let Some(ramp) = warmup_cap(&self.warmup, week) {
            cap = cap.min(ramp);
        }
        cap = cap.min(PROVIDER_HARD_CAP);
        if entry.breaker_engaged.load(Ordering::Acquire) {
            cap = (cap / 2).max(1);
        }
        cap
    }

    /// The effective cap for one account right now.
    pub fn effective_cap(&self, account: &AccountId, now: DateTime<Utc>) -> Result<u32, ColdflowError> {
        let entry = self.entry(account)?;
        Ok(self.effective_cap_for(&entry, now))
    }

    // ── claims ───────────────────────────────────────────────────────

    /// Atomically reserve one capacity slot on an account.
    ///
    /// The reservation IS the cap check: one compare-and-swap against the
    /// effective cap. Two concurrent claimants can never both take the
    /// last slot, and a claim can never exist on a blocked or saturated
    /// account.
    pub fn claim(
        &self,
        account: &AccountId,
        request: &RequestId,
        now: DateTime<Utc>,
    ) -> Result<ClaimToken, ClaimDenied> {
        let Some(entry) = self.entries.get(account) else {
            return Err(ClaimDenied::UnknownAccount);
        };
        if entry.is_blocked(now.timestamp_millis()) {
            return Err(ClaimDenied::Blocked);
        }
        if entry
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ClaimDenied::InFlight);
        }

        let cap = self.effective_cap_for(&entry, now);
        let today = self.today(now);
        if entry.reserved.try_increment(today, cap).is_err() {
            entry.in_flight.store(false, Ordering::Release);
            return Err(ClaimDenied::CapExceeded { cap });
        }

        let token = ClaimToken {
            id: ClaimId::generate(),
            account_id: account.clone(),
            request_id: request.clone(),
            issued_at: now,
            expires_at: now + Duration::seconds(self.limits.claim_ttl_secs as i64),
        };
        self.claims.insert(token.id.clone(), token.clone());
        debug!(account = %account, request = %request, claim = %token.id, "claim issued");
        Ok(token)
    }

    /// Finalize a claim after a successful transport send: the reserved
    /// slot becomes a committed send and the counter is persisted.
    pub async fn redeem(&self, token: &ClaimToken, now: DateTime<Utc>) -> Result<(), ColdflowError> {
        if self.claims.remove(&token.id).is_none() {
            return Err(ColdflowError::ClaimExpired {
                claim: token.id.clone(),
            });
        }
        let entry = self.entry(&token.account_id)?;
        let today = self.today(now);
        let committed = entry.committed.increment(today);
        entry
            .last_send_at
            .store(now.timestamp_millis(), Ordering::Release);
        entry.in_flight.store(false, Ordering::Release);

        let local = self.local_date(now);
        let first_send_recorded = {
            let mut first = entry.first_send_day.lock().expect("meta lock");
            if first.is_none() {
                *first = Some(local);
                true
            } else {
                false
            }
        };
        if first_send_recorded {
            repdb::set_first_send_day_if_absent(&self.db, &token.account_id, local).await?;
        }
        repdb::upsert_daily(&self.db, &token.account_id, local, committed, Some(now)).await?;

        info!(
            account = %token.account_id,
            sends_today = committed,
            "send recorded"
        );
        Ok(())
    }

    /// Return a claimed slot without sending (failed or deferred attempt).
    /// Idempotent: releasing an unknown or already-swept claim is a no-op.
    pub fn release(&self, claim: &ClaimId, now: DateTime<Utc>) -> bool {
        let Some((_, token)) = self.claims.remove(claim) else {
            return false;
        };
        if let Some(entry) = self.entries.get(&token.account_id) {
            entry.reserved.decrement(self.today(now));
            entry.in_flight.store(false, Ordering::Release);
        }
        debug!(claim = %claim, account = %token.account_id, "claim released");
        true
    }

    /// Release every claim whose expiry has passed. A crashed worker's
    /// claim returns its slot here instead of stranding the account's
    /// capacity for the day.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<ClaimId> = self
            .claims
            .iter()
            .filter(|kv| kv.value().is_expired(now))
            .map(|kv| kv.key().clone())
            .collect();
        let count = expired.len();
        for id in expired {
            if self.release(&id, now) {
                warn!(claim = %id, "expired claim reclaimed");
            }
        }
        count
    }

    /// Open (unredeemed, unswept) claim count across all accounts.
    pub fn open_claims(&self) -> usize {
        self.claims.len()
    }

    // ── direct contract (§ producers that bypass the allocator) ──────

    /// Atomically count one send against an account.
    ///
    /// Check-and-increment is a single atomic operation; a call that would
    /// exceed the effective cap fails with `CapExceeded` before any
    /// transport send could occur.
    pub async fn record_send(
        &self,
        account: &AccountId,
        at: DateTime<Utc>,
    ) -> Result<(), ColdflowError> {
        let entry = self.entry(account)?;
        let cap = self.effective_cap_for(&entry, at);
        let today = self.today(at);
        entry
            .reserved
            .try_increment(today, cap)
            .map_err(|_| ColdflowError::CapExceeded {
                account: account.clone(),
                cap,
            })?;
        let committed = entry.committed.increment(today);
        entry.last_send_at.store(at.timestamp_millis(), Ordering::Release);

        let local = self.local_date(at);
        {
            let mut first = entry.first_send_day.lock().expect("meta lock");
            if first.is_none() {
                *first = Some(local);
            }
        }
        repdb::set_first_send_day_if_absent(&self.db, account, local).await?;
        repdb::upsert_daily(&self.db, account, local, committed, Some(at)).await?;
        Ok(())
    }

    // ── outcomes & the bounce breaker ────────────────────────────────

    /// Record a delivery outcome and refresh the rolling window. Crossing
    /// the bounce-rate threshold halves the account's effective cap until
    /// the rate recovers.
    pub async fn record_outcome(
        &self,
        account: &AccountId,
        outcome: SendOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), ColdflowError> {
        repdb::record_outcome(&self.db, account, outcome, now).await?;
        let since = now - Duration::days(i64::from(self.limits.reputation_window_days));
        let counts = repdb::outcome_window(&self.db, account, since).await?;

        let entry = self.entry(account)?;
        let engaged = counts.total() >= MIN_WINDOW_VOLUME
            && counts.bounce_rate() > self.limits.bounce_rate_threshold;
        *entry.window.lock().expect("window lock") = counts;
        let was_engaged = entry.breaker_engaged.swap(engaged, Ordering::AcqRel);
        if engaged && !was_engaged {
            warn!(
                account = %account,
                bounce_rate = counts.bounce_rate(),
                "bounce rate over threshold, effective cap halved"
            );
        } else if !engaged && was_engaged {
            info!(account = %account, "bounce rate recovered, cap restored");
        }
        Ok(())
    }

    /// Rolling outcome counts for one account.
    pub fn outcome_counts(&self, account: &AccountId) -> Result<OutcomeCounts, ColdflowError> {
        Ok(*self.entry(account)?.window.lock().expect("window lock"))
    }

    // ── cooldowns & blocks ───────────────────────────────────────────

    /// Set the earliest next-send instant for an account. Idempotent.
    pub fn set_cooldown(
        &self,
        account: &AccountId,
        until: DateTime<Utc>,
    ) -> Result<(), ColdflowError> {
        let entry = self.entry(account)?;
        entry
            .cooldown_until
            .store(until.timestamp_millis(), Ordering::Release);
        Ok(())
    }

    pub fn cooldown_until(&self, account: &AccountId) -> Result<Option<DateTime<Utc>>, ColdflowError> {
        let ms = self.entry(account)?.cooldown_until.load(Ordering::Acquire);
        Ok(if ms > 0 {
            DateTime::from_timestamp_millis(ms)
        } else {
            None
        })
    }

    /// Block an account until `until`. Idempotent; persisted.
    pub async fn block(
        &self,
        account: &AccountId,
        reason: &str,
        until: DateTime<Utc>,
    ) -> Result<(), ColdflowError> {
        let entry = self.entry(account)?;
        entry
            .blocked_until
            .store(until.timestamp_millis(), Ordering::Release);
        *entry.block_reason.lock().expect("meta lock") = Some(reason.to_string());
        repdb::set_block(&self.db, account, until, reason).await?;
        warn!(account = %account, %until, reason, "account blocked");
        Ok(())
    }

    /// Return an account to rotation. Idempotent; persisted. The unblock
    /// instant anchors the warm-down ramp.
    pub async fn unblock(&self, account: &AccountId, now: DateTime<Utc>) -> Result<(), ColdflowError> {
        let entry = self.entry(account)?;
        let was = entry.blocked_until.swap(0, Ordering::AcqRel);
        if was > 0 {
            entry.unblocked_at.store(now.timestamp_millis(), Ordering::Release);
            *entry.block_reason.lock().expect("meta lock") = None;
            repdb::clear_block(&self.db, account, now).await?;
            info!(account = %account, "account unblocked");
        }
        Ok(())
    }

    /// Clear naturally-expired blocks and persist the transition, so
    /// restart hydration sees the same state.
    pub async fn expire_blocks(&self, now: DateTime<Utc>) -> Result<usize, ColdflowError> {
        let now_ms = now.timestamp_millis();
        let mut expired = 0;
        for id in &self.order {
            let entry = self.entry(id)?;
            let until = entry.blocked_until.load(Ordering::Acquire);
            if until > 0
                && until != i64::MAX
                && until <= now_ms
                && entry
                    .blocked_until
                    .compare_exchange(until, 0, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                entry.unblocked_at.store(until, Ordering::Release);
                *entry.block_reason.lock().expect("meta lock") = None;
                let at = DateTime::from_timestamp_millis(until).unwrap_or(now);
                repdb::clear_block(&self.db, id, at).await?;
                info!(account = %id, "block expired, warm-down ramp begins");
                expired += 1;
            }
        }
        Ok(expired)
    }

    // ── snapshots ────────────────────────────────────────────────────

    /// Consistent snapshot of one account.
    pub fn get_state(
        &self,
        account: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<AccountState, ColdflowError> {
        let entry = self.entry(account)?;
        let today = self.today(now);
        let now_ms = now.timestamp_millis();
        let cap = self.effective_cap_for(&entry, now);
        let reserved = entry.reserved.get(today);
        let committed = entry.committed.get(today);
        let cooldown_ms = entry.cooldown_until.load(Ordering::Acquire);
        let last_ms = entry.last_send_at.load(Ordering::Acquire);
        Ok(AccountState {
            account_id: account.clone(),
            daily_cap: entry.account.daily_cap,
            effective_cap: cap,
            sends_today: committed,
            open_claims: reserved.saturating_sub(committed),
            remaining: cap.saturating_sub(reserved),
            cooldown_until: (cooldown_ms > now_ms)
                .then(|| DateTime::from_timestamp_millis(cooldown_ms))
                .flatten(),
            last_send_at: (last_ms > 0)
                .then(|| DateTime::from_timestamp_millis(last_ms))
                .flatten(),
            blocked: entry.is_blocked(now_ms),
            block_reason: entry.block_reason.lock().expect("meta lock").clone(),
            warmup_week: warmup_week(
                *entry.first_send_day.lock().expect("meta lock"),
                self.local_date(now),
            ),
        })
    }

    /// Snapshots of every account for the allocator, in config order.
    pub fn candidates(&self, now: DateTime<Utc>) -> Vec<Candidate> {
        let today = self.today(now);
        let now_ms = now.timestamp_millis();
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|entry| {
                let cap = self.effective_cap_for(&entry, now);
                let reserved = entry.reserved.get(today);
                let committed = entry.committed.get(today);
                let cooldown_ms = entry.cooldown_until.load(Ordering::Acquire);
                let last_ms = entry.last_send_at.load(Ordering::Acquire);
                Candidate {
                    account: entry.account.clone(),
                    effective_cap: cap,
                    committed,
                    open_claims: reserved.saturating_sub(committed),
                    remaining: cap.saturating_sub(reserved),
                    in_flight: entry.in_flight.load(Ordering::Acquire),
                    blocked: entry.is_blocked(now_ms),
                    cooldown_until: (cooldown_ms > now_ms)
                        .then(|| DateTime::from_timestamp_millis(cooldown_ms))
                        .flatten(),
                    last_send_at: (last_ms > 0)
                        .then(|| DateTime::from_timestamp_millis(last_ms))
                        .flatten(),
                }
            })
            .collect()
    }

    /// Operator-facing per-account summary.
    pub fn daily_summary(
        &self,
        now: DateTime<Utc>,
    ) -> std::collections::BTreeMap<AccountId, AccountSummary> {
        let today = self.today(now);
        let now_ms = now.timestamp_millis();
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).map(|e| (id.clone(), e)))
            .map(|(id, entry)| {
                let cap = self.effective_cap_for(&entry, now);
                let reserved = entry.reserved.get(today);
                (
                    id,
                    AccountSummary {
                        sent: entry.committed.get(today),
                        remaining: cap.saturating_sub(reserved),
                        blocked: entry.is_blocked(now_ms),
                    },
                )
            })
            .collect()
    }
}

fn day_number(date: NaiveDate) -> u32 {
    date.num_days_from_ce().max(0) as u32
}
