// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account allocator: the concurrency-critical choice of which mailbox
//! sends the next email.
//!
//! For each request it filters the pool (blocked, cooldown, session plan,
//! remaining capacity, recipient-domain throttle), orders the survivors by
//! fewest-sends-today then longest-idle, and claims one atomically through
//! the reputation store. Losing a claim race just excludes that account
//! and retries, bounded by the eligible-set size.
//!
//! An empty eligible set is NOT an error: the allocator reports
//! `Unavailable` with the earliest instant anything could change, and the
//! worker defers the request until then.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use tracing::debug;

use coldflow_core::types::{Account, ClaimToken, RequestKind, SendRequest};
use coldflow_core::ColdflowError;
use coldflow_pacing::{CalendarGate, SessionAvailability, SessionPlanner};
use coldflow_reputation::{Candidate, ClaimDenied, DomainThrottle, ReputationStore};

/// A successful allocation: the account and its capacity reservation.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub account: Account,
    pub claim: ClaimToken,
}

/// The allocator's answer for one request.
#[derive(Debug, Clone)]
pub enum AllocationOutcome {
    Claimed(Allocation),
    /// No account can serve this request right now. `retry_at` is the
    /// earliest instant that could change (cooldown expiry, next session
    /// start, window open, or next-day reset).
    Unavailable { retry_at: DateTime<Utc> },
}

pub struct AccountAllocator {
    store: Arc<ReputationStore>,
    planner: Arc<SessionPlanner>,
    calendar: Arc<CalendarGate>,
    domains: Arc<DomainThrottle>,
}

impl AccountAllocator {
    pub fn new(
        store: Arc<ReputationStore>,
        planner: Arc<SessionPlanner>,
        calendar: Arc<CalendarGate>,
        domains: Arc<DomainThrottle>,
    ) -> Self {
        Self {
            store,
            planner,
            calendar,
            domains,
        }
    }

    /// Claim exactly one eligible account for this request, or report when
    /// to try again.
    pub async fn allocate(
        &self,
        request: &SendRequest,
        now: DateTime<Utc>,
    ) -> Result<AllocationOutcome, ColdflowError> {
        // Same-thread follow-ups without a pinned sender are malformed:
        // sending them from an arbitrary account would corrupt threading.
        if request.kind == RequestKind::FollowupSameThread && request.account_affinity.is_none() {
            return Err(ColdflowError::Internal(format!(
                "same-thread follow-up {} has no account affinity",
                request.id
            )));
        }

        if !self.calendar.allows(now) {
            return Ok(AllocationOutcome::Unavailable {
                retry_at: self.calendar.next_open(now),
            });
        }

        let local_date = self.calendar.local_date(now);
        if !self
            .domains
            .allows(&request.recipient.address, local_date)
            .await?
        {
            // The domain's budget returns at the next day's window.
            return Ok(AllocationOutcome::Unavailable {
                retry_at: self.calendar.next_day_open(now),
            });
        }

        let candidates = self.store.candidates(now);
        let pool: Vec<Candidate> = match &request.account_affinity {
            Some(affinity) => {
                let pinned: Vec<Candidate> = candidates
                    .into_iter()
                    .filter(|c| c.account.id == *affinity)
                    .collect();
                if pinned.is_empty() {
                    return Err(ColdflowError::UnknownAccount(affinity.clone()));
                }
                pinned
            }
            None => candidates,
        };

        let minute = self.calendar.local_minute(now);
        let mut eligible = Vec::new();
        let mut wake_hints: Vec<DateTime<Utc>> = Vec::new();

        for candidate in pool {
            if candidate.blocked {
                continue;
            }
            if candidate.remaining == 0 {
                wake_hints.push(self.calendar.next_day_open(now));
                continue;
            }
            if let Some(until) = candidate.cooldown_until
                && until > now
            {
                wake_hints.push(until);
                continue;
            }
            match self.planner.availability(
                &candidate.account.id,
                local_date,
                minute,
                candidate.effective_cap,
            ) {
                SessionAvailability::Active => {}
                SessionAvailability::NextStart(start_minute) => {
                    if let Some(at) = self.minute_to_utc(local_date, start_minute) {
                        wake_hints.push(at);
                    }
                    continue;
                }
                SessionAvailability::DoneForToday => {
                    wake_hints.push(self.calendar.next_day_open(now));
                    continue;
                }
            }
            if candidate.in_flight {
                wake_hints.push(now + chrono::Duration::seconds(30));
                continue;
            }
            eligible.push(candidate);
        }

        // Fewest sends today first, then longest idle. Never a raw index
        // rotation: accounts skipped for cooldown would lose their turn.
        eligible.sort_by_key(|c| {
            (
                c.committed,
                c.last_send_at.map(|t| t.timestamp()).unwrap_or(i64::MIN),
            )
        });

        for candidate in &eligible {
            match self.store.claim(&candidate.account.id, &request.id, now) {
                Ok(claim) => {
                    if let Some(affinity) = &request.account_affinity
                        && claim.account_id != *affinity
                    {
                        self.store.release(&claim.id, now);
                        return Err(ColdflowError::ThreadAffinityViolation {
                            expected: affinity.clone(),
                            actual: claim.account_id,
                        });
                    }
                    debug!(
                        request_id = %request.id,
                        account = %candidate.account.id,
                        sends_today = candidate.committed,
                        "account allocated"
                    );
                    return Ok(AllocationOutcome::Claimed(Allocation {
                        account: candidate.account.clone(),
                        claim,
                    }));
                }
                // Lost the race or state changed under us: exclude this
                // account and keep going. The loop is bounded by the
                // eligible-set size.
                Err(ClaimDenied::CapExceeded { .. })
                | Err(ClaimDenied::InFlight)
                | Err(ClaimDenied::Blocked) => {
                    wake_hints.push(now + chrono::Duration::seconds(30));
                }
                Err(ClaimDenied::UnknownAccount) => {
                    return Err(ColdflowError::UnknownAccount(candidate.account.id.clone()));
                }
            }
        }

        let fallback = self.calendar.next_day_open(now);
        let retry_at = wake_hints
            .into_iter()
            .filter(|at| *at > now)
            .min()
            .unwrap_or(fallback);
        debug!(request_id = %request.id, %retry_at, "no account available");
        Ok(AllocationOutcome::Unavailable { retry_at })
    }

    fn minute_to_utc(&self, date: NaiveDate, minute: u32) -> Option<DateTime<Utc>> {
        let naive = date.and_hms_opt(minute / 60, minute % 60, 0)?;
        self.calendar
            .timezone()
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}
