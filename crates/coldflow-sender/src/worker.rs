// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The sender worker loop.
//!
//! Each worker repeatedly: sweeps expired claims and stale queue rows,
//! checks the calendar gate (suspending until the window opens), pulls the
//! next ready request, asks the allocator for an account, performs the
//! transport send, and records the outcome. Suspension never busy-spins:
//! the queue's notify, the window-open instant, and the allocator's
//! retry-at hint each have their own wake condition.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use coldflow_config::model::{LimitsConfig, PacingConfig, RetryConfig};
use coldflow_core::types::{FailureKind, OutboundEmail, SendOutcome, SendRequest, TransportFailure};
use coldflow_core::{ColdflowError, TransportAdapter};
use coldflow_pacing::{CalendarGate, JitterPolicy, PaceContext};
use coldflow_reputation::{DomainThrottle, ReputationStore};

use crate::allocator::{AccountAllocator, Allocation, AllocationOutcome};
use crate::breaker::CircuitBreaker;
use crate::queue::DispatchQueue;

/// Claims older than this are considered crashed and released.
pub(crate) const STALE_CLAIM_MINUTES: i64 = 30;
/// Upper bound on any single suspension, so config/calendar changes are
/// noticed within minutes.
const MAX_SLEEP: StdDuration = StdDuration::from_secs(300);

pub struct SenderWorker {
    pub(crate) id: usize,
    pub(crate) queue: Arc<DispatchQueue>,
    pub(crate) allocator: Arc<AccountAllocator>,
    pub(crate) store: Arc<ReputationStore>,
    pub(crate) jitter: Arc<JitterPolicy>,
    pub(crate) domains: Arc<DomainThrottle>,
    pub(crate) calendar: Arc<CalendarGate>,
    pub(crate) transport: Arc<dyn TransportAdapter>,
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) retry: RetryConfig,
    pub(crate) pacing: PacingConfig,
    pub(crate) limits: LimitsConfig,
    pub(crate) idle_poll_secs: u64,
    pub(crate) cancel: CancellationToken,
}

impl SenderWorker {
    /// Run until cancelled or the circuit breaker opens.
    pub async fn run(&self) -> Result<(), ColdflowError> {
        info!(worker = self.id, "sender worker started");

        while !self.cancel.is_cancelled() {
            if self.breaker.is_open() {
                return Err(ColdflowError::CircuitOpen {
                    failures: self.breaker.failures(),
                });
            }
            let now = Utc::now();

            // Housekeeping: crashed claims must not strand capacity.
            self.store.sweep_expired(now);
            self.store.expire_blocks(now).await?;
            self.queue
                .release_stale(now - Duration::minutes(STALE_CLAIM_MINUTES))
                .await?;

            if let Err(reason) = self.calendar.check(now) {
                let wake = self.calendar.next_open(now);
                debug!(worker = self.id, %reason, %wake, "sending window closed");
                self.sleep_until(wake, now).await;
                continue;
            }

            // Occasionally sit one out, like a human stepping away.
            if self.pacing.skip_probability > 0.0
                && rand::thread_rng().gen_bool(self.pacing.skip_probability)
            {
                debug!(worker = self.id, "taking a short break");
                self.idle_wait(StdDuration::from_secs(120)).await;
                continue;
            }

            match self.queue.dequeue_ready(now).await? {
                Some(request) => self.process(request, now).await?,
                None => self.wait_for_work().await,
            }
        }

        info!(worker = self.id, "sender worker stopped");
        Ok(())
    }

    pub(crate) async fn process(
        &self,
        request: SendRequest,
        now: DateTime<Utc>,
    ) -> Result<(), ColdflowError> {
        let outcome = match self.allocator.allocate(&request, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Fail loudly, but never leave the row stuck in claimed.
                self.queue.release(&request.id).await?;
                return Err(e);
            }
        };

        match outcome {
            AllocationOutcome::Unavailable { retry_at } => {
                // Capacity exhaustion is deferral, not failure: the retry
                // budget is untouched.
                debug!(
                    request_id = %request.id,
                    %retry_at,
                    "no account available, deferring"
                );
                self.queue
                    .requeue(&request.id, Some(retry_at), request.retry_count)
                    .await
            }
            AllocationOutcome::Claimed(allocation) => {
                let mail = OutboundEmail::from_request(&request);
                match self.transport.send(&allocation.account, &mail).await {
                    Ok(receipt) => {
                        self.on_success(&request, &allocation, &receipt.message_id, now)
                            .await
                    }
                    Err(failure) => self.on_failure(&request, &allocation, failure, now).await,
                }
            }
        }
    }

    async fn on_success(
        &self,
        request: &SendRequest,
        allocation: &Allocation,
        message_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ColdflowError> {
        let account_id = &allocation.account.id;

        if let Err(e) = self.store.redeem(&allocation.claim, now).await {
            // The message is already on the wire; a swept claim only means
            // the send took longer than the claim TTL. Count it anyway.
            warn!(request_id = %request.id, error = %e, "claim swept before redemption");
            if let Err(e) = self.store.record_send(account_id, now).await {
                warn!(account = %account_id, error = %e, "late send not counted");
            }
        }

        self.jitter.note_send(account_id);
        let pace = (self.limits.global_daily_target > 0).then(|| PaceContext {
            global_daily_target: self.limits.global_daily_target,
            sent_today_total: self.store.sent_today_total(now),
            active_accounts: self.store.active_count(now),
            window_end_hour: self.calendar.window().1,
        });
        let next_allowed =
            self.jitter
                .next_allowed_at(account_id, self.jitter.base_delay(), now, pace);
        self.store.set_cooldown(account_id, next_allowed)?;

        self.store
            .record_outcome(account_id, SendOutcome::Sent, now)
            .await?;
        self.domains
            .record_send(&request.recipient.address, self.calendar.local_date(now))
            .await?;
        self.queue
            .mark_sent(&request.id, now, account_id, message_id)
            .await?;
        self.breaker.record_success();

        info!(
            request_id = %request.id,
            account = %account_id,
            recipient = %request.recipient.address,
            kind = %request.kind,
            retry_count = request.retry_count,
            %next_allowed,
            "email sent"
        );
        Ok(())
    }

    async fn on_failure(
        &self,
        request: &SendRequest,
        allocation: &Allocation,
        failure: TransportFailure,
        now: DateTime<Utc>,
    ) -> Result<(), ColdflowError> {
        let account_id = &allocation.account.id;
        self.store.release(&allocation.claim.id, now);

        match failure.kind {
            FailureKind::Transient => {
                self.breaker.record_failure();
                let retries = request.retry_count + 1;
                if retries >= self.retry.max_attempts {
                    warn!(
                        request_id = %request.id,
                        retries,
                        error = %failure,
                        "retry budget spent, abandoning"
                    );
                    self.queue
                        .mark_abandoned(&request.id, &failure.to_string())
                        .await
                } else {
                    let backoff = backoff_delay(&self.retry, retries);
                    warn!(
                        request_id = %request.id,
                        retries,
                        backoff_secs = backoff.num_seconds(),
                        error = %failure,
                        "transient transport failure, will retry"
                    );
                    self.queue
                        .requeue(&request.id, Some(now + backoff), retries)
                        .await
                }
            }
            FailureKind::Permanent => {
                warn!(
                    request_id = %request.id,
                    account = %account_id,
                    error = %failure,
                    "permanent transport failure"
                );
                self.store
                    .record_outcome(account_id, SendOutcome::Bounced, now)
                    .await?;
                self.queue
                    .mark_failed(&request.id, &failure.to_string())
                    .await
            }
            FailureKind::Blocked => {
                self.breaker.record_failure();
                let until = now + Duration::hours(i64::from(self.limits.block_hours));
                self.store
                    .block(account_id, &failure.message, until)
                    .await?;
                // The request is not at fault. An affinity-pinned request
                // must wait for its account; anything else can go out from
                // another account immediately.
                let not_before = request
                    .account_affinity
                    .as_ref()
                    .filter(|aff| *aff == account_id)
                    .map(|_| until);
                self.queue
                    .requeue(&request.id, not_before, request.retry_count)
                    .await
            }
        }
    }

    /// Sleep until `wake` (capped), or until cancelled.
    async fn sleep_until(&self, wake: DateTime<Utc>, now: DateTime<Utc>) {
        let duration = (wake - now)
            .to_std()
            .unwrap_or(StdDuration::from_secs(1))
            .min(MAX_SLEEP);
        self.idle_wait(duration).await;
    }

    async fn idle_wait(&self, duration: StdDuration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.cancel.cancelled() => {}
        }
    }

    /// Park until a producer enqueues, the idle poll elapses, or shutdown.
    async fn wait_for_work(&self) {
        tokio::select! {
            _ = self.queue.notified() => {}
            _ = tokio::time::sleep(StdDuration::from_secs(self.idle_poll_secs)) => {}
            _ = self.cancel.cancelled() => {}
        }
    }
}

/// Exponential backoff for the nth retry (1-based), clamped to the
/// configured maximum.
pub fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    let secs = retry
        .backoff_base_secs
        .saturating_mul(factor)
        .min(retry.backoff_max_secs);
    Duration::seconds(secs as i64)
}
