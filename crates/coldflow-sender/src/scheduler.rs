// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduler assembly: wires the store, queue, policies, and workers
//! together, and exposes the producer-facing [`Outreach`] facade.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use coldflow_config::model::ColdflowConfig;
use coldflow_core::types::{AccountId, AccountSummary, RequestKind, RequestStatus, SendRequest};
use coldflow_core::{ColdflowError, TransportAdapter};
use coldflow_pacing::{CalendarGate, JitterPolicy, SessionPlanner};
use coldflow_reputation::{DomainThrottle, ReputationStore};
use coldflow_storage::Database;

use crate::allocator::AccountAllocator;
use crate::breaker::CircuitBreaker;
use crate::queue::DispatchQueue;
use crate::worker::SenderWorker;

/// Manually blocked accounts stay out of rotation for years, until an
/// operator unblocks them.
const MANUAL_BLOCK_DAYS: i64 = 36500;

/// The assembled send scheduler.
pub struct Scheduler {
    config: ColdflowConfig,
    store: Arc<ReputationStore>,
    queue: Arc<DispatchQueue>,
    allocator: Arc<AccountAllocator>,
    jitter: Arc<JitterPolicy>,
    domains: Arc<DomainThrottle>,
    calendar: Arc<CalendarGate>,
    breaker: Arc<CircuitBreaker>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Build all components from config and storage, hydrate the
    /// reputation store, and recover crashed queue claims.
    pub async fn new(config: ColdflowConfig, db: Database) -> Result<Self, ColdflowError> {
        let accounts = config.resolved_accounts();
        if accounts.is_empty() {
            return Err(ColdflowError::Config(
                "no sending accounts configured ([[accounts]] is empty)".to_string(),
            ));
        }

        let calendar = Arc::new(CalendarGate::new(&config.schedule)?);
        let tz = calendar.timezone();
        let store = Arc::new(ReputationStore::new(
            accounts,
            db.clone(),
            tz,
            config.limits.clone(),
            config.warmup.clone(),
        ));
        let planner = Arc::new(SessionPlanner::new(
            config.pacing.clone(),
            calendar.window(),
        ));
        let jitter = Arc::new(JitterPolicy::new(config.pacing.clone(), tz));
        let domains = Arc::new(DomainThrottle::new(
            db.clone(),
            config.limits.max_per_recipient_domain,
            config.limits.webmail_multiplier,
        ));
        let queue = Arc::new(DispatchQueue::new(db));
        let allocator = Arc::new(AccountAllocator::new(
            store.clone(),
            planner,
            calendar.clone(),
            domains.clone(),
        ));
        let breaker = Arc::new(CircuitBreaker::new(config.breaker.failure_threshold));

        let now = Utc::now();
        store.hydrate(now).await?;
        // Same staleness rule as the worker loop, so a status command
        // against a live daemon's database never releases healthy claims.
        let recovered = queue
            .release_stale(now - Duration::minutes(crate::worker::STALE_CLAIM_MINUTES))
            .await?;
        if recovered > 0 {
            info!(recovered, "recovered claims from a previous run");
        }

        Ok(Self {
            config,
            store,
            queue,
            allocator,
            jitter,
            domains,
            calendar,
            breaker,
        })
    }

    /// The producer/operator facade.
    pub fn outreach(&self) -> Outreach {
        Outreach {
            store: self.store.clone(),
            queue: self.queue.clone(),
        }
    }

    pub fn store(&self) -> Arc<ReputationStore> {
        self.store.clone()
    }

    /// Spawn the sender workers and run until cancellation or a halting
    /// error (circuit breaker).
    pub async fn run(
        &self,
        transport: Arc<dyn TransportAdapter>,
        cancel: CancellationToken,
    ) -> Result<(), ColdflowError> {
        // Each account usefully serves one in-flight send at a time, so
        // more workers than accounts would only contend.
        let workers = self
            .config
            .daemon
            .workers
            .clamp(1, self.config.accounts.len().max(1));
        info!(
            workers,
            accounts = self.config.accounts.len(),
            transport = transport.name(),
            "starting sender workers"
        );

        let mut set: JoinSet<Result<(), ColdflowError>> = JoinSet::new();
        for id in 0..workers {
            let worker = SenderWorker {
                id,
                queue: self.queue.clone(),
                allocator: self.allocator.clone(),
                store: self.store.clone(),
                jitter: self.jitter.clone(),
                domains: self.domains.clone(),
                calendar: self.calendar.clone(),
                transport: transport.clone(),
                breaker: self.breaker.clone(),
                retry: self.config.retry.clone(),
                pacing: self.config.pacing.clone(),
                limits: self.config.limits.clone(),
                idle_poll_secs: self.config.daemon.idle_poll_secs,
                cancel: cancel.clone(),
            };
            set.spawn(async move { worker.run().await });
        }

        let mut result = Ok(());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "sender worker halted");
                    // One halting worker stops the fleet.
                    cancel.cancel();
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
                Err(join_err) => {
                    error!(error = %join_err, "sender worker panicked");
                    cancel.cancel();
                    if result.is_ok() {
                        result = Err(ColdflowError::Internal(join_err.to_string()));
                    }
                }
            }
        }
        result
    }
}

/// What producers and operators see of the scheduler: enqueue work,
/// observe capacity, and administratively (un)block accounts. Capacity
/// exhaustion is never visible here as an error.
#[derive(Clone)]
pub struct Outreach {
    store: Arc<ReputationStore>,
    queue: Arc<DispatchQueue>,
}

impl Outreach {
    pub fn new(store: Arc<ReputationStore>, queue: Arc<DispatchQueue>) -> Self {
        Self { store, queue }
    }

    /// Accept one fully-formed send request into the backlog.
    pub async fn enqueue_send(&self, request: SendRequest) -> Result<(), ColdflowError> {
        if request.kind == RequestKind::FollowupSameThread && request.account_affinity.is_none() {
            return Err(ColdflowError::Internal(format!(
                "same-thread follow-up {} must carry the original sender account",
                request.id
            )));
        }
        self.queue.enqueue(&request).await
    }

    /// Per-account {sent, remaining, blocked} for reporting.
    pub fn daily_summary(&self, now: DateTime<Utc>) -> BTreeMap<AccountId, AccountSummary> {
        self.store.daily_summary(now)
    }

    /// Backlog depth by request status.
    pub async fn queue_depth(&self) -> Result<Vec<(RequestStatus, u32)>, ColdflowError> {
        self.queue.depth().await
    }

    /// Administratively pull an account from rotation.
    pub async fn force_block(
        &self,
        account: &AccountId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ColdflowError> {
        self.store
            .block(account, reason, now + Duration::days(MANUAL_BLOCK_DAYS))
            .await
    }

    /// Administratively return an account to rotation.
    pub async fn force_unblock(
        &self,
        account: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<(), ColdflowError> {
        self.store.unblock(account, now).await
    }
}
