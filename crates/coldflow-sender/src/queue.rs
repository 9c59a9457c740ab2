// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch queue facade over the durable send-request rows.
//!
//! Producers enqueue, workers drain. The storage layer guarantees at most
//! one in-flight `claimed` state per request; this facade adds the
//! in-process wakeup so sleeping workers notice new work without polling.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Notify;
use tracing::debug;

use coldflow_core::types::{AccountId, RequestId, RequestStatus, SendRequest};
use coldflow_core::ColdflowError;
use coldflow_storage::{queue as quedb, Database};

/// Follow-up deadlines within this horizon jump ahead of initial sends.
const DEADLINE_LOOKAHEAD_HOURS: i64 = 24;

/// Ordered backlog of pending send requests.
pub struct DispatchQueue {
    db: Database,
    notify: Notify,
}

impl DispatchQueue {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            notify: Notify::new(),
        }
    }

    /// Add a request to the backlog and wake one sleeping worker.
    pub async fn enqueue(&self, request: &SendRequest) -> Result<(), ColdflowError> {
        quedb::insert_request(&self.db, request).await?;
        self.notify.notify_one();
        Ok(())
    }

    /// Atomically claim the oldest ready request, follow-ups with closing
    /// windows first. `None` when nothing is ready.
    pub async fn dequeue_ready(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<SendRequest>, ColdflowError> {
        quedb::claim_next_ready(&self.db, now, Duration::hours(DEADLINE_LOOKAHEAD_HOURS)).await
    }

    /// Defer a claimed request: back to pending with a not-before time.
    /// Used for both retry backoff (bumped `retry_count`) and capacity
    /// deferral (`retry_count` unchanged).
    pub async fn requeue(
        &self,
        id: &RequestId,
        not_before: Option<DateTime<Utc>>,
        retry_count: u32,
    ) -> Result<(), ColdflowError> {
        debug!(request_id = %id, ?not_before, retry_count, "request requeued");
        quedb::requeue(&self.db, id, not_before, retry_count).await?;
        self.notify.notify_one();
        Ok(())
    }

    /// Return a claimed request unchanged (shutdown path).
    pub async fn release(&self, id: &RequestId) -> Result<(), ColdflowError> {
        quedb::release(&self.db, id).await
    }

    /// Release claims older than `cutoff` (crash recovery).
    pub async fn release_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, ColdflowError> {
        let released = quedb::release_stale(&self.db, cutoff).await?;
        if released > 0 {
            self.notify.notify_one();
        }
        Ok(released)
    }

    pub async fn mark_sent(
        &self,
        id: &RequestId,
        at: DateTime<Utc>,
        from: &AccountId,
        message_id: &str,
    ) -> Result<(), ColdflowError> {
        quedb::mark_sent(&self.db, id, at, from, message_id).await
    }

    pub async fn mark_failed(&self, id: &RequestId, error: &str) -> Result<(), ColdflowError> {
        quedb::mark_failed(&self.db, id, error).await
    }

    pub async fn mark_abandoned(&self, id: &RequestId, error: &str) -> Result<(), ColdflowError> {
        quedb::mark_abandoned(&self.db, id, error).await
    }

    pub async fn get(&self, id: &RequestId) -> Result<Option<SendRequest>, ColdflowError> {
        quedb::get_request(&self.db, id).await
    }

    /// Backlog depth by status, for observability.
    pub async fn depth(&self) -> Result<Vec<(RequestStatus, u32)>, ColdflowError> {
        quedb::depth_by_status(&self.db).await
    }

    /// Resolves when a producer enqueues (or requeues) work.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldflow_core::types::{Recipient, RequestKind};
    use std::sync::Arc;

    fn request(now: DateTime<Utc>) -> SendRequest {
        SendRequest::new(
            Recipient::new("lead@corp.com"),
            "Subject",
            "Body",
            RequestKind::Initial,
            now,
        )
    }

    #[tokio::test]
    async fn enqueue_wakes_a_sleeping_worker() {
        let db = Database::open_in_memory().await.unwrap();
        let queue = Arc::new(DispatchQueue::new(db));
        let now = Utc::now();

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue.notified().await;
                queue.dequeue_ready(Utc::now()).await.unwrap()
            })
        };
        // Let the waiter park first.
        tokio::task::yield_now().await;
        queue.enqueue(&request(now)).await.unwrap();

        let claimed = tokio::time::timeout(std::time::Duration::from_secs(2), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(claimed.is_some());
    }

    #[tokio::test]
    async fn dequeue_ready_never_hands_out_a_request_twice() {
        let db = Database::open_in_memory().await.unwrap();
        let queue = Arc::new(DispatchQueue::new(db));
        let now = Utc::now();
        for _ in 0..5 {
            queue.enqueue(&request(now)).await.unwrap();
        }

        // Concurrent drains: every claimed id must be unique.
        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                while let Some(req) = queue.dequeue_ready(Utc::now()).await.unwrap() {
                    ids.push(req.id);
                }
                ids
            }));
        }
        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all.sort_by(|a, b| a.0.cmp(&b.0));
        let before = all.len();
        all.dedup();
        assert_eq!(before, 5, "all five must be claimed");
        assert_eq!(all.len(), 5, "no request may be claimed twice");
    }
}
