// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport adapter for deterministic testing.
//!
//! `MockTransport` implements `TransportAdapter` with a scriptable outcome
//! queue and captured sends for assertion in tests. Unscripted sends
//! succeed with a generated message id.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use coldflow_core::types::{Account, OutboundEmail, SendReceipt, TransportFailure};
use coldflow_core::TransportAdapter;

/// One captured transport submission.
#[derive(Debug, Clone)]
pub struct CapturedSend {
    pub account: Account,
    pub mail: OutboundEmail,
}

/// A scriptable in-memory transport.
pub struct MockTransport {
    script: Mutex<VecDeque<Result<SendReceipt, TransportFailure>>>,
    sent: Mutex<Vec<CapturedSend>>,
    attempts: AtomicUsize,
}

impl MockTransport {
    /// A transport where every send succeeds.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
        })
    }

    /// Script the outcome of the next unscripted send (FIFO).
    pub fn push_outcome(&self, outcome: Result<SendReceipt, TransportFailure>) {
        self.script.lock().expect("script lock").push_back(outcome);
    }

    /// Script `n` identical failures.
    pub fn push_failures(&self, failure: TransportFailure, n: usize) {
        let mut script = self.script.lock().expect("script lock");
        for _ in 0..n {
            script.push_back(Err(failure.clone()));
        }
    }

    /// Every send that reached the transport, in order.
    pub fn sent(&self) -> Vec<CapturedSend> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("sent lock").len()
    }

    /// Total attempts, including scripted failures.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Acquire)
    }
}

#[async_trait]
impl TransportAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(
        &self,
        account: &Account,
        mail: &OutboundEmail,
    ) -> Result<SendReceipt, TransportFailure> {
        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        let scripted = self.script.lock().expect("script lock").pop_front();
        let outcome = scripted.unwrap_or_else(|| {
            Ok(SendReceipt {
                message_id: format!("<mock-{attempt}@{}>", account.domain()),
            })
        });
        if outcome.is_ok() {
            self.sent.lock().expect("sent lock").push(CapturedSend {
                account: account.clone(),
                mail: mail.clone(),
            });
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldflow_core::types::Recipient;

    fn account() -> Account {
        Account {
            id: "alice".into(),
            address: "alice@widgets.io".to_string(),
            sender_name: "Alice".to_string(),
            password_env: "SMTP_PASS".to_string(),
            daily_cap: 50,
        }
    }

    fn mail() -> OutboundEmail {
        OutboundEmail {
            to: Recipient::new("lead@corp.com"),
            subject: "Hi".to_string(),
            text_body: "Hello".to_string(),
            html_body: None,
            reply_to: None,
            thread: None,
        }
    }

    #[tokio::test]
    async fn unscripted_sends_succeed() {
        let transport = MockTransport::new();
        let receipt = transport.send(&account(), &mail()).await.unwrap();
        assert!(receipt.message_id.contains("widgets.io"));
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn scripted_failures_fire_in_order() {
        let transport = MockTransport::new();
        transport.push_outcome(Err(TransportFailure::transient("connection reset")));
        transport.push_outcome(Ok(SendReceipt {
            message_id: "<ok@x>".to_string(),
        }));

        assert!(transport.send(&account(), &mail()).await.is_err());
        let receipt = transport.send(&account(), &mail()).await.unwrap();
        assert_eq!(receipt.message_id, "<ok@x>");
        assert_eq!(transport.attempts(), 2);
        assert_eq!(transport.sent_count(), 1, "failures are not captured as sent");
    }
}
