// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `coldflow enqueue` command implementation.
//!
//! The producer seam for anything outside the daemon: reads one
//! fully-formed request from a TOML file and drops it into the dispatch
//! queue. The content pipeline renders subject/body; this command never
//! touches them.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use coldflow_config::model::ColdflowConfig;
use coldflow_core::types::{
    AccountId, Recipient, RequestKind, SendRequest, ThreadHeaders,
};
use coldflow_core::ColdflowError;
use coldflow_sender::Scheduler;
use coldflow_storage::Database;

/// On-disk shape of one send request.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RequestFile {
    recipient: String,
    #[serde(default)]
    recipient_name: Option<String>,
    subject: String,
    body: String,
    #[serde(default)]
    html_body: Option<String>,
    #[serde(default = "default_kind")]
    kind: RequestKind,
    /// Sender account pin; required for same-thread follow-ups.
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    in_reply_to: Option<String>,
    #[serde(default)]
    references: Vec<String>,
    #[serde(default)]
    followup_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    not_before: Option<DateTime<Utc>>,
}

fn default_kind() -> RequestKind {
    RequestKind::Initial
}

impl RequestFile {
    fn into_request(self, now: DateTime<Utc>) -> SendRequest {
        let mut request = SendRequest::new(
            Recipient {
                address: self.recipient,
                name: self.recipient_name,
            },
            self.subject,
            self.body,
            self.kind,
            now,
        );
        request.html_body = self.html_body;
        request.account_affinity = self.account.map(AccountId);
        request.thread = self.in_reply_to.map(|in_reply_to| ThreadHeaders {
            in_reply_to,
            references: self.references,
        });
        request.followup_deadline = self.followup_deadline;
        request.not_before = self.not_before;
        request
    }
}

/// Read a request file and enqueue it.
pub async fn run_enqueue(config: ColdflowConfig, file: &Path) -> Result<(), ColdflowError> {
    let content = std::fs::read_to_string(file).map_err(|e| {
        ColdflowError::Config(format!("cannot read {}: {e}", file.display()))
    })?;
    let parsed: RequestFile = toml::from_str(&content)
        .map_err(|e| ColdflowError::Config(format!("invalid request file: {e}")))?;

    let db = Database::open(&config.storage.database_path).await?;
    let scheduler = Scheduler::new(config, db.clone()).await?;
    let request = parsed.into_request(Utc::now());
    let id = request.id.clone();
    scheduler.outreach().enqueue_send(request).await?;
    println!("enqueued {id}");
    db.close().await
}
