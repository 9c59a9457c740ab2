// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixture builders shared by integration tests.

use chrono::{DateTime, Utc};

use coldflow_config::model::{ColdflowConfig, AccountConfig};
use coldflow_core::types::{Account, Recipient, RequestKind, SendRequest};

/// A test account with the given id and cap.
pub fn account(id: &str, daily_cap: u32) -> Account {
    Account {
        id: id.into(),
        address: format!("{id}@widgets.io"),
        sender_name: format!("{id} (test)"),
        password_env: "SMTP_PASS_TEST".to_string(),
        daily_cap,
    }
}

/// An initial-send request to the given recipient.
pub fn initial_request(to: &str, now: DateTime<Utc>) -> SendRequest {
    SendRequest::new(
        Recipient::new(to),
        "Quick question",
        "Hi there,\n\nworth a chat?",
        RequestKind::Initial,
        now,
    )
}

/// A same-thread follow-up pinned to `account_id`.
pub fn followup_request(to: &str, account_id: &str, now: DateTime<Utc>) -> SendRequest {
    SendRequest::new(
        Recipient::new(to),
        "Re: Quick question",
        "Bumping this to the top of your inbox.",
        RequestKind::FollowupSameThread,
        now,
    )
    .with_affinity(account_id.into())
    .with_thread(coldflow_core::types::ThreadHeaders {
        in_reply_to: format!("<initial@{}>", to.rsplit_once('@').map(|(_, d)| d).unwrap_or("x")),
        references: vec![],
    })
}

/// A scheduler config with the given accounts, a fixed pacing seed, no
/// human skip, and limits tests can reason about. The calendar is left at
/// defaults (9-17 Eastern weekdays); tests pick `now` inside the window.
pub fn test_config(accounts: &[(&str, u32)]) -> ColdflowConfig {
    let mut config = ColdflowConfig::default();
    config.accounts = accounts
        .iter()
        .map(|(id, cap)| AccountConfig {
            id: (*id).to_string(),
            address: format!("{id}@widgets.io"),
            sender_name: format!("{id} (test)"),
            password_env: "SMTP_PASS_TEST".to_string(),
            daily_cap: Some(*cap),
        })
        .collect();
    config.pacing.seed = Some(42);
    config.pacing.skip_probability = 0.0;
    config.warmup.enabled = false;
    config.daemon.idle_poll_secs = 1;
    config
}
