// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Coldflow workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a configured sending account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a send request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a fresh random request id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a claim token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub String);

impl ClaimId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for ClaimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of send obligation a request represents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// First touch of a new campaign.
    Initial,
    /// Follow-up in the same conversation thread. MUST reuse the original
    /// sender account (thread affinity is an invariant, not a preference).
    FollowupSameThread,
    /// Follow-up opening a fresh thread to the same recipient.
    FollowupNewThread,
    /// Warm-up traffic to seed accounts.
    Warmup,
}

impl RequestKind {
    /// Whether this kind carries a follow-up deadline that should jump the
    /// queue ahead of fresh initial sends when it is about to close.
    pub fn is_followup(self) -> bool {
        matches!(self, Self::FollowupSameThread | Self::FollowupNewThread)
    }
}

/// Lifecycle state of a send request.
///
/// `pending -> claimed -> sent | failed`, with failed transient attempts
/// returning to `pending` until the retry budget is spent, then `abandoned`.
/// No request is ever silently dropped: it is always in exactly one of
/// these states.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Claimed,
    Sent,
    Failed,
    Abandoned,
}

/// Terminal outcome of one transport attempt, as recorded in the
/// reputation ledger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    Sent,
    Bounced,
    Complained,
    Rejected,
}

/// A message recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Recipient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    /// The domain part of the address, lowercased. Empty if malformed.
    pub fn domain(&self) -> String {
        self.address
            .rsplit_once('@')
            .map(|(_, d)| d.to_ascii_lowercase())
            .unwrap_or_default()
    }
}

/// RFC 5322 threading headers carried by same-thread follow-ups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadHeaders {
    /// Message-ID of the message being replied to.
    pub in_reply_to: String,
    /// Full References chain; falls back to `in_reply_to` when empty.
    #[serde(default)]
    pub references: Vec<String>,
}

/// One obligation to deliver one message to one recipient.
///
/// Requests arrive fully formed from the content pipeline; the scheduler
/// never generates or validates message bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRequest {
    pub id: RequestId,
    pub recipient: Recipient,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub html_body: Option<String>,
    pub kind: RequestKind,
    /// Required sender identity. Mandatory for same-thread follow-ups.
    #[serde(default)]
    pub account_affinity: Option<AccountId>,
    #[serde(default)]
    pub thread: Option<ThreadHeaders>,
    /// Instant after which a follow-up loses its threading window. Used to
    /// prioritize closing follow-ups over fresh initial sends.
    #[serde(default)]
    pub followup_deadline: Option<DateTime<Utc>>,
    /// Do not dispatch before this instant (retry backoff, capacity deferral).
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
    pub status: RequestStatus,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

impl SendRequest {
    /// Create a pending request with a fresh id.
    pub fn new(
        recipient: Recipient,
        subject: impl Into<String>,
        body: impl Into<String>,
        kind: RequestKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RequestId::generate(),
            recipient,
            subject: subject.into(),
            body: body.into(),
            html_body: None,
            kind,
            account_affinity: None,
            thread: None,
            followup_deadline: None,
            not_before: None,
            status: RequestStatus::Pending,
            retry_count: 0,
            created_at,
        }
    }

    /// Pin this request to a specific sender account.
    pub fn with_affinity(mut self, account: AccountId) -> Self {
        self.account_affinity = Some(account);
        self
    }

    /// Attach threading headers (same-thread follow-ups).
    pub fn with_thread(mut self, thread: ThreadHeaders) -> Self {
        self.thread = Some(thread);
        self
    }

    /// Set the follow-up window deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.followup_deadline = Some(deadline);
        self
    }
}

/// A configured sending identity. Mutable runtime state (cooldowns, blocks,
/// counters) lives in the reputation store, never here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Mailbox address, e.g. `alice@example.com`.
    pub address: String,
    /// Display name used in the From header.
    pub sender_name: String,
    /// Name of the environment variable holding the SMTP password.
    pub password_env: String,
    /// Configured daily send cap before warm-up/reputation adjustments.
    pub daily_cap: u32,
}

impl Account {
    /// The sending domain, derived from the address.
    pub fn domain(&self) -> String {
        self.address
            .rsplit_once('@')
            .map(|(_, d)| d.to_ascii_lowercase())
            .unwrap_or_default()
    }
}

/// The fully rendered message handed to the transport adapter.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: Recipient,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
    pub reply_to: Option<String>,
    pub thread: Option<ThreadHeaders>,
}

impl OutboundEmail {
    /// Build the outbound message for a request. Content passes through
    /// untouched; the scheduler owns only headers relevant to threading.
    pub fn from_request(request: &SendRequest) -> Self {
        Self {
            to: request.recipient.clone(),
            subject: request.subject.clone(),
            text_body: request.body.clone(),
            html_body: request.html_body.clone(),
            reply_to: None,
            thread: request.thread.clone(),
        }
    }
}

/// Proof of a successful transport submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Message-ID assigned to the submitted message.
    pub message_id: String,
}

/// Classification of a failed transport attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// Network trouble, greylisting, 4xx rate limits. Retried with bounded
    /// exponential backoff at the request level.
    Transient,
    /// Hard bounce, invalid recipient, 5xx rejection of this message.
    /// Terminal for the request; recorded as a reputation signal.
    Permanent,
    /// The provider rejected the sending account itself (554-class policy
    /// block). The account is blocked; the request is not at fault.
    Blocked,
}

/// A failed transport attempt with enough context to classify and log it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} transport failure{}: {message}", .code.map(|c| format!(" ({c})")).unwrap_or_default())]
pub struct TransportFailure {
    pub kind: FailureKind,
    /// SMTP reply code when one was received.
    pub code: Option<u16>,
    pub message: String,
}

impl TransportFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            code: None,
            message: message.into(),
        }
    }

    pub fn permanent(code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            code,
            message: message.into(),
        }
    }

    pub fn blocked(code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Blocked,
            code,
            message: message.into(),
        }
    }
}

/// A short-lived reservation binding one pending send to one account.
///
/// Issuing a claim consumes a capacity slot immediately; redemption keeps
/// it, release or expiry returns it. An unredeemed token past `expires_at`
/// is swept so a crashed worker cannot strand an account's daily capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimToken {
    pub id: ClaimId,
    pub account_id: AccountId,
    pub request_id: RequestId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ClaimToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Consistent snapshot of one account's scheduling state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountState {
    pub account_id: AccountId,
    pub daily_cap: u32,
    /// Cap after warm-up, warm-down, global-target distribution, and the
    /// bounce-rate breaker are applied.
    pub effective_cap: u32,
    /// Sends committed today (redeemed claims).
    pub sends_today: u32,
    /// Claims issued but not yet redeemed or released.
    pub open_claims: u32,
    /// Slots still available: `effective_cap - sends_today - open_claims`.
    pub remaining: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_send_at: Option<DateTime<Utc>>,
    pub blocked: bool,
    pub block_reason: Option<String>,
    /// Warm-up week (1-based) since the account's first recorded send.
    pub warmup_week: u32,
}

/// Per-account line in the operator-facing daily summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub sent: u32,
    pub remaining: u32,
    pub blocked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_kind_round_trips_through_strings() {
        use std::str::FromStr;
        for kind in [
            RequestKind::Initial,
            RequestKind::FollowupSameThread,
            RequestKind::FollowupNewThread,
            RequestKind::Warmup,
        ] {
            let s = kind.to_string();
            assert_eq!(RequestKind::from_str(&s).unwrap(), kind);
        }
    }

    #[test]
    fn request_status_serializes_snake_case() {
        assert_eq!(RequestStatus::Pending.to_string(), "pending");
        assert_eq!(
            RequestStatus::Abandoned.to_string(),
            "abandoned"
        );
    }

    #[test]
    fn followup_kinds_are_followups() {
        assert!(RequestKind::FollowupSameThread.is_followup());
        assert!(RequestKind::FollowupNewThread.is_followup());
        assert!(!RequestKind::Initial.is_followup());
        assert!(!RequestKind::Warmup.is_followup());
    }

    #[test]
    fn recipient_domain_is_lowercased() {
        let r = Recipient::new("Jane.Doe@Example.COM");
        assert_eq!(r.domain(), "example.com");
    }

    #[test]
    fn recipient_domain_empty_when_malformed() {
        let r = Recipient::new("not-an-address");
        assert_eq!(r.domain(), "");
    }

    #[test]
    fn account_domain_derived_from_address() {
        let account = Account {
            id: "a1".into(),
            address: "outreach@widgets.io".to_string(),
            sender_name: "Pat".to_string(),
            password_env: "SMTP_PASS_A1".to_string(),
            daily_cap: 50,
        };
        assert_eq!(account.domain(), "widgets.io");
    }

    #[test]
    fn claim_token_expiry_boundary() {
        let issued = Utc::now();
        let token = ClaimToken {
            id: ClaimId::generate(),
            account_id: "a1".into(),
            request_id: RequestId::generate(),
            issued_at: issued,
            expires_at: issued + chrono::Duration::minutes(5),
        };
        assert!(!token.is_expired(issued));
        assert!(!token.is_expired(issued + chrono::Duration::minutes(4)));
        assert!(token.is_expired(issued + chrono::Duration::minutes(5)));
    }

    #[test]
    fn transport_failure_display_includes_code() {
        let f = TransportFailure::blocked(Some(554), "relay access denied");
        let msg = f.to_string();
        assert!(msg.contains("554"), "got: {msg}");
        assert!(msg.contains("blocked"), "got: {msg}");
    }

    #[test]
    fn send_request_builder_helpers() {
        let now = Utc::now();
        let req = SendRequest::new(
            Recipient::new("lead@corp.com"),
            "Hello",
            "body",
            RequestKind::FollowupSameThread,
            now,
        )
        .with_affinity("alice".into())
        .with_thread(ThreadHeaders {
            in_reply_to: "<msg-1@widgets.io>".to_string(),
            references: vec![],
        })
        .with_deadline(now + chrono::Duration::days(1));

        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.retry_count, 0);
        assert_eq!(req.account_affinity, Some("alice".into()));
        assert!(req.thread.is_some());
        assert!(req.followup_deadline.is_some());
    }

    #[test]
    fn outbound_email_carries_thread_headers() {
        let now = Utc::now();
        let req = SendRequest::new(
            Recipient::new("lead@corp.com"),
            "Re: Hello",
            "following up",
            RequestKind::FollowupSameThread,
            now,
        )
        .with_thread(ThreadHeaders {
            in_reply_to: "<msg-1@widgets.io>".to_string(),
            references: vec!["<msg-0@widgets.io>".to_string()],
        });

        let mail = OutboundEmail::from_request(&req);
        assert_eq!(mail.to.address, "lead@corp.com");
        let thread = mail.thread.unwrap();
        assert_eq!(thread.in_reply_to, "<msg-1@widgets.io>");
        assert_eq!(thread.references.len(), 1);
    }
}
