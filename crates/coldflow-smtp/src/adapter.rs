// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! lettre-backed SMTP transport adapter.
//!
//! One fresh STARTTLS connection per send (the relay drops idle
//! connections anyway), threading headers for same-thread follow-ups, and
//! a multipart/alternative body with an auto-generated HTML rendition
//! when the pipeline supplies only plain text.
//!
//! Failure classification: 4xx and connection trouble are transient; 5xx
//! on this message is permanent; a 554 policy rejection means the relay
//! has blocked the sending ACCOUNT, not the message.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, warn};

use coldflow_config::model::SmtpConfig;
use coldflow_core::types::{Account, OutboundEmail, SendReceipt, TransportFailure};
use coldflow_core::TransportAdapter;

use crate::html::text_to_html;

/// SMTP submission through a shared relay, one account at a time.
pub struct SmtpSender {
    host: String,
    port: u16,
    timeout_secs: u64,
    reply_to: Option<String>,
}

impl SmtpSender {
    pub fn new(config: &SmtpConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            timeout_secs: config.timeout_secs,
            reply_to: config.reply_to.clone(),
        }
    }

    /// Build the RFC 5322 message for one send. Content passes through as
    /// given; only headers the scheduler owns (Message-ID, threading,
    /// Reply-To) are added here.
    pub fn build_message(
        &self,
        account: &Account,
        mail: &OutboundEmail,
    ) -> Result<(Message, String), TransportFailure> {
        let from: Mailbox = format!("{} <{}>", account.sender_name, account.address)
            .parse()
            .map_err(|e| {
                TransportFailure::permanent(None, format!("invalid sender mailbox: {e}"))
            })?;
        let to: Mailbox = match &mail.to.name {
            Some(name) => format!("{} <{}>", name, mail.to.address),
            None => mail.to.address.clone(),
        }
        .parse()
        .map_err(|e| {
            TransportFailure::permanent(None, format!("invalid recipient address: {e}"))
        })?;
        let reply_to: Mailbox = self
            .reply_to
            .as_deref()
            .unwrap_or(&account.address)
            .parse()
            .map_err(|e| {
                TransportFailure::permanent(None, format!("invalid reply-to address: {e}"))
            })?;

        let message_id = format!("<{}@{}>", uuid::Uuid::new_v4(), account.domain());
        let mut builder = Message::builder()
            .from(from)
            .to(to)
            .reply_to(reply_to)
            .subject(mail.subject.clone())
            .message_id(Some(message_id.clone()));

        if let Some(thread) = &mail.thread {
            builder = builder.in_reply_to(thread.in_reply_to.clone());
            let references = if thread.references.is_empty() {
                thread.in_reply_to.clone()
            } else {
                thread.references.join(" ")
            };
            builder = builder.references(references);
        }

        let html = mail
            .html_body
            .clone()
            .unwrap_or_else(|| text_to_html(&mail.text_body));
        let message = builder
            .multipart(MultiPart::alternative_plain_html(
                mail.text_body.clone(),
                html,
            ))
            .map_err(|e| TransportFailure::permanent(None, format!("message build: {e}")))?;

        Ok((message, message_id))
    }

    fn password_for(&self, account: &Account) -> Result<String, TransportFailure> {
        std::env::var(&account.password_env).map_err(|_| {
            // Missing credentials are systemic: transient so the circuit
            // breaker (not a per-request abandon) surfaces them.
            TransportFailure::transient(format!(
                "SMTP password env var {} is not set",
                account.password_env
            ))
        })
    }
}

/// Map an SMTP-level error to the scheduler's failure taxonomy.
fn classify(err: &lettre::transport::smtp::Error) -> TransportFailure {
    let code = err
        .status()
        .and_then(|c| c.to_string().parse::<u16>().ok());
    if code == Some(554) {
        TransportFailure::blocked(code, err.to_string())
    } else if err.is_permanent() {
        TransportFailure::permanent(code, err.to_string())
    } else {
        TransportFailure::transient(err.to_string())
    }
}

#[async_trait]
impl TransportAdapter for SmtpSender {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(
        &self,
        account: &Account,
        mail: &OutboundEmail,
    ) -> Result<SendReceipt, TransportFailure> {
        let (message, message_id) = self.build_message(account, mail)?;
        let password = self.password_for(account)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
            .map_err(|e| TransportFailure::transient(format!("relay setup: {e}")))?
            .port(self.port)
            .credentials(Credentials::new(account.address.clone(), password))
            .timeout(Some(std::time::Duration::from_secs(self.timeout_secs)))
            .build();

        debug!(
            host = %self.host,
            port = self.port,
            from = %account.address,
            to = %mail.to.address,
            "submitting message"
        );

        match transport.send(message).await {
            Ok(_) => {
                debug!(%message_id, to = %mail.to.address, "smtp transmitted");
                Ok(SendReceipt { message_id })
            }
            Err(e) => {
                let failure = classify(&e);
                warn!(
                    from = %account.address,
                    to = %mail.to.address,
                    kind = %failure.kind,
                    error = %e,
                    "smtp send failed"
                );
                Err(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldflow_core::types::{Recipient, ThreadHeaders};

    fn account() -> Account {
        Account {
            id: "alice".into(),
            address: "alice@widgets.io".to_string(),
            sender_name: "Alice Smith".to_string(),
            password_env: "COLDFLOW_TEST_UNSET".to_string(),
            daily_cap: 50,
        }
    }

    fn sender() -> SmtpSender {
        SmtpSender::new(&SmtpConfig::default())
    }

    fn mail() -> OutboundEmail {
        OutboundEmail {
            to: Recipient {
                address: "lead@corp.com".to_string(),
                name: Some("Lead Person".to_string()),
            },
            subject: "Quick question".to_string(),
            text_body: "Hi,\n\nworth a chat?".to_string(),
            html_body: None,
            reply_to: None,
            thread: None,
        }
    }

    #[test]
    fn builds_multipart_with_generated_html() {
        let (message, message_id) = sender().build_message(&account(), &mail()).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("Subject: Quick question"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("worth a chat?"));
        assert!(message_id.ends_with("@widgets.io>"));
        assert!(raw.contains("Reply-To: alice@widgets.io"));
    }

    #[test]
    fn threading_headers_for_followups() {
        let mut m = mail();
        m.thread = Some(ThreadHeaders {
            in_reply_to: "<orig@widgets.io>".to_string(),
            references: vec!["<root@widgets.io>".to_string(), "<orig@widgets.io>".to_string()],
        });
        let (message, _) = sender().build_message(&account(), &m).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("In-Reply-To: <orig@widgets.io>"));
        assert!(raw.contains("References: <root@widgets.io> <orig@widgets.io>"));
    }

    #[test]
    fn references_fall_back_to_in_reply_to() {
        let mut m = mail();
        m.thread = Some(ThreadHeaders {
            in_reply_to: "<orig@widgets.io>".to_string(),
            references: vec![],
        });
        let (message, _) = sender().build_message(&account(), &m).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("References: <orig@widgets.io>"));
    }

    #[test]
    fn invalid_recipient_is_permanent() {
        let mut m = mail();
        m.to.address = "not an address".to_string();
        m.to.name = None;
        let err = sender().build_message(&account(), &m).unwrap_err();
        assert_eq!(err.kind, coldflow_core::types::FailureKind::Permanent);
    }

    #[test]
    fn configured_reply_to_wins() {
        let mut config = SmtpConfig::default();
        config.reply_to = Some("replies@widgets.io".to_string());
        let sender = SmtpSender::new(&config);
        let (message, _) = sender.build_message(&account(), &mail()).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("Reply-To: replies@widgets.io"));
    }

    #[test]
    fn missing_password_env_is_transient() {
        let err = sender().password_for(&account()).unwrap_err();
        assert_eq!(err.kind, coldflow_core::types::FailureKind::Transient);
        assert!(err.message.contains("COLDFLOW_TEST_UNSET"));
    }
}
