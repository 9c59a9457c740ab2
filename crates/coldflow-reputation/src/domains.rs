// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recipient-domain throttling.
//!
//! Caps how many emails the whole fleet sends to one recipient domain per
//! day, so a campaign never hammers a single company. Webmail providers
//! are not companies and get a much higher allowance. Counts are persisted
//! so they survive restarts.

use chrono::NaiveDate;
use tracing::debug;

use coldflow_core::ColdflowError;
use coldflow_storage::{reputation as repdb, Database};

/// Webmail / free-email providers whose domains are shared by millions of
/// unrelated recipients.
const WEBMAIL_PROVIDERS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "outlook.com",
    "hotmail.com",
    "live.com",
    "msn.com",
    "yahoo.com",
    "ymail.com",
    "rocketmail.com",
    "aol.com",
    "aim.com",
    "icloud.com",
    "me.com",
    "mac.com",
    "protonmail.com",
    "proton.me",
    "zoho.com",
    "zohomail.com",
    "fastmail.com",
    "mail.com",
    "email.com",
    "gmx.com",
    "gmx.net",
    "yandex.com",
    "yandex.ru",
    "tutanota.com",
    "tuta.io",
];

/// Per-day cap on sends to a single recipient domain.
pub struct DomainThrottle {
    db: Database,
    max_per_domain: u32,
    webmail_multiplier: u32,
}

impl DomainThrottle {
    pub fn new(db: Database, max_per_domain: u32, webmail_multiplier: u32) -> Self {
        Self {
            db,
            max_per_domain,
            webmail_multiplier,
        }
    }

    fn limit_for(&self, domain: &str) -> u32 {
        if WEBMAIL_PROVIDERS.contains(&domain) {
            self.max_per_domain * self.webmail_multiplier
        } else {
            self.max_per_domain
        }
    }

    fn domain_of(address: &str) -> Option<String> {
        address
            .rsplit_once('@')
            .map(|(_, d)| d.to_ascii_lowercase())
            .filter(|d| !d.is_empty())
    }

    /// Whether another send to this recipient's domain is allowed today.
    /// Malformed addresses pass; the transport will reject them properly.
    pub async fn allows(&self, address: &str, day: NaiveDate) -> Result<bool, ColdflowError> {
        let Some(domain) = Self::domain_of(address) else {
            return Ok(true);
        };
        let count = repdb::domain_count(&self.db, &domain, day).await?;
        let limit = self.limit_for(&domain);
        let allowed = count < limit;
        if !allowed {
            debug!(%domain, count, limit, "recipient domain throttled");
        }
        Ok(allowed)
    }

    /// Count one send against the recipient's domain.
    pub async fn record_send(&self, address: &str, day: NaiveDate) -> Result<(), ColdflowError> {
        if let Some(domain) = Self::domain_of(address) {
            repdb::increment_domain(&self.db, &domain, day).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 3).unwrap()
    }

    async fn throttle() -> DomainThrottle {
        let db = Database::open_in_memory().await.unwrap();
        DomainThrottle::new(db, 3, 10)
    }

    #[tokio::test]
    async fn company_domain_caps_at_limit() {
        let t = throttle().await;
        for _ in 0..3 {
            assert!(t.allows("lead@corp.com", day()).await.unwrap());
            t.record_send("lead@corp.com", day()).await.unwrap();
        }
        assert!(!t.allows("other@corp.com", day()).await.unwrap());
        // A different domain is unaffected.
        assert!(t.allows("lead@elsewhere.io", day()).await.unwrap());
    }

    #[tokio::test]
    async fn webmail_gets_higher_allowance() {
        let t = throttle().await;
        for _ in 0..5 {
            t.record_send("someone@gmail.com", day()).await.unwrap();
        }
        // 5 > company cap of 3, still fine for webmail (cap 30).
        assert!(t.allows("someone@gmail.com", day()).await.unwrap());
    }

    #[tokio::test]
    async fn counts_are_per_day() {
        let t = throttle().await;
        for _ in 0..3 {
            t.record_send("lead@corp.com", day()).await.unwrap();
        }
        assert!(!t.allows("lead@corp.com", day()).await.unwrap());
        let tomorrow = day().succ_opt().unwrap();
        assert!(t.allows("lead@corp.com", tomorrow).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_addresses_pass_through() {
        let t = throttle().await;
        assert!(t.allows("not-an-address", day()).await.unwrap());
        // Recording one is a no-op rather than an error.
        t.record_send("not-an-address", day()).await.unwrap();
    }

    #[tokio::test]
    async fn domain_comparison_is_case_insensitive() {
        let t = throttle().await;
        for _ in 0..3 {
            t.record_send("lead@Corp.COM", day()).await.unwrap();
        }
        assert!(!t.allows("lead@corp.com", day()).await.unwrap());
    }
}
