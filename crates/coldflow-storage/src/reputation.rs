// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence for reputation state: day-keyed send counters, the outcome
//! ledger, recipient-domain counters, and account metadata.
//!
//! The in-memory reputation store is authoritative while the process runs;
//! these tables exist for restart recovery and reporting. Counters are
//! written as absolute values, not increments, so replaying a write is
//! harmless.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::OptionalExtension;

use coldflow_core::types::{AccountId, SendOutcome};
use coldflow_core::ColdflowError;

use crate::database::{map_tr_err, ts_from_string, ts_to_string, Database};

/// Rolling outcome counts over a window, per account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub sent: u32,
    pub bounced: u32,
    pub complained: u32,
    pub rejected: u32,
}

impl OutcomeCounts {
    pub fn total(&self) -> u32 {
        self.sent + self.bounced + self.complained + self.rejected
    }

    /// Bounce rate over the window; zero when there is no activity.
    pub fn bounce_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            f64::from(self.bounced) / f64::from(total)
        }
    }
}

/// Durable per-account metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountMeta {
    pub first_send_day: Option<NaiveDate>,
    pub blocked_until: Option<DateTime<Utc>>,
    pub block_reason: Option<String>,
    pub unblocked_at: Option<DateTime<Utc>>,
}

/// Write the absolute committed-send count for one (account, day).
pub async fn upsert_daily(
    db: &Database,
    account: &AccountId,
    day: NaiveDate,
    count: u32,
    last_send_at: Option<DateTime<Utc>>,
) -> Result<(), ColdflowError> {
    let account = account.0.clone();
    let day = day.to_string();
    let last = last_send_at.map(ts_to_string);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO daily_sends (account_id, day, count, last_send_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(account_id, day) DO UPDATE SET count = ?3, last_send_at = ?4",
                rusqlite::params![account, day, count, last],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Load the committed count and last-send time for one (account, day).
pub async fn load_daily(
    db: &Database,
    account: &AccountId,
    day: NaiveDate,
) -> Result<(u32, Option<DateTime<Utc>>), ColdflowError> {
    let account = account.0.clone();
    let day = day.to_string();
    let row = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT count, last_send_at FROM daily_sends \
                 WHERE account_id = ?1 AND day = ?2",
                rusqlite::params![account, day],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;

    match row {
        Some((count, last)) => {
            let last = last
                .as_deref()
                .map(ts_from_string)
                .transpose()
                .map_err(|e| ColdflowError::Storage {
                    source: Box::new(e),
                })?;
            Ok((count, last))
        }
        None => Ok((0, None)),
    }
}

/// Append one outcome to the ledger.
pub async fn record_outcome(
    db: &Database,
    account: &AccountId,
    outcome: SendOutcome,
    at: DateTime<Utc>,
) -> Result<(), ColdflowError> {
    let id = uuid::Uuid::new_v4().to_string();
    let account = account.0.clone();
    let outcome = outcome.to_string();
    let at = ts_to_string(at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO outcome_ledger (id, account_id, outcome, recorded_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, account, outcome, at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Aggregate outcomes for one account since `since`.
pub async fn outcome_window(
    db: &Database,
    account: &AccountId,
    since: DateTime<Utc>,
) -> Result<OutcomeCounts, ColdflowError> {
    let account = account.0.clone();
    let since = ts_to_string(since);
    let rows = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT outcome, COUNT(*) FROM outcome_ledger \
                 WHERE account_id = ?1 AND recorded_at >= ?2 GROUP BY outcome",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![account, since], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)?;

    let mut counts = OutcomeCounts::default();
    for (outcome, n) in rows {
        match outcome.as_str() {
            "sent" => counts.sent = n,
            "bounced" => counts.bounced = n,
            "complained" => counts.complained = n,
            "rejected" => counts.rejected = n,
            _ => {}
        }
    }
    Ok(counts)
}

/// Atomically increment a recipient-domain counter for one day and return
/// the new count.
pub async fn increment_domain(
    db: &Database,
    domain: &str,
    day: NaiveDate,
) -> Result<u32, ColdflowError> {
    let domain = domain.to_ascii_lowercase();
    let day = day.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "INSERT INTO domain_sends (domain, day, count) VALUES (?1, ?2, 1) \
                 ON CONFLICT(domain, day) DO UPDATE SET count = count + 1 \
                 RETURNING count",
                rusqlite::params![domain, day],
                |row| row.get::<_, u32>(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Current count for a recipient domain on one day.
pub async fn domain_count(
    db: &Database,
    domain: &str,
    day: NaiveDate,
) -> Result<u32, ColdflowError> {
    let domain = domain.to_ascii_lowercase();
    let day = day.to_string();
    let count = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT count FROM domain_sends WHERE domain = ?1 AND day = ?2",
                rusqlite::params![domain, day],
                |row| row.get::<_, u32>(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;
    Ok(count.unwrap_or(0))
}

/// Record the first day an account ever sent, if not already recorded.
/// Warm-up week computation keys off this date.
pub async fn set_first_send_day_if_absent(
    db: &Database,
    account: &AccountId,
    day: NaiveDate,
) -> Result<(), ColdflowError> {
    let account = account.0.clone();
    let day = day.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO account_meta (account_id, first_send_day) VALUES (?1, ?2) \
                 ON CONFLICT(account_id) DO UPDATE SET \
                 first_send_day = COALESCE(first_send_day, ?2)",
                rusqlite::params![account, day],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Persist a provider block.
pub async fn set_block(
    db: &Database,
    account: &AccountId,
    until: DateTime<Utc>,
    reason: &str,
) -> Result<(), ColdflowError> {
    let account = account.0.clone();
    let until = ts_to_string(until);
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO account_meta (account_id, blocked_until, block_reason) \
                 VALUES (?1, ?2, ?3) \
                 ON CONFLICT(account_id) DO UPDATE SET blocked_until = ?2, block_reason = ?3",
                rusqlite::params![account, until, reason],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Clear a block, recording when the account returned to rotation (the
/// warm-down ramp keys off `unblocked_at`).
pub async fn clear_block(
    db: &Database,
    account: &AccountId,
    at: DateTime<Utc>,
) -> Result<(), ColdflowError> {
    let account = account.0.clone();
    let at = ts_to_string(at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO account_meta (account_id, unblocked_at) VALUES (?1, ?2) \
                 ON CONFLICT(account_id) DO UPDATE SET \
                 blocked_until = NULL, block_reason = NULL, unblocked_at = ?2",
                rusqlite::params![account, at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Load metadata for one account.
pub async fn load_meta(
    db: &Database,
    account: &AccountId,
) -> Result<AccountMeta, ColdflowError> {
    let account = account.0.clone();
    let row = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT first_send_day, blocked_until, block_reason, unblocked_at \
                 FROM account_meta WHERE account_id = ?1",
                rusqlite::params![account],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;

    let Some((first, blocked_until, block_reason, unblocked_at)) = row else {
        return Ok(AccountMeta::default());
    };

    let storage_err = |e: Box<dyn std::error::Error + Send + Sync>| ColdflowError::Storage {
        source: e,
    };

    Ok(AccountMeta {
        first_send_day: first
            .as_deref()
            .map(|s| s.parse::<NaiveDate>())
            .transpose()
            .map_err(|e| storage_err(Box::new(e)))?,
        blocked_until: blocked_until
            .as_deref()
            .map(ts_from_string)
            .transpose()
            .map_err(|e| storage_err(Box::new(e)))?,
        block_reason,
        unblocked_at: unblocked_at
            .as_deref()
            .map(ts_from_string)
            .transpose()
            .map_err(|e| storage_err(Box::new(e)))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn daily_counters_upsert_absolute_values() {
        let db = Database::open_in_memory().await.unwrap();
        let alice: AccountId = "alice".into();
        let d = day("2026-03-02");
        let now = Utc::now();

        assert_eq!(load_daily(&db, &alice, d).await.unwrap().0, 0);
        upsert_daily(&db, &alice, d, 3, Some(now)).await.unwrap();
        upsert_daily(&db, &alice, d, 7, Some(now)).await.unwrap();
        let (count, last) = load_daily(&db, &alice, d).await.unwrap();
        assert_eq!(count, 7);
        assert!(last.is_some());

        // Day keying: another day reads as zero without any reset mutation.
        assert_eq!(load_daily(&db, &alice, day("2026-03-03")).await.unwrap().0, 0);
    }

    #[tokio::test]
    async fn outcome_window_aggregates_and_respects_cutoff() {
        let db = Database::open_in_memory().await.unwrap();
        let alice: AccountId = "alice".into();
        let now = Utc::now();

        record_outcome(&db, &alice, SendOutcome::Sent, now - Duration::days(10))
            .await
            .unwrap();
        for _ in 0..18 {
            record_outcome(&db, &alice, SendOutcome::Sent, now).await.unwrap();
        }
        record_outcome(&db, &alice, SendOutcome::Bounced, now).await.unwrap();
        record_outcome(&db, &alice, SendOutcome::Bounced, now).await.unwrap();

        let counts = outcome_window(&db, &alice, now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(counts.sent, 18, "outcome outside the window must not count");
        assert_eq!(counts.bounced, 2);
        assert!((counts.bounce_rate() - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn domain_counter_increments_atomically() {
        let db = Database::open_in_memory().await.unwrap();
        let d = day("2026-03-02");
        assert_eq!(domain_count(&db, "corp.com", d).await.unwrap(), 0);
        assert_eq!(increment_domain(&db, "Corp.COM", d).await.unwrap(), 1);
        assert_eq!(increment_domain(&db, "corp.com", d).await.unwrap(), 2);
        assert_eq!(domain_count(&db, "corp.com", d).await.unwrap(), 2);
        // Separate day, separate counter.
        assert_eq!(domain_count(&db, "corp.com", day("2026-03-03")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn first_send_day_is_write_once() {
        let db = Database::open_in_memory().await.unwrap();
        let alice: AccountId = "alice".into();
        set_first_send_day_if_absent(&db, &alice, day("2026-03-01"))
            .await
            .unwrap();
        set_first_send_day_if_absent(&db, &alice, day("2026-04-01"))
            .await
            .unwrap();
        let meta = load_meta(&db, &alice).await.unwrap();
        assert_eq!(meta.first_send_day, Some(day("2026-03-01")));
    }

    #[tokio::test]
    async fn block_lifecycle_round_trips() {
        let db = Database::open_in_memory().await.unwrap();
        let alice: AccountId = "alice".into();
        let now = Utc::now();

        set_block(&db, &alice, now + Duration::hours(24), "554 relay denied")
            .await
            .unwrap();
        let meta = load_meta(&db, &alice).await.unwrap();
        assert!(meta.blocked_until.is_some());
        assert_eq!(meta.block_reason.as_deref(), Some("554 relay denied"));

        clear_block(&db, &alice, now + Duration::hours(25)).await.unwrap();
        let meta = load_meta(&db, &alice).await.unwrap();
        assert!(meta.blocked_until.is_none());
        assert!(meta.block_reason.is_none());
        assert!(meta.unblocked_at.is_some());
    }

    #[tokio::test]
    async fn missing_account_meta_defaults() {
        let db = Database::open_in_memory().await.unwrap();
        let meta = load_meta(&db, &"ghost".into()).await.unwrap();
        assert_eq!(meta, AccountMeta::default());
    }
}
