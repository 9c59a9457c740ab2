// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and schema.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread; the status-guarded queue claims rely on that serialization for
//! their atomicity. Do NOT open additional connections for writes.

use chrono::{DateTime, Utc};
use tracing::debug;

use coldflow_core::ColdflowError;

/// Idempotent schema, applied on every open.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS send_requests (
    id                TEXT PRIMARY KEY,
    recipient         TEXT NOT NULL,
    recipient_name    TEXT,
    subject           TEXT NOT NULL,
    body              TEXT NOT NULL,
    html_body         TEXT,
    kind              TEXT NOT NULL,
    account_affinity  TEXT,
    in_reply_to       TEXT,
    thread_references TEXT,
    followup_deadline TEXT,
    not_before        TEXT,
    status            TEXT NOT NULL DEFAULT 'pending',
    retry_count       INTEGER NOT NULL DEFAULT 0,
    created_at        TEXT NOT NULL,
    claimed_at        TEXT,
    sent_at           TEXT,
    sent_from         TEXT,
    message_id        TEXT,
    last_error        TEXT
);
CREATE INDEX IF NOT EXISTS idx_requests_ready
    ON send_requests(status, not_before);

CREATE TABLE IF NOT EXISTS daily_sends (
    account_id   TEXT NOT NULL,
    day          TEXT NOT NULL,
    count        INTEGER NOT NULL DEFAULT 0,
    last_send_at TEXT,
    PRIMARY KEY (account_id, day)
);

CREATE TABLE IF NOT EXISTS outcome_ledger (
    id          TEXT PRIMARY KEY,
    account_id  TEXT NOT NULL,
    outcome     TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ledger_account_time
    ON outcome_ledger(account_id, recorded_at);

CREATE TABLE IF NOT EXISTS domain_sends (
    domain TEXT NOT NULL,
    day    TEXT NOT NULL,
    count  INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (domain, day)
);

CREATE TABLE IF NOT EXISTS account_meta (
    account_id     TEXT PRIMARY KEY,
    first_send_day TEXT,
    blocked_until  TEXT,
    block_reason   TEXT,
    unblocked_at   TEXT
);
";

/// Convert a tokio-rusqlite error into ColdflowError::Storage.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> ColdflowError {
    ColdflowError::Storage {
        source: Box::new(e),
    }
}

/// Format a timestamp the way every column in this schema stores it.
///
/// Millisecond-precision RFC 3339 in UTC, so lexicographic string order
/// equals chronological order and SQL comparisons work on raw text.
pub fn ts_to_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parse a stored timestamp back. Returns a rusqlite conversion error so it
/// can be raised from inside row-mapping closures.
pub fn ts_from_string(s: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Handle to the coldflow SQLite database.
///
/// Cheap to clone; all clones share the single background writer thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs and schema.
    pub async fn open(path: &str) -> Result<Self, ColdflowError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| ColdflowError::Storage {
                source: Box::new(e),
            })?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA foreign_keys = ON;",
            )?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, "database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (tests).
    pub async fn open_in_memory() -> Result<Self, ColdflowError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| ColdflowError::Storage {
                source: Box::new(e),
            })?;
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL before shutdown.
    pub async fn close(&self) -> Result<(), ColdflowError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .unwrap();

        for table in [
            "account_meta",
            "daily_sends",
            "domain_sends",
            "outcome_ledger",
            "send_requests",
        ] {
            assert!(tables.iter().any(|t| t == table), "missing table {table}");
        }
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("twice.db");
        let db1 = Database::open(path.to_str().unwrap()).await.unwrap();
        db1.close().await.unwrap();
        // Re-opening against an existing schema must not fail.
        Database::open(path.to_str().unwrap()).await.unwrap();
    }

    #[test]
    fn timestamps_round_trip() {
        let now = Utc::now();
        let s = ts_to_string(now);
        let parsed = ts_from_string(&s).unwrap();
        // Millisecond precision survives the round trip.
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn timestamp_string_order_is_chronological() {
        let early = ts_to_string("2026-03-01T09:00:00Z".parse().unwrap());
        let late = ts_to_string("2026-03-01T15:30:00Z".parse().unwrap());
        assert!(early < late);
    }
}
