// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch queue rows: the durable backlog of pending send requests.
//!
//! The claim operation is a single status-guarded `UPDATE ... RETURNING`
//! executed on the serialized writer thread, so no two workers can ever
//! claim the same row. Requests move `pending -> claimed -> sent | failed`,
//! with transient failures returning to `pending` (retry) until abandoned.

use chrono::{DateTime, Duration, Utc};
use rusqlite::OptionalExtension;
use tracing::{debug, info};

use coldflow_core::types::{
    AccountId, Recipient, RequestId, RequestKind, RequestStatus, SendRequest, ThreadHeaders,
};
use coldflow_core::ColdflowError;

use crate::database::{map_tr_err, ts_from_string, ts_to_string, Database};

const COLUMNS: &str = "id, recipient, recipient_name, subject, body, html_body, kind, \
     account_affinity, in_reply_to, thread_references, followup_deadline, not_before, \
     status, retry_count, created_at";

fn row_to_request(row: &rusqlite::Row<'_>) -> Result<SendRequest, rusqlite::Error> {
    use std::str::FromStr;

    let parse_err = |e: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e)
    };

    let kind_str: String = row.get(6)?;
    let kind = RequestKind::from_str(&kind_str).map_err(|e| parse_err(Box::new(e)))?;
    let status_str: String = row.get(12)?;
    let status = RequestStatus::from_str(&status_str).map_err(|e| parse_err(Box::new(e)))?;

    let references: Vec<String> = match row.get::<_, Option<String>>(9)? {
        Some(json) => serde_json::from_str(&json).map_err(|e| parse_err(Box::new(e)))?,
        None => Vec::new(),
    };
    let thread = row
        .get::<_, Option<String>>(8)?
        .map(|in_reply_to| ThreadHeaders {
            in_reply_to,
            references,
        });

    let opt_ts = |v: Option<String>| -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
        v.as_deref().map(ts_from_string).transpose()
    };

    Ok(SendRequest {
        id: RequestId(row.get(0)?),
        recipient: Recipient {
            address: row.get(1)?,
            name: row.get(2)?,
        },
        subject: row.get(3)?,
        body: row.get(4)?,
        html_body: row.get(5)?,
        kind,
        account_affinity: row.get::<_, Option<String>>(7)?.map(AccountId),
        thread,
        followup_deadline: opt_ts(row.get(10)?)?,
        not_before: opt_ts(row.get(11)?)?,
        status,
        retry_count: row.get(13)?,
        created_at: ts_from_string(&row.get::<_, String>(14)?)?,
    })
}

/// Insert a new pending request.
pub async fn insert_request(db: &Database, request: &SendRequest) -> Result<(), ColdflowError> {
    let r = request.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO send_requests (id, recipient, recipient_name, subject, body, \
                 html_body, kind, account_affinity, in_reply_to, thread_references, \
                 followup_deadline, not_before, status, retry_count, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                rusqlite::params![
                    r.id.0,
                    r.recipient.address,
                    r.recipient.name,
                    r.subject,
                    r.body,
                    r.html_body,
                    r.kind.to_string(),
                    r.account_affinity.as_ref().map(|a| a.0.clone()),
                    r.thread.as_ref().map(|t| t.in_reply_to.clone()),
                    r.thread
                        .as_ref()
                        .map(|t| serde_json::to_string(&t.references).unwrap_or_default()),
                    r.followup_deadline.map(ts_to_string),
                    r.not_before.map(ts_to_string),
                    r.status.to_string(),
                    r.retry_count,
                    ts_to_string(r.created_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

    info!(
        request_id = %request.id,
        kind = %request.kind,
        recipient = %request.recipient.address,
        "request enqueued"
    );
    Ok(())
}

/// Atomically claim the next ready request, or return `None`.
///
/// Ordering: follow-ups whose deadline falls within `deadline_lookahead`
/// jump ahead of everything else (closing threading windows must not be
/// missed); within each band, oldest deadline/created first.
pub async fn claim_next_ready(
    db: &Database,
    now: DateTime<Utc>,
    deadline_lookahead: Duration,
) -> Result<Option<SendRequest>, ColdflowError> {
    let now_s = ts_to_string(now);
    let horizon_s = ts_to_string(now + deadline_lookahead);
    let sql = format!(
        "UPDATE send_requests SET status = 'claimed', claimed_at = ?1 \
         WHERE id = ( \
             SELECT id FROM send_requests \
             WHERE status = 'pending' AND (not_before IS NULL OR not_before <= ?1) \
             ORDER BY \
                 CASE WHEN followup_deadline IS NOT NULL AND followup_deadline <= ?2 \
                      THEN 0 ELSE 1 END, \
                 COALESCE(followup_deadline, created_at), \
                 created_at \
             LIMIT 1 \
         ) RETURNING {COLUMNS}"
    );

    let claimed = db
        .connection()
        .call(move |conn| {
            conn.query_row(&sql, rusqlite::params![now_s, horizon_s], row_to_request)
                .optional()
        })
        .await
        .map_err(map_tr_err)?;

    if let Some(ref request) = claimed {
        debug!(request_id = %request.id, kind = %request.kind, "request claimed");
    }
    Ok(claimed)
}

/// Return a claimed request to `pending` with a new not-before and retry
/// count (transient failure backoff or capacity deferral).
pub async fn requeue(
    db: &Database,
    id: &RequestId,
    not_before: Option<DateTime<Utc>>,
    retry_count: u32,
) -> Result<(), ColdflowError> {
    let id = id.0.clone();
    let nb = not_before.map(ts_to_string);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE send_requests SET status = 'pending', not_before = ?2, \
                 retry_count = ?3, claimed_at = NULL WHERE id = ?1 AND status = 'claimed'",
                rusqlite::params![id, nb, retry_count],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Release a claimed request unchanged (shutdown path).
pub async fn release(db: &Database, id: &RequestId) -> Result<(), ColdflowError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE send_requests SET status = 'pending', claimed_at = NULL \
                 WHERE id = ?1 AND status = 'claimed'",
                rusqlite::params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Release every claim older than `cutoff` (crash recovery). Returns how
/// many rows went back to pending.
pub async fn release_stale(
    db: &Database,
    cutoff: DateTime<Utc>,
) -> Result<usize, ColdflowError> {
    let cutoff_s = ts_to_string(cutoff);
    let released = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE send_requests SET status = 'pending', claimed_at = NULL \
                 WHERE status = 'claimed' AND claimed_at < ?1",
                rusqlite::params![cutoff_s],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)?;
    if released > 0 {
        info!(released, "released stale claimed requests");
    }
    Ok(released)
}

/// Mark a claimed request sent.
pub async fn mark_sent(
    db: &Database,
    id: &RequestId,
    at: DateTime<Utc>,
    sent_from: &AccountId,
    message_id: &str,
) -> Result<(), ColdflowError> {
    let id = id.0.clone();
    let at_s = ts_to_string(at);
    let from = sent_from.0.clone();
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE send_requests SET status = 'sent', sent_at = ?2, sent_from = ?3, \
                 message_id = ?4 WHERE id = ?1 AND status = 'claimed'",
                rusqlite::params![id, at_s, from, message_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a claimed request failed (terminal: permanent transport failure).
pub async fn mark_failed(
    db: &Database,
    id: &RequestId,
    error: &str,
) -> Result<(), ColdflowError> {
    set_terminal(db, id, RequestStatus::Failed, error).await
}

/// Mark a claimed request abandoned (terminal: retry budget spent).
pub async fn mark_abandoned(
    db: &Database,
    id: &RequestId,
    error: &str,
) -> Result<(), ColdflowError> {
    set_terminal(db, id, RequestStatus::Abandoned, error).await
}

async fn set_terminal(
    db: &Database,
    id: &RequestId,
    status: RequestStatus,
    error: &str,
) -> Result<(), ColdflowError> {
    let id_s = id.0.clone();
    let status_s = status.to_string();
    let error_s = error.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE send_requests SET status = ?2, last_error = ?3 \
                 WHERE id = ?1 AND status = 'claimed'",
                rusqlite::params![id_s, status_s, error_s],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    info!(request_id = %id, status = %status, error, "request terminal");
    Ok(())
}

/// Fetch one request by id.
pub async fn get_request(
    db: &Database,
    id: &RequestId,
) -> Result<Option<SendRequest>, ColdflowError> {
    let id = id.0.clone();
    let sql = format!("SELECT {COLUMNS} FROM send_requests WHERE id = ?1");
    db.connection()
        .call(move |conn| {
            conn.query_row(&sql, rusqlite::params![id], row_to_request)
                .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Queue depth by status.
pub async fn depth_by_status(db: &Database) -> Result<Vec<(RequestStatus, u32)>, ColdflowError> {
    use std::str::FromStr;
    let rows = db
        .connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM send_requests GROUP BY status ORDER BY status",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)?;

    Ok(rows
        .into_iter()
        .filter_map(|(s, n)| RequestStatus::from_str(&s).ok().map(|st| (st, n)))
        .collect())
}
