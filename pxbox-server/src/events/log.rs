//! Durable event log
//!
//! For every channel, an append-only persistent ordered stream. Sequence
//! numbers are strictly increasing without gaps; replay returns entries
//! with `seq > since_seq` in order.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;

use shared::error::{AppError, AppResult, ErrorCode};
use shared::util::now_millis;

/// One persisted event
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub channel: String,
    pub seq: i64,
    pub timestamp: i64,
    pub payload: Value,
}

/// Durable per-channel ordered streams with per-subscriber ack positions
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append a payload; returns the assigned sequence number
    async fn append(&self, channel: &str, payload: &Value) -> AppResult<i64>;

    /// Entries with `seq > since_seq`, oldest first, at most `limit`
    async fn replay(&self, channel: &str, since_seq: i64, limit: i64)
        -> AppResult<Vec<EventRecord>>;

    /// Record the highest sequence a subscriber has processed
    async fn ack(&self, channel: &str, subscriber: &str, seq: i64) -> AppResult<()>;

    /// Highest acknowledged sequence, 0 when none
    async fn last_ack(&self, channel: &str, subscriber: &str) -> AppResult<i64>;
}

/// SQLite-backed event log
#[derive(Clone)]
pub struct SqliteEventLog {
    pool: SqlitePool,
}

impl SqliteEventLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    channel: String,
    seq: i64,
    timestamp: i64,
    payload: String,
}

#[async_trait]
impl EventLog for SqliteEventLog {
    async fn append(&self, channel: &str, payload: &Value) -> AppResult<i64> {
        // Next seq computed inside the INSERT: atomic per statement, so the
        // per-channel counter never skips or repeats
        let seq: i64 = sqlx::query_scalar(
            "INSERT INTO events (channel, seq, timestamp, payload) \
             SELECT ?1, COALESCE(MAX(seq), 0) + 1, ?2, ?3 FROM events WHERE channel = ?1 \
             RETURNING seq",
        )
        .bind(channel)
        .bind(now_millis())
        .bind(payload.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_message(ErrorCode::EventLogError, e.to_string()))?;
        Ok(seq)
    }

    async fn replay(
        &self,
        channel: &str,
        since_seq: i64,
        limit: i64,
    ) -> AppResult<Vec<EventRecord>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT channel, seq, timestamp, payload FROM events \
             WHERE channel = ? AND seq > ? ORDER BY seq ASC LIMIT ?",
        )
        .bind(channel)
        .bind(since_seq)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_message(ErrorCode::EventLogError, e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| EventRecord {
                channel: r.channel,
                seq: r.seq,
                timestamp: r.timestamp,
                payload: serde_json::from_str(&r.payload).unwrap_or(Value::Null),
            })
            .collect())
    }

    async fn ack(&self, channel: &str, subscriber: &str, seq: i64) -> AppResult<()> {
        // Acks only move forward
        sqlx::query(
            "INSERT INTO event_acks (channel, subscriber, last_seq, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(channel, subscriber) \
             DO UPDATE SET last_seq = MAX(last_seq, excluded.last_seq), \
                           updated_at = excluded.updated_at",
        )
        .bind(channel)
        .bind(subscriber)
        .bind(seq)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_message(ErrorCode::EventLogError, e.to_string()))?;
        Ok(())
    }

    async fn last_ack(&self, channel: &str, subscriber: &str) -> AppResult<i64> {
        let seq: Option<i64> = sqlx::query_scalar(
            "SELECT last_seq FROM event_acks WHERE channel = ? AND subscriber = ?",
        )
        .bind(channel)
        .bind(subscriber)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_message(ErrorCode::EventLogError, e.to_string()))?;
        Ok(seq.unwrap_or(0))
    }
}
