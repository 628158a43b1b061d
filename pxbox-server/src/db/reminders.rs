//! Reminder queries

use sqlx::SqlitePool;

use shared::error::{AppError, AppResult, ErrorCode};
use shared::util::now_millis;

/// A scheduled nudge for a snoozed inquiry
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Reminder {
    pub id: String,
    pub request_id: String,
    pub entity_id: String,
    pub remind_at: i64,
    pub created_at: i64,
}

pub async fn create(
    pool: &SqlitePool,
    id: &str,
    request_id: &str,
    entity_id: &str,
    remind_at: i64,
) -> AppResult<Reminder> {
    let now = now_millis();
    sqlx::query(
        "INSERT INTO reminders (id, request_id, entity_id, remind_at, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(request_id)
    .bind(entity_id)
    .bind(remind_at)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| AppError::storage(e.to_string()))?;

    Ok(Reminder {
        id: id.to_string(),
        request_id: request_id.to_string(),
        entity_id: entity_id.to_string(),
        remind_at,
        created_at: now,
    })
}

pub async fn get_by_id(pool: &SqlitePool, id: &str) -> AppResult<Reminder> {
    let row: Option<Reminder> = sqlx::query_as(
        "SELECT id, request_id, entity_id, remind_at, created_at FROM reminders WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| AppError::storage(e.to_string()))?;

    row.ok_or_else(|| AppError::new(ErrorCode::ReminderNotFound).with_detail("reminderId", id))
}

pub async fn delete(pool: &SqlitePool, id: &str) -> AppResult<()> {
    sqlx::query("DELETE FROM reminders WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| AppError::storage(e.to_string()))?;
    Ok(())
}

/// Drop reminders whose request has left PENDING/CLAIMED
pub async fn delete_by_request(pool: &SqlitePool, request_id: &str) -> AppResult<()> {
    sqlx::query("DELETE FROM reminders WHERE request_id = ?")
        .bind(request_id)
        .execute(pool)
        .await
        .map_err(|e| AppError::storage(e.to_string()))?;
    Ok(())
}

/// All outstanding reminders (scheduler re-arm on startup)
pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<Reminder>> {
    sqlx::query_as(
        "SELECT id, request_id, entity_id, remind_at, created_at \
         FROM reminders ORDER BY remind_at ASC",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| AppError::storage(e.to_string()))
}
