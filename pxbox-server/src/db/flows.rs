//! Flow queries
//!
//! The cursor column is the flow's durable checkpoint; it is written after
//! every observable transition so a restart resumes from the last committed
//! state.

use sqlx::SqlitePool;

use shared::error::{AppError, AppResult};
use shared::model::{Flow, FlowStatus};
use shared::util::{from_millis, now_millis};

use super::{from_json_text, to_json_text};

#[derive(Debug, sqlx::FromRow)]
struct FlowRow {
    id: String,
    kind: String,
    owner_entity: String,
    status: String,
    cursor: String,
    last_event_id: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl FlowRow {
    fn into_model(self) -> AppResult<Flow> {
        let status: FlowStatus = self
            .status
            .parse()
            .map_err(|e: String| AppError::storage(e))?;
        Ok(Flow {
            id: self.id,
            kind: self.kind,
            owner_entity: self.owner_entity,
            status,
            cursor: from_json_text(&self.cursor),
            last_event_id: self.last_event_id,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        })
    }
}

pub async fn create(
    pool: &SqlitePool,
    id: &str,
    kind: &str,
    owner_entity: &str,
    cursor: &serde_json::Map<String, serde_json::Value>,
) -> AppResult<Flow> {
    let now = now_millis();
    sqlx::query(
        "INSERT INTO flows (id, kind, owner_entity, status, cursor, created_at, updated_at) \
         VALUES (?, ?, ?, 'RUNNING', ?, ?, ?)",
    )
    .bind(id)
    .bind(kind)
    .bind(owner_entity)
    .bind(to_json_text(cursor))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| AppError::storage(e.to_string()))?;

    get_by_id(pool, id).await
}

pub async fn get_by_id(pool: &SqlitePool, id: &str) -> AppResult<Flow> {
    let row: Option<FlowRow> = sqlx::query_as(
        "SELECT id, kind, owner_entity, status, cursor, last_event_id, created_at, updated_at \
         FROM flows WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| AppError::storage(e.to_string()))?;

    row.ok_or_else(|| AppError::flow_not_found(id))?.into_model()
}

pub async fn update_cursor(
    pool: &SqlitePool,
    id: &str,
    cursor: &serde_json::Map<String, serde_json::Value>,
) -> AppResult<()> {
    sqlx::query("UPDATE flows SET cursor = ?, updated_at = ? WHERE id = ?")
        .bind(to_json_text(cursor))
        .bind(now_millis())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| AppError::storage(e.to_string()))?;
    Ok(())
}

pub async fn update_status(pool: &SqlitePool, id: &str, status: FlowStatus) -> AppResult<()> {
    sqlx::query("UPDATE flows SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(now_millis())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| AppError::storage(e.to_string()))?;
    Ok(())
}

/// Guarded terminal transition: only fires when the flow is still
/// non-terminal. Terminal states are sinks.
pub async fn transition_if_active(
    pool: &SqlitePool,
    id: &str,
    status: FlowStatus,
) -> AppResult<bool> {
    let result = sqlx::query(
        "UPDATE flows SET status = ?, updated_at = ? \
         WHERE id = ? AND status IN ('RUNNING', 'SUSPENDED', 'WAITING_INPUT')",
    )
    .bind(status.as_str())
    .bind(now_millis())
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| AppError::storage(e.to_string()))?;
    Ok(result.rows_affected() > 0)
}

/// Bulk lookup by status, oldest first (recovery order)
pub async fn list_by_status(pool: &SqlitePool, statuses: &[FlowStatus]) -> AppResult<Vec<Flow>> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; statuses.len()].join(", ");
    let sql = format!(
        "SELECT id, kind, owner_entity, status, cursor, last_event_id, created_at, updated_at \
         FROM flows WHERE status IN ({placeholders}) ORDER BY created_at ASC"
    );
    let mut query = sqlx::query_as::<_, FlowRow>(&sql);
    for status in statuses {
        query = query.bind(status.as_str());
    }
    let rows = query
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::storage(e.to_string()))?;
    rows.into_iter().map(FlowRow::into_model).collect()
}
