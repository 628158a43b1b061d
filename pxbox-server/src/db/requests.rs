//! Request queries and conditional status transitions

use sqlx::SqlitePool;

use shared::error::{AppError, AppResult};
use shared::model::{Request, RequestStatus, SchemaKind};
use shared::util::{from_millis, now_millis};

use super::{from_json_text, to_json_text};

const COLUMNS: &str = "id, created_by, entity_id, status, schema_kind, schema_payload, \
     ui_hints, prefill, expires_at, deadline_at, attention_at, autocancel_grace, \
     callback_url, callback_secret, files_policy, flow_id, read_at, deleted_at, \
     created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct RequestRow {
    id: String,
    created_by: String,
    entity_id: String,
    status: String,
    schema_kind: String,
    schema_payload: String,
    ui_hints: String,
    prefill: String,
    expires_at: Option<i64>,
    deadline_at: Option<i64>,
    attention_at: Option<i64>,
    autocancel_grace: Option<i64>,
    callback_url: Option<String>,
    #[allow(dead_code)]
    callback_secret: Option<String>,
    files_policy: Option<String>,
    flow_id: Option<String>,
    read_at: Option<i64>,
    deleted_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl RequestRow {
    fn into_model(self) -> AppResult<Request> {
        let status: RequestStatus = self
            .status
            .parse()
            .map_err(|e: String| AppError::storage(e))?;
        let schema_kind: SchemaKind = self
            .schema_kind
            .parse()
            .map_err(|e: String| AppError::storage(e))?;
        Ok(Request {
            id: self.id,
            created_by: self.created_by,
            entity_id: self.entity_id,
            status,
            schema_kind,
            schema_payload: serde_json::from_str(&self.schema_payload)
                .unwrap_or(serde_json::Value::Null),
            ui_hints: from_json_text(&self.ui_hints),
            prefill: from_json_text(&self.prefill),
            expires_at: self.expires_at.map(from_millis),
            deadline_at: self.deadline_at.map(from_millis),
            attention_at: self.attention_at.map(from_millis),
            autocancel_grace_secs: self.autocancel_grace,
            callback_url: self.callback_url,
            files_policy: self.files_policy.map(|t| from_json_text(&t)),
            flow_id: self.flow_id,
            read_at: self.read_at.map(from_millis),
            deleted_at: self.deleted_at.map(from_millis),
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        })
    }
}

/// Insert parameters for a new request row
pub struct NewRequest<'a> {
    pub id: &'a str,
    pub created_by: &'a str,
    pub entity_id: &'a str,
    pub schema_kind: SchemaKind,
    pub schema_payload: &'a serde_json::Value,
    pub ui_hints: &'a serde_json::Map<String, serde_json::Value>,
    pub prefill: &'a serde_json::Map<String, serde_json::Value>,
    pub expires_at: Option<i64>,
    pub deadline_at: Option<i64>,
    pub attention_at: Option<i64>,
    pub autocancel_grace: Option<i64>,
    pub callback_url: Option<&'a str>,
    pub callback_secret: Option<&'a str>,
    pub files_policy: Option<&'a serde_json::Value>,
    pub flow_id: Option<&'a str>,
}

pub async fn create(pool: &SqlitePool, new: NewRequest<'_>) -> AppResult<Request> {
    let now = now_millis();
    sqlx::query(
        "INSERT INTO requests (id, created_by, entity_id, status, schema_kind, schema_payload, \
         ui_hints, prefill, expires_at, deadline_at, attention_at, autocancel_grace, \
         callback_url, callback_secret, files_policy, flow_id, created_at, updated_at) \
         VALUES (?, ?, ?, 'PENDING', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new.id)
    .bind(new.created_by)
    .bind(new.entity_id)
    .bind(new.schema_kind.as_str())
    .bind(to_json_text(new.schema_payload))
    .bind(to_json_text(new.ui_hints))
    .bind(to_json_text(new.prefill))
    .bind(new.expires_at)
    .bind(new.deadline_at)
    .bind(new.attention_at)
    .bind(new.autocancel_grace)
    .bind(new.callback_url)
    .bind(new.callback_secret)
    .bind(new.files_policy.map(to_json_text))
    .bind(new.flow_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| AppError::storage(e.to_string()))?;

    get_by_id(pool, new.id).await
}

pub async fn get_by_id(pool: &SqlitePool, id: &str) -> AppResult<Request> {
    let sql = format!("SELECT {COLUMNS} FROM requests WHERE id = ?");
    let row: Option<RequestRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::storage(e.to_string()))?;

    row.ok_or_else(|| AppError::request_not_found(id))?.into_model()
}

/// Atomic claim: `PENDING → CLAIMED`. Returns false when the row was not
/// PENDING (claim conflict); at most one of N concurrent callers gets true.
pub async fn claim(pool: &SqlitePool, id: &str) -> AppResult<bool> {
    let result = sqlx::query(
        "UPDATE requests SET status = 'CLAIMED', updated_at = ? \
         WHERE id = ? AND status = 'PENDING'",
    )
    .bind(now_millis())
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| AppError::storage(e.to_string()))?;

    Ok(result.rows_affected() > 0)
}

/// Conditional status transition. Returns false when the current status is
/// not in `allowed_from` (zero rows affected); never touches other rows.
pub async fn transition(
    pool: &SqlitePool,
    id: &str,
    to: RequestStatus,
    allowed_from: &[RequestStatus],
) -> AppResult<bool> {
    let placeholders = vec!["?"; allowed_from.len()].join(", ");
    let sql = format!(
        "UPDATE requests SET status = ?, updated_at = ? WHERE id = ? AND status IN ({placeholders})"
    );
    let mut query = sqlx::query(&sql).bind(to.as_str()).bind(now_millis()).bind(id);
    for from in allowed_from {
        query = query.bind(from.as_str());
    }
    let result = query
        .execute(pool)
        .await
        .map_err(|e| AppError::storage(e.to_string()))?;
    Ok(result.rows_affected() > 0)
}

/// Inbox listing for one entity, newest first, soft-deleted rows hidden
pub async fn entity_queue(
    pool: &SqlitePool,
    entity_id: &str,
    status: Option<RequestStatus>,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<Request>> {
    let rows: Vec<RequestRow> = match status {
        Some(status) => {
            let sql = format!(
                "SELECT {COLUMNS} FROM requests \
                 WHERE entity_id = ? AND status = ? AND deleted_at IS NULL \
                 ORDER BY created_at DESC LIMIT ? OFFSET ?"
            );
            sqlx::query_as(&sql)
                .bind(entity_id)
                .bind(status.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await
        }
        None => {
            let sql = format!(
                "SELECT {COLUMNS} FROM requests \
                 WHERE entity_id = ? AND deleted_at IS NULL \
                 ORDER BY created_at DESC LIMIT ? OFFSET ?"
            );
            sqlx::query_as(&sql)
                .bind(entity_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await
        }
    }
    .map_err(|e| AppError::storage(e.to_string()))?;

    rows.into_iter().map(RequestRow::into_model).collect()
}

/// Inquiry sort options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    /// Newest first
    Created,
    /// Earliest deadline first, rows without a deadline last
    Deadline,
}

impl SortBy {
    pub fn parse(s: &str) -> Self {
        match s {
            "deadline" => SortBy::Deadline,
            _ => SortBy::Created,
        }
    }
}

/// Cross-entity inquiry listing with filters and paging
pub async fn list_inquiries(
    pool: &SqlitePool,
    entity_id: Option<&str>,
    status: Option<RequestStatus>,
    sort_by: SortBy,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<Request>> {
    let mut conditions = vec!["deleted_at IS NULL".to_string()];
    if entity_id.is_some() {
        conditions.push("entity_id = ?".to_string());
    }
    if status.is_some() {
        conditions.push("status = ?".to_string());
    }
    let order = match sort_by {
        SortBy::Created => "created_at DESC",
        SortBy::Deadline => "deadline_at IS NULL, deadline_at ASC",
    };
    let sql = format!(
        "SELECT {COLUMNS} FROM requests WHERE {} ORDER BY {order} LIMIT ? OFFSET ?",
        conditions.join(" AND ")
    );

    let mut query = sqlx::query_as::<_, RequestRow>(&sql);
    if let Some(entity_id) = entity_id {
        query = query.bind(entity_id);
    }
    if let Some(status) = status {
        query = query.bind(status.as_str());
    }
    let rows = query
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::storage(e.to_string()))?;

    rows.into_iter().map(RequestRow::into_model).collect()
}

pub async fn mark_read(pool: &SqlitePool, id: &str) -> AppResult<bool> {
    let now = now_millis();
    let result = sqlx::query("UPDATE requests SET read_at = ?, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| AppError::storage(e.to_string()))?;
    Ok(result.rows_affected() > 0)
}

/// Soft delete: the row stays for audit and flow reference integrity
pub async fn soft_delete(pool: &SqlitePool, id: &str) -> AppResult<bool> {
    let now = now_millis();
    let result = sqlx::query("UPDATE requests SET deleted_at = ?, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| AppError::storage(e.to_string()))?;
    Ok(result.rows_affected() > 0)
}

/// All requests owned by a flow, including soft-deleted ones (the
/// cancellation cascade still applies to them)
pub async fn list_by_flow(pool: &SqlitePool, flow_id: &str) -> AppResult<Vec<Request>> {
    let sql = format!("SELECT {COLUMNS} FROM requests WHERE flow_id = ? ORDER BY created_at ASC");
    let rows: Vec<RequestRow> = sqlx::query_as(&sql)
        .bind(flow_id)
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::storage(e.to_string()))?;
    rows.into_iter().map(RequestRow::into_model).collect()
}

/// PENDING requests that still carry a timed milestone; used by the
/// scheduler to re-arm tasks after a restart
pub async fn list_pending_with_timers(pool: &SqlitePool) -> AppResult<Vec<Request>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM requests \
         WHERE status = 'PENDING' \
           AND (deadline_at IS NOT NULL OR attention_at IS NOT NULL) \
         ORDER BY created_at ASC"
    );
    let rows: Vec<RequestRow> = sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::storage(e.to_string()))?;
    rows.into_iter().map(RequestRow::into_model).collect()
}
