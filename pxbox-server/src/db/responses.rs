//! Response queries

use sqlx::SqlitePool;

use shared::error::{AppError, AppResult, ErrorCode};
use shared::model::Response;
use shared::policy::FileDescriptor;
use shared::util::{from_millis, now_millis};

use super::{from_json_text, to_json_text};

#[derive(Debug, sqlx::FromRow)]
struct ResponseRow {
    id: String,
    request_id: String,
    answered_by: String,
    payload: String,
    files: String,
    answered_at: i64,
    signature_jws: Option<String>,
}

impl ResponseRow {
    fn into_model(self) -> Response {
        Response {
            id: self.id,
            request_id: self.request_id,
            answered_by: self.answered_by,
            payload: from_json_text(&self.payload),
            files: from_json_text(&self.files),
            answered_at: from_millis(self.answered_at),
            signature_jws: self.signature_jws,
        }
    }
}

/// Atomically answer a request: transition `PENDING|CLAIMED → ANSWERED`
/// and insert the response row in one transaction.
///
/// Returns `None` when the request was already terminal (zero rows on the
/// conditional UPDATE) — nothing is written in that case.
pub async fn answer(
    pool: &SqlitePool,
    response_id: &str,
    request_id: &str,
    answered_by: &str,
    payload: &serde_json::Map<String, serde_json::Value>,
    files: &[FileDescriptor],
) -> AppResult<Option<Response>> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::storage(e.to_string()))?;

    let now = now_millis();
    let updated = sqlx::query(
        "UPDATE requests SET status = 'ANSWERED', updated_at = ? \
         WHERE id = ? AND status IN ('PENDING', 'CLAIMED')",
    )
    .bind(now)
    .bind(request_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::storage(e.to_string()))?;

    if updated.rows_affected() == 0 {
        tx.rollback()
            .await
            .map_err(|e| AppError::storage(e.to_string()))?;
        return Ok(None);
    }

    sqlx::query(
        "INSERT INTO responses (id, request_id, answered_by, payload, files, answered_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(response_id)
    .bind(request_id)
    .bind(answered_by)
    .bind(to_json_text(payload))
    .bind(to_json_text(&files.to_vec()))
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::storage(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| AppError::storage(e.to_string()))?;

    Ok(Some(Response {
        id: response_id.to_string(),
        request_id: request_id.to_string(),
        answered_by: answered_by.to_string(),
        payload: payload.clone(),
        files: files.to_vec(),
        answered_at: from_millis(now),
        signature_jws: None,
    }))
}

pub async fn get_by_request_id(pool: &SqlitePool, request_id: &str) -> AppResult<Response> {
    let row: Option<ResponseRow> = sqlx::query_as(
        "SELECT id, request_id, answered_by, payload, files, answered_at, signature_jws \
         FROM responses WHERE request_id = ?",
    )
    .bind(request_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| AppError::storage(e.to_string()))?;

    row.map(ResponseRow::into_model)
        .ok_or_else(|| AppError::new(ErrorCode::ResponseNotFound).with_detail("requestId", request_id))
}
