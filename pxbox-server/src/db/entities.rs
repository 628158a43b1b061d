//! Entity queries

use sqlx::SqlitePool;

use shared::error::{AppError, AppResult, ErrorCode};
use shared::model::{Entity, EntityKind};
use shared::util::{from_millis, now_millis};

use super::{from_json_text, to_json_text};

#[derive(Debug, sqlx::FromRow)]
struct EntityRow {
    id: String,
    kind: String,
    handle: Option<String>,
    meta: String,
    created_at: i64,
}

impl EntityRow {
    fn into_model(self) -> AppResult<Entity> {
        let kind: EntityKind = self
            .kind
            .parse()
            .map_err(|e: String| AppError::storage(e))?;
        Ok(Entity {
            id: self.id,
            kind,
            handle: self.handle,
            meta: from_json_text(&self.meta),
            created_at: from_millis(self.created_at),
        })
    }
}

pub async fn create(
    pool: &SqlitePool,
    id: &str,
    kind: EntityKind,
    handle: Option<&str>,
    meta: &serde_json::Map<String, serde_json::Value>,
) -> AppResult<Entity> {
    let now = now_millis();
    let result = sqlx::query(
        "INSERT INTO entities (id, kind, handle, meta, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(kind.to_string())
    .bind(handle)
    .bind(to_json_text(meta))
    .bind(now)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(Entity {
            id: id.to_string(),
            kind,
            handle: handle.map(str::to_string),
            meta: meta.clone(),
            created_at: from_millis(now),
        }),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::new(
            ErrorCode::HandleExists,
        )
        .with_detail("handle", handle.unwrap_or_default())),
        Err(e) => Err(AppError::storage(e.to_string())),
    }
}

pub async fn get_by_id(pool: &SqlitePool, id: &str) -> AppResult<Entity> {
    let row: Option<EntityRow> = sqlx::query_as(
        "SELECT id, kind, handle, meta, created_at FROM entities WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| AppError::storage(e.to_string()))?;

    row.ok_or_else(|| AppError::entity_not_found(id))?.into_model()
}

pub async fn get_by_handle(pool: &SqlitePool, handle: &str) -> AppResult<Entity> {
    let row: Option<EntityRow> = sqlx::query_as(
        "SELECT id, kind, handle, meta, created_at FROM entities WHERE handle = ?",
    )
    .bind(handle)
    .fetch_optional(pool)
    .await
    .map_err(|e| AppError::storage(e.to_string()))?;

    row.ok_or_else(|| AppError::entity_not_found(handle))?
        .into_model()
}

/// Whether an entity row exists (responder attribution check)
pub async fn exists(pool: &SqlitePool, id: &str) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::storage(e.to_string()))?;
    Ok(count > 0)
}
