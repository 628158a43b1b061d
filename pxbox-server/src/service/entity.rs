//! Entity service

use sqlx::SqlitePool;

use shared::error::{AppError, AppResult, ErrorCode};
use shared::model::{Entity, EntityKind, EntityRef};

use crate::db;

use super::new_id;

/// Entity CRUD and reference resolution
#[derive(Clone)]
pub struct EntityService {
    pool: SqlitePool,
}

impl EntityService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        kind: EntityKind,
        handle: Option<String>,
        meta: serde_json::Map<String, serde_json::Value>,
    ) -> AppResult<Entity> {
        let id = new_id();
        db::entities::create(&self.pool, &id, kind, handle.as_deref(), &meta).await
    }

    pub async fn get(&self, id: &str) -> AppResult<Entity> {
        db::entities::get_by_id(&self.pool, id).await
    }

    /// Resolve a reference: exactly one of `id` or `handle` must be set
    pub async fn resolve(&self, entity_ref: &EntityRef) -> AppResult<Entity> {
        match (entity_ref.id.as_deref(), entity_ref.handle.as_deref()) {
            (Some(id), None) => db::entities::get_by_id(&self.pool, id).await,
            (None, Some(handle)) => db::entities::get_by_handle(&self.pool, handle).await,
            _ => Err(AppError::new(ErrorCode::EntityAmbiguous)),
        }
    }
}
