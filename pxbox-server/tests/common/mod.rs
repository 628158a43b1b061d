//! Test harness: a fresh broker over a tempfile-backed SQLite database.
#![allow(dead_code)] // not every suite uses every helper
//!
//! The database file outlives individual `AppState`s, which is what the
//! crash-recovery tests rely on: drop the state (losing all in-memory
//! fan-out and timers), build a second one over the same file, recover.

use serde_json::json;
use tempfile::TempDir;

use pxbox_server::{AppState, Config};
use shared::model::{Entity, EntityKind};

pub struct TestBroker {
    pub state: AppState,
    /// Keeps the database file alive for the test's duration
    pub dir: TempDir,
}

impl TestBroker {
    pub async fn new() -> Self {
        Self::with_allowlist(&[]).await
    }

    /// Broker with a non-empty `$ref` allowlist
    pub async fn with_allowlist(patterns: &[&str]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state_for(&dir, patterns).await;
        Self { state, dir }
    }

    /// Build a second broker over the same database file (simulated
    /// restart: all in-memory state is gone, rows persist)
    pub async fn restart(&self) -> AppState {
        state_for(&self.dir, &[]).await
    }

    pub async fn make_entity(&self, handle: &str) -> Entity {
        self.state
            .entity_svc
            .create(
                EntityKind::User,
                Some(handle.to_string()),
                serde_json::Map::new(),
            )
            .await
            .expect("create entity")
    }

    /// Event kinds recorded on a channel, in sequence order
    pub async fn event_kinds(&self, channel: &str) -> Vec<String> {
        self.state
            .bus
            .log()
            .replay(channel, 0, 1000)
            .await
            .expect("replay")
            .into_iter()
            .map(|r| {
                r.payload
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }
}

async fn state_for(dir: &TempDir, allowlist: &[&str]) -> AppState {
    let db_path = dir.path().join("pxbox.db");
    let config = Config {
        database_url: format!("sqlite://{}", db_path.display()),
        event_log_url: format!("sqlite://{}", db_path.display()),
        addr: "127.0.0.1:0".into(),
        jwt_secret: "test-secret".into(),
        schema_ref_allowlist: allowlist.iter().map(|s| s.to_string()).collect(),
        storage_base_dir: dir.path().join("storage").display().to_string(),
        storage_base_url: "http://localhost:8080".into(),
        deadline_warning_secs: 3600,
        schema_cache_capacity: 64,
        schema_cache_ttl_secs: 3600,
        hub_queue_depth: 256,
        environment: "development".into(),
    };
    AppState::new(config).await.expect("broker init")
}

/// The S1 schema: an object requiring a string `name`
pub fn name_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {"name": {"type": "string"}},
        "required": ["name"]
    })
}
