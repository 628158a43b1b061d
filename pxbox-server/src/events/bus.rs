//! Event bus: durable sequencing + in-process fan-out
//!
//! Publishing assigns the next per-channel sequence, persists the entry,
//! then fans out to live subscribers. All three steps happen under one
//! append guard — that is what makes per-channel delivery order equal
//! sequence order when multiple tasks publish concurrently.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use shared::error::AppResult;

use super::hub::Hub;
use super::log::EventLog;
use super::{entity_channel, request_channel, requestor_channel};

/// Event publication facade used by all services
#[derive(Clone)]
pub struct EventBus {
    log: Arc<dyn EventLog>,
    hub: Arc<Hub>,
    append_guard: Arc<Mutex<()>>,
}

impl EventBus {
    pub fn new(log: Arc<dyn EventLog>, hub: Arc<Hub>) -> Self {
        Self {
            log,
            hub,
            append_guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    /// Publish an event onto a channel; returns the assigned sequence
    pub async fn publish(&self, channel: &str, payload: Value) -> AppResult<i64> {
        let _guard = self.append_guard.lock().await;
        let seq = self.log.append(channel, &payload).await?;
        self.hub.fan_out(channel, seq, &payload);
        Ok(seq)
    }

    /// Publish to `entity:<id>`, best-effort.
    ///
    /// State mutations commit before events are emitted; a publication
    /// failure is logged and swallowed — the durable log is the recovery
    /// path, not the mutation.
    pub async fn publish_entity(&self, entity_id: &str, payload: Value) {
        self.publish_best_effort(&entity_channel(entity_id), payload)
            .await;
    }

    /// Publish to `request:<id>`, best-effort
    pub async fn publish_request(&self, request_id: &str, payload: Value) {
        self.publish_best_effort(&request_channel(request_id), payload)
            .await;
    }

    /// Publish to `requestor:<subject>`, best-effort
    pub async fn publish_requestor(&self, client_id: &str, payload: Value) {
        self.publish_best_effort(&requestor_channel(client_id), payload)
            .await;
    }

    async fn publish_best_effort(&self, channel: &str, payload: Value) {
        if let Err(e) = self.publish(channel, payload).await {
            tracing::error!(channel, error = %e, "Failed to publish event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::log::{EventRecord, SqliteEventLog};
    use serde_json::json;

    async fn test_bus() -> EventBus {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::migrate(&pool).await.unwrap();
        EventBus::new(Arc::new(SqliteEventLog::new(pool)), Arc::new(Hub::new(16)))
    }

    #[tokio::test]
    async fn sequences_are_monotonic_without_gaps() {
        let bus = test_bus().await;
        for expected in 1..=10 {
            let seq = bus
                .publish("entity:e1", json!({"n": expected}))
                .await
                .unwrap();
            assert_eq!(seq, expected);
        }
    }

    #[tokio::test]
    async fn sequences_are_per_channel() {
        let bus = test_bus().await;
        assert_eq!(bus.publish("entity:e1", json!({})).await.unwrap(), 1);
        assert_eq!(bus.publish("entity:e2", json!({})).await.unwrap(), 1);
        assert_eq!(bus.publish("entity:e1", json!({})).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_publishers_never_collide() {
        let bus = test_bus().await;
        let mut handles = Vec::new();
        for _ in 0..4 {
            let bus = bus.clone();
            handles.push(tokio::spawn(async move {
                let mut seqs = Vec::new();
                for _ in 0..25 {
                    seqs.push(bus.publish("entity:e1", json!({})).await.unwrap());
                }
                seqs
            }));
        }
        let mut all: Vec<i64> = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all.sort_unstable();
        let expected: Vec<i64> = (1..=100).collect();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn replay_returns_entries_after_since() {
        let bus = test_bus().await;
        for n in 1..=5 {
            bus.publish("entity:e1", json!({"n": n})).await.unwrap();
        }
        let events: Vec<EventRecord> = bus.log().replay("entity:e1", 3, 100).await.unwrap();
        let seqs: Vec<i64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![4, 5]);
        assert_eq!(events[0].payload["n"], 4);
    }

    #[tokio::test]
    async fn ack_tracks_highest_per_subscriber() {
        let bus = test_bus().await;
        let log = bus.log();
        log.ack("entity:e1", "sub-a", 3).await.unwrap();
        log.ack("entity:e1", "sub-a", 7).await.unwrap();
        // stale acks never move the position backwards
        log.ack("entity:e1", "sub-a", 5).await.unwrap();
        assert_eq!(log.last_ack("entity:e1", "sub-a").await.unwrap(), 7);
        // isolated per subscriber
        assert_eq!(log.last_ack("entity:e1", "sub-b").await.unwrap(), 0);
    }
}
