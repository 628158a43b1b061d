//! In-process fan-out hub
//!
//! ```text
//! EventBus.publish
//!       │ {seq, payload}
//!       ▼
//! Hub
//!   ├── channels: channel → (session-id → Subscriber)
//!   │       │
//!   │       ▼ try_send (bounded mpsc)
//!   └── Session write pumps
//! ```
//!
//! Back-pressure policy: a slow subscriber never blocks the publisher.
//! When a subscriber's queue is full it is evicted from every channel and
//! its session is cancelled; the client reconnects and resumes from its
//! last acknowledged sequence.

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One event as delivered to a session
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub channel: String,
    pub seq: i64,
    pub payload: Value,
}

struct Subscriber {
    tx: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
}

/// Per-channel subscriber registry
pub struct Hub {
    /// channel → (session id → subscriber)
    channels: DashMap<String, DashMap<Uuid, Subscriber>>,
    /// Per-subscriber queue depth (used by sessions creating their queues)
    queue_depth: usize,
}

impl Hub {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            channels: DashMap::new(),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Bounded queue depth sessions should allocate for their outbound side
    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Add a session to a channel (channels are created lazily)
    pub fn subscribe(
        &self,
        channel: &str,
        session_id: Uuid,
        tx: mpsc::Sender<SessionEvent>,
        cancel: CancellationToken,
    ) {
        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(session_id, Subscriber { tx, cancel });
    }

    /// Remove a session from one channel
    pub fn unsubscribe(&self, channel: &str, session_id: Uuid) {
        if let Some(subs) = self.channels.get(channel) {
            subs.remove(&session_id);
            if subs.is_empty() {
                drop(subs);
                self.channels
                    .remove_if(channel, |_, subs| subs.is_empty());
            }
        }
    }

    /// Remove a session from every channel (disconnect cleanup)
    pub fn drop_session(&self, session_id: Uuid) {
        let mut emptied = Vec::new();
        for entry in self.channels.iter() {
            entry.value().remove(&session_id);
            if entry.value().is_empty() {
                emptied.push(entry.key().clone());
            }
        }
        for channel in emptied {
            self.channels.remove_if(&channel, |_, subs| subs.is_empty());
        }
    }

    /// Fan out one event to every subscriber of the channel.
    ///
    /// Full queues evict: the subscriber is dropped from all channels and
    /// its session token cancelled. Publishers never block here.
    pub fn fan_out(&self, channel: &str, seq: i64, payload: &Value) {
        let Some(subs) = self.channels.get(channel) else {
            return;
        };

        let mut evicted = Vec::new();
        for entry in subs.iter() {
            let event = SessionEvent {
                channel: channel.to_string(),
                seq,
                payload: payload.clone(),
            };
            match entry.value().tx.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        channel,
                        session_id = %entry.key(),
                        "Subscriber queue full, evicting session"
                    );
                    entry.value().cancel.cancel();
                    evicted.push(*entry.key());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    evicted.push(*entry.key());
                }
            }
        }
        drop(subs);

        for session_id in evicted {
            self.drop_session(session_id);
        }
    }

    /// Number of sessions subscribed to a channel
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subscriber(
        hub: &Hub,
        channel: &str,
        depth: usize,
    ) -> (Uuid, mpsc::Receiver<SessionEvent>, CancellationToken) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(depth);
        let cancel = CancellationToken::new();
        hub.subscribe(channel, id, tx, cancel.clone());
        (id, rx, cancel)
    }

    #[tokio::test]
    async fn fan_out_reaches_all_subscribers() {
        let hub = Hub::new(8);
        let (_a, mut rx_a, _) = subscriber(&hub, "entity:e1", 8);
        let (_b, mut rx_b, _) = subscriber(&hub, "entity:e1", 8);

        hub.fan_out("entity:e1", 1, &json!({"type": "request.created"}));

        assert_eq!(rx_a.recv().await.unwrap().seq, 1);
        assert_eq!(rx_b.recv().await.unwrap().seq, 1);
    }

    #[tokio::test]
    async fn fan_out_ignores_other_channels() {
        let hub = Hub::new(8);
        let (_a, mut rx, _) = subscriber(&hub, "entity:e1", 8);

        hub.fan_out("entity:e2", 1, &json!({}));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn events_arrive_in_fan_out_order() {
        let hub = Hub::new(16);
        let (_a, mut rx, _) = subscriber(&hub, "entity:e1", 16);

        for seq in 1..=5 {
            hub.fan_out("entity:e1", seq, &json!({"n": seq}));
        }
        for expected in 1..=5 {
            assert_eq!(rx.recv().await.unwrap().seq, expected);
        }
    }

    #[tokio::test]
    async fn full_queue_evicts_subscriber() {
        let hub = Hub::new(1);
        let (id, _rx, cancel) = subscriber(&hub, "entity:e1", 1);

        hub.fan_out("entity:e1", 1, &json!({}));
        // queue (depth 1) is now full; the next publish evicts
        hub.fan_out("entity:e1", 2, &json!({}));

        assert!(cancel.is_cancelled());
        assert_eq!(hub.subscriber_count("entity:e1"), 0);
        // publishing to an empty channel is a no-op, not an error
        hub.fan_out("entity:e1", 3, &json!({}));
        drop(id);
    }

    #[tokio::test]
    async fn unsubscribe_and_drop_session() {
        let hub = Hub::new(8);
        let (id, _rx, _) = subscriber(&hub, "entity:e1", 8);
        hub.subscribe(
            "request:r1",
            id,
            mpsc::channel(8).0,
            CancellationToken::new(),
        );

        hub.unsubscribe("entity:e1", id);
        assert_eq!(hub.subscriber_count("entity:e1"), 0);
        assert_eq!(hub.subscriber_count("request:r1"), 1);

        hub.drop_session(id);
        assert_eq!(hub.subscriber_count("request:r1"), 0);
    }
}
