//! WebSocket session loop
//!
//! ```text
//! ws_stream ──► envelope ──► subscribe/unsubscribe/resume/ack/cmd/ping
//!                                │
//! Hub ──► events (bounded mpsc) ─┤
//!                                ▼
//!                            ws_sink
//! ```
//!
//! Keep-alive: the server pings on an idle interval and drops sessions
//! with no inbound traffic within the liveness window. A full outbound
//! queue cancels the session token (hub eviction); the client reconnects
//! and resumes from its last acknowledged sequence.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use shared::envelope::{Envelope, MessageType};
use shared::error::ErrorCode;

use crate::auth::Identity;
use crate::events::SessionEvent;
use crate::state::AppState;

/// Replay batch limit per resume frame
const RESUME_BATCH_LIMIT: i64 = 100;
/// Server-initiated ping interval
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
/// Drop the session when nothing arrived for this long
const LIVENESS_WINDOW: Duration = Duration::from_secs(90);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Bearer token alternative for browser clients
    token: Option<String>,
}

/// GET /v1/ws — upgrade to a session
pub async fn handle_ws(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: http::HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // Identity is fixed at handshake
    let identity = match &query.token {
        Some(token) => state.auth.verify(token),
        None => state.auth.identify(&headers),
    };
    let identity = match identity {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };

    ws.on_upgrade(move |socket| run_session(socket, state, identity))
        .into_response()
}

async fn run_session(socket: WebSocket, state: AppState, identity: Identity) {
    let session_id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    let (event_tx, mut event_rx) =
        mpsc::channel::<SessionEvent>(state.bus.hub().queue_depth());

    tracing::info!(
        %session_id,
        subject = %identity.subject,
        "Session connected"
    );

    let (mut ws_sink, mut ws_stream) = socket.split();
    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_seen = tokio::time::Instant::now();

    loop {
        tokio::select! {
            // Inbound frame from the client
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = tokio::time::Instant::now();
                        if handle_frame(
                            &text,
                            &state,
                            &identity,
                            session_id,
                            &event_tx,
                            &cancel,
                            &mut ws_sink,
                        )
                        .await
                        .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_seen = tokio::time::Instant::now();
                        let _ = ws_sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_seen = tokio::time::Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(%session_id, "Session disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(%session_id, "Session error: {e}");
                        break;
                    }
                    _ => {} // Binary — ignore
                }
            }

            // Event fan-out from the hub (and replayed entries)
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let frame = Envelope::event(event.channel, event.seq, event.payload);
                if send_envelope(&mut ws_sink, &frame).await.is_err() {
                    break;
                }
            }

            // Evicted by the hub (queue overflow)
            _ = cancel.cancelled() => {
                tracing::warn!(%session_id, "Session evicted (queue overflow)");
                break;
            }

            // Keep-alive / liveness
            _ = keepalive.tick() => {
                if last_seen.elapsed() > LIVENESS_WINDOW {
                    tracing::info!(%session_id, "Session liveness window elapsed, dropping");
                    break;
                }
                if ws_sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = ws_sink.close().await;
    state.bus.hub().drop_session(session_id);
    tracing::info!(%session_id, "Session cleaned up");
}

/// Process one client frame; `Err` means the connection is beyond saving
async fn handle_frame<S>(
    text: &str,
    state: &AppState,
    identity: &Identity,
    session_id: Uuid,
    event_tx: &mpsc::Sender<SessionEvent>,
    cancel: &CancellationToken,
    ws_sink: &mut S,
) -> Result<(), ()>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(e) => {
            let frame = Envelope::error(
                None,
                ErrorCode::InvalidRequest,
                format!("malformed envelope: {e}"),
            );
            return send_envelope(ws_sink, &frame).await;
        }
    };

    match envelope.kind {
        MessageType::Subscribe => {
            let Some(channel) = envelope.channel else {
                return reply_invalid(ws_sink, envelope.id, "channel required").await;
            };
            state
                .bus
                .hub()
                .subscribe(&channel, session_id, event_tx.clone(), cancel.clone());
            send_envelope(ws_sink, &Envelope::ack("subscribed", Some(channel))).await
        }

        MessageType::Unsubscribe => {
            let Some(channel) = envelope.channel else {
                return reply_invalid(ws_sink, envelope.id, "channel required").await;
            };
            state.bus.hub().unsubscribe(&channel, session_id);
            send_envelope(ws_sink, &Envelope::ack("unsubscribed", Some(channel))).await
        }

        MessageType::Resume => {
            let (Some(channel), Some(since)) = (envelope.channel, envelope.since) else {
                return reply_invalid(ws_sink, envelope.id, "channel and since required").await;
            };
            resume(state, event_tx, &channel, since).await;
            Ok(())
        }

        MessageType::Ack => {
            let (Some(channel), Some(seq)) = (envelope.channel, envelope.seq) else {
                return reply_invalid(ws_sink, envelope.id, "channel and seq required").await;
            };
            if let Err(e) = state
                .bus
                .log()
                .ack(&channel, &identity.subject, seq)
                .await
            {
                tracing::warn!(channel, seq, error = %e, "Failed to record ack");
            }
            Ok(())
        }

        MessageType::Cmd => {
            let id = envelope.id.clone();
            let Some(op) = envelope.op else {
                return reply_invalid(ws_sink, id, "op required").await;
            };
            let data = envelope.data.unwrap_or(serde_json::Value::Null);
            let frame = match super::dispatch_command(state, identity, &op, data).await {
                Ok(result) => Envelope::response(id, result),
                Err(e) => Envelope::error(id, e.code, e.message),
            };
            send_envelope(ws_sink, &frame).await
        }

        MessageType::Ping => send_envelope(ws_sink, &Envelope::ack("pong", None)).await,

        // Server-to-client kinds are not valid inbound
        MessageType::Event | MessageType::Response | MessageType::Error => {
            reply_invalid(ws_sink, envelope.id, "unexpected message type").await
        }
    }
}

/// Replay persisted events with `seq > since` into the session's ordered
/// queue (same path as live fan-out, so per-channel order holds)
async fn resume(state: &AppState, event_tx: &mpsc::Sender<SessionEvent>, channel: &str, since: i64) {
    let records = match state
        .bus
        .log()
        .replay(channel, since, RESUME_BATCH_LIMIT)
        .await
    {
        Ok(records) => records,
        Err(e) => {
            tracing::error!(channel, since, error = %e, "Replay failed");
            return;
        }
    };

    let count = records.len();
    for record in records {
        let event = SessionEvent {
            channel: record.channel,
            seq: record.seq,
            payload: record.payload,
        };
        if event_tx.send(event).await.is_err() {
            return;
        }
    }
    tracing::info!(channel, since, count, "Resumed events");
}

async fn reply_invalid<S>(ws_sink: &mut S, id: Option<String>, message: &str) -> Result<(), ()>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let frame = Envelope::error(id, ErrorCode::InvalidRequest, message);
    send_envelope(ws_sink, &frame).await
}

async fn send_envelope<S>(ws_sink: &mut S, envelope: &Envelope) -> Result<(), ()>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let Ok(json) = serde_json::to_string(envelope) else {
        return Ok(());
    };
    ws_sink
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}
