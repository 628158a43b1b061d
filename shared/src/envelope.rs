//! Session message envelope
//!
//! One JSON object shape is used for everything that travels over a
//! bidirectional session, client→server and server→client:
//!
//! ```text
//! Client ──▶ subscribe/unsubscribe/resume/ack/cmd/ping ──▶ Session
//! Server ──▶ event/ack/response/error ──────────────────▶ Client
//! ```
//!
//! Unused fields are omitted from the wire form; `id` correlates a `cmd`
//! with its `response`/`error`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::ErrorCode;

/// Envelope `type` discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Service command (client → server)
    Cmd,
    /// Channel event (server → client)
    Event,
    /// Acknowledgement frame (both directions: client acks a seq, server
    /// acks subscribe/unsubscribe/ping)
    Ack,
    /// Command result (server → client)
    Response,
    /// Command or protocol failure (server → client)
    Error,
    /// Channel subscription (client → server)
    Subscribe,
    /// Channel unsubscription (client → server)
    Unsubscribe,
    /// Replay request from a sequence position (client → server)
    Resume,
    /// Liveness probe (client → server)
    Ping,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::Cmd => "cmd",
            MessageType::Event => "event",
            MessageType::Ack => "ack",
            MessageType::Response => "response",
            MessageType::Error => "error",
            MessageType::Subscribe => "subscribe",
            MessageType::Unsubscribe => "unsubscribe",
            MessageType::Resume => "resume",
            MessageType::Ping => "ping",
        };
        write!(f, "{s}")
    }
}

/// Session message envelope
///
/// Field presence depends on `type`; everything optional is skipped when
/// absent so frames stay compact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Client-chosen correlation id (cmd ↔ response/error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Command operation name (`createRequest`, `claimRequest`, …)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Event sequence number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
    /// Resume-from position (exclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Ack label (`subscribed`, `unsubscribed`, `pong`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack: Option<String>,
    /// Stable machine-readable error name (error frames only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable error message (error frames only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    fn bare(kind: MessageType) -> Self {
        Self {
            kind,
            id: None,
            op: None,
            channel: None,
            seq: None,
            since: None,
            data: None,
            ack: None,
            code: None,
            message: None,
        }
    }

    /// Server event frame: `{type:"event", channel, seq, data}`
    pub fn event(channel: impl Into<String>, seq: i64, data: Value) -> Self {
        Self {
            channel: Some(channel.into()),
            seq: Some(seq),
            data: Some(data),
            ..Self::bare(MessageType::Event)
        }
    }

    /// Server ack frame: `{type:"ack", ack, channel?}`
    pub fn ack(label: impl Into<String>, channel: Option<String>) -> Self {
        Self {
            ack: Some(label.into()),
            channel,
            ..Self::bare(MessageType::Ack)
        }
    }

    /// Server response frame for a command: `{type:"response", id?, data}`
    pub fn response(id: Option<String>, data: Value) -> Self {
        Self {
            id,
            data: Some(data),
            ..Self::bare(MessageType::Response)
        }
    }

    /// Server error frame: `{type:"error", id?, code, message}`
    pub fn error(id: Option<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id,
            code: Some(code.as_str().to_string()),
            message: Some(message.into()),
            ..Self::bare(MessageType::Error)
        }
    }

    /// Client subscribe frame
    pub fn subscribe(channel: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            ..Self::bare(MessageType::Subscribe)
        }
    }

    /// Client unsubscribe frame
    pub fn unsubscribe(channel: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            ..Self::bare(MessageType::Unsubscribe)
        }
    }

    /// Client resume frame: replay events with `seq > since`
    pub fn resume(channel: impl Into<String>, since: i64) -> Self {
        Self {
            channel: Some(channel.into()),
            since: Some(since),
            ..Self::bare(MessageType::Resume)
        }
    }

    /// Client ack frame: highest processed seq on a channel
    pub fn seq_ack(channel: impl Into<String>, seq: i64) -> Self {
        Self {
            channel: Some(channel.into()),
            seq: Some(seq),
            ..Self::bare(MessageType::Ack)
        }
    }

    /// Client command frame
    pub fn cmd(id: impl Into<String>, op: impl Into<String>, data: Value) -> Self {
        Self {
            id: Some(id.into()),
            op: Some(op.into()),
            data: Some(data),
            ..Self::bare(MessageType::Cmd)
        }
    }

    /// Client ping frame
    pub fn ping() -> Self {
        Self::bare(MessageType::Ping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_frame_wire_shape() {
        let env = Envelope::event("entity:e1", 3, json!({"type": "request.created"}));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["channel"], "entity:e1");
        assert_eq!(json["seq"], 3);
        assert_eq!(json["data"]["type"], "request.created");
        // unused fields stay off the wire
        assert!(json.get("op").is_none());
        assert!(json.get("code").is_none());
    }

    #[test]
    fn error_frame_carries_code_and_message() {
        let env = Envelope::error(
            Some("m1".into()),
            ErrorCode::ClaimConflict,
            "Request has already been claimed",
        );
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["id"], "m1");
        assert_eq!(json["code"], "claim_conflict");
    }

    #[test]
    fn cmd_roundtrip() {
        let env = Envelope::cmd("42", "claimRequest", json!({"requestId": "01ARZ"}));
        let text = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back, env);
        assert_eq!(back.kind, MessageType::Cmd);
        assert_eq!(back.op.as_deref(), Some("claimRequest"));
    }

    #[test]
    fn parses_client_frames() {
        let env: Envelope =
            serde_json::from_str(r#"{"type":"resume","channel":"entity:e1","since":3}"#).unwrap();
        assert_eq!(env.kind, MessageType::Resume);
        assert_eq!(env.since, Some(3));

        let env: Envelope = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(env.kind, MessageType::Ping);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let res: Result<Envelope, _> = serde_json::from_str(r#"{"type":"telemetry"}"#);
        assert!(res.is_err());
    }
}
