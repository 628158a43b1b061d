//! Request (inquiry) model and its status state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Request status
///
/// ```text
///             claim (conditional, at-most-one)
///             └─► CLAIMED
/// PENDING ───┤   postResponse (CLAIMED|PENDING → ANSWERED)
///             ├─► ANSWERED  (terminal)
///             ├─► CANCELLED (terminal, from PENDING|CLAIMED)
///             └─► EXPIRED   (terminal, from PENDING)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Claimed,
    Answered,
    Cancelled,
    Expired,
}

impl RequestStatus {
    /// Terminal statuses are sinks
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Answered | RequestStatus::Cancelled | RequestStatus::Expired
        )
    }

    /// Whether the state machine permits `self → to`
    pub fn can_transition_to(&self, to: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, to),
            (Pending, Claimed)
                | (Pending, Answered)
                | (Claimed, Answered)
                | (Pending, Cancelled)
                | (Claimed, Cancelled)
                | (Pending, Expired)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Claimed => "CLAIMED",
            RequestStatus::Answered => "ANSWERED",
            RequestStatus::Cancelled => "CANCELLED",
            RequestStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RequestStatus::Pending),
            "CLAIMED" => Ok(RequestStatus::Claimed),
            "ANSWERED" => Ok(RequestStatus::Answered),
            "CANCELLED" => Ok(RequestStatus::Cancelled),
            "EXPIRED" => Ok(RequestStatus::Expired),
            other => Err(format!("unknown request status: {other}")),
        }
    }
}

/// How the schema payload is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaKind {
    /// Full JSON Schema document, strictly validated
    #[serde(rename = "jsonschema")]
    JsonSchema,
    /// Concrete example; informational, never rejects responses
    #[serde(rename = "jsonexample")]
    JsonExample,
    /// Top-level `$ref` to a remote document
    #[serde(rename = "ref")]
    Ref,
}

impl SchemaKind {
    /// Classify a schema document: top-level `$ref` wins, then `example`
    pub fn detect(schema: &Value) -> Self {
        if schema.get("$ref").is_some() {
            SchemaKind::Ref
        } else if schema.get("example").is_some() {
            SchemaKind::JsonExample
        } else {
            SchemaKind::JsonSchema
        }
    }

    /// Whether responses are validated against the compiled schema
    pub fn validates(&self) -> bool {
        matches!(self, SchemaKind::JsonSchema | SchemaKind::Ref)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::JsonSchema => "jsonschema",
            SchemaKind::JsonExample => "jsonexample",
            SchemaKind::Ref => "ref",
        }
    }
}

impl std::str::FromStr for SchemaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jsonschema" => Ok(SchemaKind::JsonSchema),
            "jsonexample" => Ok(SchemaKind::JsonExample),
            "ref" => Ok(SchemaKind::Ref),
            other => Err(format!("unknown schema kind: {other}")),
        }
    }
}

/// A schema-described data-entry demand directed at an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: String,
    pub created_by: String,
    pub entity_id: String,
    pub status: RequestStatus,
    pub schema_kind: SchemaKind,
    pub schema_payload: Value,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub ui_hints: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub prefill: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attention_at: Option<DateTime<Utc>>,
    /// Grace period after the deadline before auto-cancel, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autocancel_grace_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_policy: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_transitions_follow_state_graph() {
        use RequestStatus::*;
        assert!(Pending.can_transition_to(Claimed));
        assert!(Pending.can_transition_to(Answered));
        assert!(Claimed.can_transition_to(Answered));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Claimed.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Expired));

        // Terminal states are sinks
        for terminal in [Answered, Cancelled, Expired] {
            assert!(terminal.is_terminal());
            for to in [Pending, Claimed, Answered, Cancelled, Expired] {
                assert!(!terminal.can_transition_to(to));
            }
        }

        // No way back and no claimed → expired
        assert!(!Claimed.can_transition_to(Pending));
        assert!(!Claimed.can_transition_to(Expired));
    }

    #[test]
    fn status_serde_screaming() {
        assert_eq!(
            serde_json::to_string(&RequestStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        let s: RequestStatus = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(s, RequestStatus::Cancelled);
    }

    #[test]
    fn schema_kind_detection() {
        assert_eq!(
            SchemaKind::detect(&json!({"$ref": "https://example.com/s.json"})),
            SchemaKind::Ref
        );
        assert_eq!(
            SchemaKind::detect(&json!({"example": {"name": "Alice"}})),
            SchemaKind::JsonExample
        );
        assert_eq!(
            SchemaKind::detect(&json!({"type": "object"})),
            SchemaKind::JsonSchema
        );
    }

    #[test]
    fn schema_kind_validation_flags() {
        assert!(SchemaKind::JsonSchema.validates());
        assert!(SchemaKind::Ref.validates());
        assert!(!SchemaKind::JsonExample.validates());
    }
}
