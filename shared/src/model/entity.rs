//! Entity model — a routable target for inquiries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Group,
    Role,
    Bot,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::User => "user",
            EntityKind::Group => "group",
            EntityKind::Role => "role",
            EntityKind::Bot => "bot",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(EntityKind::User),
            "group" => Ok(EntityKind::Group),
            "role" => Ok(EntityKind::Role),
            "bot" => Ok(EntityKind::Bot),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// A routable recipient, identified by opaque ID and optional unique handle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// Create entity payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCreate {
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

/// Entity reference in inbound payloads: exactly one of `id` or `handle`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
}
