use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EventId, EventKind};

/// Connectivity class at the moment an event was emitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Connectivity {
    #[default]
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub connectivity: Connectivity,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Serializable description of how to undo an event.
///
/// The bus applies it by emitting `kind` with `payload`; the application's
/// listeners for that kind perform the actual state change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InverseDescriptor {
    pub kind: EventKind,
    pub payload: Value,
}

impl InverseDescriptor {
    pub fn new(kind: EventKind, payload: Value) -> Self {
        InverseDescriptor { kind, payload }
    }
}

/// One immutable fact about a state change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    id: EventId,
    kind: EventKind,
    timestamp: DateTime<Utc>,
    actor_id: String,
    session_id: String,
    payload: Value,
    #[serde(default)]
    metadata: EventMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inverse: Option<InverseDescriptor>,
}

impl EventRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: EventId,
        kind: EventKind,
        timestamp: DateTime<Utc>,
        actor_id: impl Into<String>,
        session_id: impl Into<String>,
        payload: Value,
        metadata: EventMetadata,
        inverse: Option<InverseDescriptor>,
    ) -> Self {
        EventRecord {
            id,
            kind,
            timestamp,
            actor_id: actor_id.into(),
            session_id: session_id.into(),
            payload,
            metadata,
            inverse,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    /// A record is reversible exactly when it carries an inverse.
    pub fn is_reversible(&self) -> bool {
        self.inverse.is_some()
    }

    pub fn inverse(&self) -> Option<&InverseDescriptor> {
        self.inverse.as_ref()
    }
}
