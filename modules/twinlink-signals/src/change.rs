//! Decoded notifications handed to registered handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::Channel;
use crate::headers::Headers;
use crate::ids::{CorrelationId, ThingId};
use crate::pointer::JsonPointer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
    Merged,
    Deleted,
}

impl ChangeAction {
    /// Derive the action from an event name such as `attributeModified`.
    pub fn from_event_name(name: &str) -> Option<Self> {
        if name.ends_with("Created") {
            Some(ChangeAction::Created)
        } else if name.ends_with("Modified") {
            Some(ChangeAction::Updated)
        } else if name.ends_with("Merged") {
            Some(ChangeAction::Merged)
        } else if name.ends_with("Deleted") {
            Some(ChangeAction::Deleted)
        } else {
            None
        }
    }
}

/// A state transition of a thing, as pushed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub channel: Channel,
    pub thing_id: ThingId,
    pub action: ChangeAction,
    /// Path of the changed subtree, relative to the thing.
    pub path: JsonPointer,
    pub value: Option<Value>,
    pub revision: i64,
    pub timestamp: Option<DateTime<Utc>>,
    pub headers: Headers,
}

impl Change {
    pub fn is_created(&self) -> bool {
        self.action == ChangeAction::Created
    }

    pub fn is_updated(&self) -> bool {
        matches!(self.action, ChangeAction::Updated | ChangeAction::Merged)
    }

    pub fn is_deleted(&self) -> bool {
        self.action == ChangeAction::Deleted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    /// Addressed to the device.
    To,
    /// Emitted by the device.
    From,
}

/// A live message exchanged with the device behind a thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMessage {
    pub thing_id: ThingId,
    pub subject: String,
    pub direction: MessageDirection,
    pub feature_id: Option<String>,
    pub payload: Option<Value>,
    pub correlation_id: Option<CorrelationId>,
    pub headers: Headers,
}
