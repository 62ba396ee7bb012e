//! Outgoing command envelopes.

use serde_json::{json, Value};

use crate::channel::Channel;
use crate::headers::{self, Headers};
use crate::ids::{CorrelationId, ThingId};
use crate::pointer::JsonPointer;

/// Every command the client can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CreateThing,
    ModifyThing,
    DeleteThing,
    RetrieveThing,
    ModifyPolicyId,
    ModifyAttribute,
    ModifyAttributes,
    DeleteAttribute,
    DeleteAttributes,
    ModifyFeature,
    DeleteFeature,
    ModifyFeatureProperty,
    DeleteFeatureProperty,
    SendMessage,
}

/// What a command means for the target's existence. Drives option
/// validation: only `Upsert` accepts an explicit existence requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semantics {
    /// Must not exist yet.
    Create,
    /// Create or replace.
    Upsert,
    /// Must already exist.
    Update,
    /// Modify without existence semantics.
    Modify,
    Delete,
    Retrieve,
    Message,
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::CreateThing => "createThing",
            CommandKind::ModifyThing => "modifyThing",
            CommandKind::DeleteThing => "deleteThing",
            CommandKind::RetrieveThing => "retrieveThing",
            CommandKind::ModifyPolicyId => "modifyPolicyId",
            CommandKind::ModifyAttribute => "modifyAttribute",
            CommandKind::ModifyAttributes => "modifyAttributes",
            CommandKind::DeleteAttribute => "deleteAttribute",
            CommandKind::DeleteAttributes => "deleteAttributes",
            CommandKind::ModifyFeature => "modifyFeature",
            CommandKind::DeleteFeature => "deleteFeature",
            CommandKind::ModifyFeatureProperty => "modifyFeatureProperty",
            CommandKind::DeleteFeatureProperty => "deleteFeatureProperty",
            CommandKind::SendMessage => "sendMessage",
        }
    }

    pub fn default_semantics(&self) -> Semantics {
        match self {
            CommandKind::CreateThing => Semantics::Create,
            CommandKind::ModifyThing
            | CommandKind::ModifyAttribute
            | CommandKind::ModifyAttributes
            | CommandKind::ModifyFeature
            | CommandKind::ModifyFeatureProperty => Semantics::Upsert,
            CommandKind::ModifyPolicyId => Semantics::Modify,
            CommandKind::DeleteThing
            | CommandKind::DeleteAttribute
            | CommandKind::DeleteAttributes
            | CommandKind::DeleteFeature
            | CommandKind::DeleteFeatureProperty => Semantics::Delete,
            CommandKind::RetrieveThing => Semantics::Retrieve,
            CommandKind::SendMessage => Semantics::Message,
        }
    }

    /// Whether the command addresses the whole thing, the only place policy
    /// options make sense.
    pub fn is_whole_thing(&self) -> bool {
        matches!(self, CommandKind::CreateThing | CommandKind::ModifyThing)
    }

    fn topic_action(&self) -> &'static str {
        match self.default_semantics() {
            Semantics::Create => "create",
            Semantics::Delete => "delete",
            Semantics::Retrieve => "retrieve",
            _ => "modify",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandEnvelope {
    pub channel: Channel,
    pub kind: CommandKind,
    pub semantics: Semantics,
    pub thing_id: ThingId,
    pub path: JsonPointer,
    pub value: Option<Value>,
    pub headers: Headers,
    /// Application subject, set only for live messages.
    pub message_subject: Option<String>,
}

impl CommandEnvelope {
    pub fn new(channel: Channel, kind: CommandKind, thing_id: ThingId) -> Self {
        Self {
            channel,
            kind,
            semantics: kind.default_semantics(),
            thing_id,
            path: JsonPointer::root(),
            value: None,
            headers: Headers::new(),
            message_subject: None,
        }
    }

    pub fn with_semantics(mut self, semantics: Semantics) -> Self {
        self.semantics = semantics;
        self
    }

    pub fn with_path(mut self, path: JsonPointer) -> Self {
        self.path = path;
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn with_message_subject(mut self, subject: impl Into<String>) -> Self {
        self.message_subject = Some(subject.into());
        self
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.headers.correlation_id()
    }

    /// Signal type of this command, e.g. `things.commands:modifyAttribute`.
    pub fn subject(&self) -> String {
        match (&self.kind, &self.message_subject) {
            (CommandKind::SendMessage, Some(subject)) => format!("messages.commands:{subject}"),
            (kind, _) => format!("things.commands:{}", kind.name()),
        }
    }

    /// Subject a successful response to this command carries.
    pub fn response_subject(&self) -> String {
        match (&self.kind, &self.message_subject) {
            (CommandKind::SendMessage, Some(subject)) => format!("messages.responses:{subject}"),
            (kind, _) => format!("things.responses:{}", kind.name()),
        }
    }

    /// Protocol topic, e.g. `org.example/sensor-1/things/twin/commands/modify`.
    pub fn topic(&self) -> String {
        let base = format!(
            "{}/{}/things/{}",
            self.thing_id.namespace(),
            self.thing_id.name(),
            self.channel
        );
        match (&self.kind, &self.message_subject) {
            (CommandKind::SendMessage, Some(subject)) => format!("{base}/messages/{subject}"),
            (kind, _) => format!("{base}/commands/{}", kind.topic_action()),
        }
    }

    /// JSON form handed to text-based transports.
    pub fn to_protocol_json(&self) -> Value {
        let mut headers = self.headers.clone();
        headers.insert(headers::CHANNEL, self.channel.as_str());
        let mut out = json!({
            "topic": self.topic(),
            "headers": headers,
            "path": self.path.to_string(),
        });
        if let Some(value) = &self.value {
            out["value"] = value.clone();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thing() -> ThingId {
        ThingId::parse("org.example:sensor-1").unwrap()
    }

    #[test]
    fn twin_command_topic_and_subjects() {
        let env = CommandEnvelope::new(Channel::Twin, CommandKind::ModifyAttribute, thing())
            .with_path(JsonPointer::parse("/attributes/temp").unwrap());

        assert_eq!(env.topic(), "org.example/sensor-1/things/twin/commands/modify");
        assert_eq!(env.subject(), "things.commands:modifyAttribute");
        assert_eq!(env.response_subject(), "things.responses:modifyAttribute");
        assert_eq!(env.semantics, Semantics::Upsert);
    }

    #[test]
    fn live_message_topic_uses_application_subject() {
        let env = CommandEnvelope::new(Channel::Live, CommandKind::SendMessage, thing())
            .with_message_subject("reboot");

        assert_eq!(env.topic(), "org.example/sensor-1/things/live/messages/reboot");
        assert_eq!(env.subject(), "messages.commands:reboot");
        assert_eq!(env.response_subject(), "messages.responses:reboot");
    }

    #[test]
    fn protocol_json_carries_channel_header_and_value() {
        let env = CommandEnvelope::new(Channel::Twin, CommandKind::CreateThing, thing())
            .with_value(serde_json::json!({"thingId": "org.example:sensor-1"}));

        let json = env.to_protocol_json();
        assert_eq!(json["topic"], "org.example/sensor-1/things/twin/commands/create");
        assert_eq!(json["headers"]["channel"], "twin");
        assert_eq!(json["path"], "/");
        assert_eq!(json["value"]["thingId"], "org.example:sensor-1");
    }
}
