//! Inbound messages and their one-time classification into a `Signal`.
//!
//! Classification looks only at the subject prefix. A correlation id never
//! turns an event into a response: events echo the id of the command that
//! caused them, and they must still reach change handlers.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::change::{Change, ChangeAction, LiveMessage, MessageDirection};
use crate::channel::Channel;
use crate::headers::{self, Headers};
use crate::ids::{CorrelationId, ThingId};
use crate::pointer::JsonPointer;

pub const RESPONSES_PREFIX: &str = "things.responses:";
pub const ERRORS_PREFIX: &str = "things.errors:";
pub const EVENTS_PREFIX: &str = "things.events:";
pub const MESSAGES_PREFIX: &str = "messages.commands:";
pub const MESSAGE_RESPONSES_PREFIX: &str = "messages.responses:";

/// A raw message as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub subject: String,
    pub channel: Channel,
    pub thing_id: ThingId,
    pub correlation_id: Option<CorrelationId>,
    pub path: JsonPointer,
    pub payload: Option<Value>,
    pub status: Option<u16>,
    pub revision: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub direction: Option<MessageDirection>,
    pub feature_id: Option<String>,
    pub headers: Headers,
}

impl InboundMessage {
    pub fn new(subject: impl Into<String>, channel: Channel, thing_id: ThingId) -> Self {
        Self {
            subject: subject.into(),
            channel,
            thing_id,
            correlation_id: None,
            path: JsonPointer::root(),
            payload: None,
            status: None,
            revision: None,
            timestamp: None,
            direction: None,
            feature_id: None,
            headers: Headers::new(),
        }
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.headers.insert(headers::CORRELATION_ID, id.as_str());
        self.correlation_id = Some(id);
        self
    }

    pub fn with_path(mut self, path: JsonPointer) -> Self {
        self.path = path;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn with_direction(mut self, direction: MessageDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_feature(mut self, feature_id: impl Into<String>) -> Self {
        self.feature_id = Some(feature_id.into());
        self
    }

    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Correlation id from the dedicated field, falling back to the header.
    pub fn effective_correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
            .clone()
            .or_else(|| self.headers.correlation_id())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandResponse {
    pub correlation_id: Option<CorrelationId>,
    pub subject: String,
    pub thing_id: ThingId,
    pub status: u16,
    pub path: JsonPointer,
    pub payload: Option<Value>,
    pub headers: Headers,
}

/// Structured error returned by the backend for a command.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub correlation_id: Option<CorrelationId>,
    pub thing_id: ThingId,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub description: Option<String>,
    pub headers: Headers,
}

/// Tagged variant over everything the transport can deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Response(CommandResponse),
    Error(ErrorResponse),
    Event(Change),
    Message(LiveMessage),
    Unknown { subject: String, thing_id: ThingId },
}

impl Signal {
    pub fn decode(message: InboundMessage) -> Signal {
        let correlation_id = message.effective_correlation_id();

        if let Some(code) = message.subject.strip_prefix(ERRORS_PREFIX) {
            let code = code.to_string();
            return Signal::Error(decode_error(message, correlation_id, code));
        }

        if message.subject.starts_with(RESPONSES_PREFIX)
            || message.subject.starts_with(MESSAGE_RESPONSES_PREFIX)
        {
            let status = message.status.unwrap_or(200);
            if status >= 400 {
                let code = message.subject.clone();
                return Signal::Error(decode_error(message, correlation_id, code));
            }
            return Signal::Response(CommandResponse {
                correlation_id,
                subject: message.subject,
                thing_id: message.thing_id,
                status,
                path: message.path,
                payload: message.payload,
                headers: message.headers,
            });
        }

        if let Some(name) = message.subject.strip_prefix(EVENTS_PREFIX) {
            return match ChangeAction::from_event_name(name) {
                Some(action) => Signal::Event(Change {
                    channel: message.channel,
                    thing_id: message.thing_id,
                    action,
                    path: message.path,
                    value: message.payload,
                    revision: message.revision.unwrap_or_default(),
                    timestamp: message.timestamp,
                    headers: message.headers,
                }),
                None => Signal::Unknown {
                    subject: message.subject,
                    thing_id: message.thing_id,
                },
            };
        }

        if let Some(subject) = message.subject.strip_prefix(MESSAGES_PREFIX) {
            return Signal::Message(LiveMessage {
                thing_id: message.thing_id,
                subject: subject.to_string(),
                direction: message.direction.unwrap_or(MessageDirection::From),
                feature_id: message.feature_id,
                payload: message.payload,
                correlation_id,
                headers: message.headers,
            });
        }

        Signal::Unknown {
            subject: message.subject,
            thing_id: message.thing_id,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Response(_) => "response",
            Signal::Error(_) => "error",
            Signal::Event(_) => "event",
            Signal::Message(_) => "message",
            Signal::Unknown { .. } => "unknown",
        }
    }

    pub fn is_command_reply(&self) -> bool {
        matches!(self, Signal::Response(_) | Signal::Error(_))
    }

    /// Correlation id of a command reply. Events and messages return `None`
    /// even when they carry one.
    pub fn reply_correlation_id(&self) -> Option<&CorrelationId> {
        match self {
            Signal::Response(r) => r.correlation_id.as_ref(),
            Signal::Error(e) => e.correlation_id.as_ref(),
            _ => None,
        }
    }
}

fn decode_error(
    message: InboundMessage,
    correlation_id: Option<CorrelationId>,
    fallback_code: String,
) -> ErrorResponse {
    let payload = message.payload.unwrap_or(Value::Null);
    let text = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);

    let status = payload
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok())
        .or(message.status)
        .unwrap_or(500);

    ErrorResponse {
        correlation_id,
        thing_id: message.thing_id,
        status,
        error: text("error").unwrap_or(fallback_code),
        message: text("message").unwrap_or_else(|| "remote operation failed".to_string()),
        description: text("description"),
        headers: message.headers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn thing() -> ThingId {
        ThingId::parse("ns:thing").unwrap()
    }

    #[test]
    fn response_subject_decodes_to_response() {
        let msg = InboundMessage::new("things.responses:modifyPolicyId", Channel::Twin, thing())
            .with_correlation_id(CorrelationId::from_raw("c1"))
            .with_status(201);

        match Signal::decode(msg) {
            Signal::Response(r) => {
                assert_eq!(r.status, 201);
                assert_eq!(r.correlation_id.unwrap().as_str(), "c1");
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn event_with_correlation_id_stays_an_event() {
        let msg = InboundMessage::new("things.events:thingDeleted", Channel::Twin, thing())
            .with_correlation_id(CorrelationId::from_raw("c1"))
            .with_revision(7);

        let signal = Signal::decode(msg);
        assert_eq!(signal.kind(), "event");
        assert!(signal.reply_correlation_id().is_none());
        match signal {
            Signal::Event(change) => {
                assert!(change.is_deleted());
                assert_eq!(change.revision, 7);
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn error_payload_is_decoded() {
        let msg = InboundMessage::new("things.errors:things:thing.notfound", Channel::Twin, thing())
            .with_header("correlation-id", "c9")
            .with_payload(json!({
                "status": 404,
                "error": "things:thing.notfound",
                "message": "The Thing could not be found",
            }));

        match Signal::decode(msg) {
            Signal::Error(e) => {
                assert_eq!(e.status, 404);
                assert_eq!(e.error, "things:thing.notfound");
                assert_eq!(e.correlation_id.unwrap().as_str(), "c9");
                assert!(e.description.is_none());
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn failed_status_on_response_subject_is_an_error() {
        let msg = InboundMessage::new("things.responses:createThing", Channel::Twin, thing())
            .with_status(409);

        match Signal::decode(msg) {
            Signal::Error(e) => {
                assert_eq!(e.status, 409);
                assert_eq!(e.error, "things.responses:createThing");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn live_message_defaults_to_from_direction() {
        let msg = InboundMessage::new("messages.commands:alarm", Channel::Live, thing())
            .with_payload(json!({"level": 3}));

        match Signal::decode(msg) {
            Signal::Message(m) => {
                assert_eq!(m.subject, "alarm");
                assert_eq!(m.direction, MessageDirection::From);
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn unrecognised_subjects_are_unknown() {
        let msg = InboundMessage::new("policies.events:policyCreated", Channel::Twin, thing());
        assert_eq!(Signal::decode(msg).kind(), "unknown");

        let msg = InboundMessage::new("things.events:thingTouched", Channel::Twin, thing());
        assert_eq!(Signal::decode(msg).kind(), "unknown");
    }
}
