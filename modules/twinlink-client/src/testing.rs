// Test doubles for the twinlink client.
//
// - MockTransport (Transport): records sends, optional reply hook,
//   connected/disconnected switch, injection of inbound messages
//
// Plus helpers for building responses, errors, change events and live
// messages the way a backend would deliver them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Notify;
use twinlink_signals::{
    Channel, CommandEnvelope, CommandKind, InboundMessage, JsonPointer, MessageDirection,
    ThingId,
};

use crate::transport::{InboundReceiver, Transport, TransportError};

type ReplyHook = Arc<dyn Fn(&CommandEnvelope) -> Option<InboundMessage> + Send + Sync>;

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// Transport spy. Starts connected with no reply hook, so commands stay
/// pending until the test injects a response with `receive`.
pub struct MockTransport {
    sent: Mutex<Vec<CommandEnvelope>>,
    connected: AtomicBool,
    receiver: Mutex<Option<Arc<dyn InboundReceiver>>>,
    on_send: Mutex<Option<ReplyHook>>,
    sent_notify: Notify,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            receiver: Mutex::new(None),
            on_send: Mutex::new(None),
            sent_notify: Notify::new(),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Answer every sent envelope with whatever `hook` returns. The reply is
    /// delivered before `send` returns.
    pub fn on_send<F>(&self, hook: F)
    where
        F: Fn(&CommandEnvelope) -> Option<InboundMessage> + Send + Sync + 'static,
    {
        *self.on_send.lock().unwrap() = Some(Arc::new(hook));
    }

    /// Reply to every command the way a healthy backend would.
    pub fn autorespond(&self) {
        self.on_send(|envelope| Some(success_for(envelope)));
    }

    pub fn clear_on_send(&self) {
        *self.on_send.lock().unwrap() = None;
    }

    /// Push an inbound message to the attached client. Returns false when
    /// no client is attached.
    pub fn receive(&self, message: InboundMessage) -> bool {
        let receiver = self.receiver.lock().unwrap().clone();
        match receiver {
            Some(receiver) => {
                receiver.on_inbound(message);
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.receiver.lock().unwrap().is_some()
    }

    pub fn sent(&self) -> Vec<CommandEnvelope> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_sent(&self) -> Option<CommandEnvelope> {
        self.sent.lock().unwrap().last().cloned()
    }

    /// Wait until at least `count` envelopes were sent.
    pub async fn wait_for_sends(&self, count: usize, within: Duration) -> bool {
        tokio::time::timeout(within, async {
            loop {
                let notified = self.sent_notify.notified();
                if self.sent_count() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

impl Transport for MockTransport {
    fn send(&self, envelope: CommandEnvelope) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }

        self.sent.lock().unwrap().push(envelope.clone());
        self.sent_notify.notify_waiters();

        // Release the lock before calling out: the hook may send again.
        let hook = self.on_send.lock().unwrap().clone();
        if let Some(reply) = hook.and_then(|hook| hook(&envelope)) {
            self.receive(reply);
        }
        Ok(())
    }

    fn attach(&self, receiver: Arc<dyn InboundReceiver>) {
        *self.receiver.lock().unwrap() = Some(receiver);
    }
}

// ---------------------------------------------------------------------------
// Inbound message helpers
// ---------------------------------------------------------------------------

/// A successful response to `envelope`, carrying its correlation id.
pub fn response_for(envelope: &CommandEnvelope, status: u16, payload: Option<Value>) -> InboundMessage {
    let mut message = InboundMessage::new(
        envelope.response_subject(),
        envelope.channel,
        envelope.thing_id.clone(),
    )
    .with_path(envelope.path.clone())
    .with_status(status);
    if let Some(id) = envelope.correlation_id() {
        message = message.with_correlation_id(id);
    }
    if let Some(payload) = payload {
        message = message.with_payload(payload);
    }
    message
}

/// A structured error reply to `envelope`.
pub fn error_for(envelope: &CommandEnvelope, status: u16, error: &str, message: &str) -> InboundMessage {
    let mut reply = InboundMessage::new(
        format!("things.errors:{error}"),
        envelope.channel,
        envelope.thing_id.clone(),
    )
    .with_status(status)
    .with_payload(json!({
        "status": status,
        "error": error,
        "message": message,
    }));
    if let Some(id) = envelope.correlation_id() {
        reply = reply.with_correlation_id(id);
    }
    reply
}

/// What a backend answers when a command succeeds.
pub fn success_for(envelope: &CommandEnvelope) -> InboundMessage {
    match envelope.kind {
        CommandKind::CreateThing => response_for(envelope, 201, envelope.value.clone()),
        CommandKind::RetrieveThing => response_for(
            envelope,
            200,
            Some(json!({ "thingId": envelope.thing_id.as_str() })),
        ),
        CommandKind::SendMessage => response_for(envelope, 200, envelope.value.clone()),
        _ => response_for(envelope, 204, None),
    }
}

/// A change event such as `things.events:attributeModified`.
pub fn change_event(
    channel: Channel,
    thing_id: &ThingId,
    event_name: &str,
    path: &str,
    revision: i64,
) -> InboundMessage {
    let path = JsonPointer::parse(path).unwrap_or_else(|_| JsonPointer::root());
    InboundMessage::new(format!("things.events:{event_name}"), channel, thing_id.clone())
        .with_path(path)
        .with_revision(revision)
}

/// A live message sent from a device.
pub fn live_message(thing_id: &ThingId, subject: &str, payload: Value) -> InboundMessage {
    InboundMessage::new(format!("messages.commands:{subject}"), Channel::Live, thing_id.clone())
        .with_direction(MessageDirection::From)
        .with_payload(payload)
}

pub fn thing_id(raw: &str) -> ThingId {
    ThingId::parse(raw).unwrap()
}
