//! The application-facing surface: per-channel handles, per-thing handles
//! and the live message builder. Every method funnels into
//! `ChannelHandle::issue`, so option validation and correlation behave the
//! same everywhere.

use std::ops::Deref;
use std::sync::Arc;

use serde_json::Value;
use twinlink_signals::{
    Change, Channel, CommandEnvelope, CommandKind, CommandResponse, JsonPointer, LiveMessage,
    ModifyOption, PolicyId, Semantics, Thing, ThingId,
};

use crate::client::ClientCore;
use crate::error::{ClientError, ClientResult};
use crate::future::{
    decode_optional_thing, decode_payload, decode_thing, decode_unit, CommandFuture, Decoder,
};
use crate::gateway::INLINE_POLICY;
use crate::registry::Handler;
use crate::selector::{MessageFilter, Selector};

fn attributes_root() -> JsonPointer {
    JsonPointer::root().push("attributes")
}

fn features_root() -> JsonPointer {
    JsonPointer::root().push("features")
}

fn feature_path(feature_id: &str) -> ClientResult<JsonPointer> {
    if feature_id.trim().is_empty() || feature_id.contains('/') {
        return Err(ClientError::InvalidArgument(format!(
            "invalid feature id {feature_id:?}"
        )));
    }
    Ok(features_root().push(feature_id))
}

fn feature_property_path(feature_id: &str, property: &JsonPointer) -> ClientResult<JsonPointer> {
    if property.is_root() {
        return Err(ClientError::InvalidArgument(
            "feature property path must not be empty".into(),
        ));
    }
    Ok(feature_path(feature_id)?.push("properties").join(property))
}

fn attribute_path(path: &JsonPointer) -> ClientResult<JsonPointer> {
    if path.is_root() {
        return Err(ClientError::InvalidArgument(
            "attribute path must not be empty".into(),
        ));
    }
    Ok(attributes_root().join(path))
}

// --- Channel handle ---

/// Commands and registrations on one channel. Twin and live handles of the
/// same client share the correlator but nothing else.
#[derive(Clone)]
pub struct ChannelHandle {
    channel: Channel,
    core: Arc<ClientCore>,
}

impl ChannelHandle {
    pub(crate) fn new(channel: Channel, core: Arc<ClientCore>) -> Self {
        Self { channel, core }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    fn envelope(&self, kind: CommandKind, thing_id: ThingId) -> CommandEnvelope {
        CommandEnvelope::new(self.channel, kind, thing_id)
    }

    fn issue<T>(
        &self,
        envelope: CommandEnvelope,
        options: &[ModifyOption],
        decode: Decoder<T>,
    ) -> CommandFuture<T> {
        self.core.issue(envelope, options, decode)
    }

    /// Raw entry point: send `kind` for `thing_id` at `path` and get the
    /// backend's response as-is.
    pub fn issue_command(
        &self,
        thing_id: ThingId,
        kind: CommandKind,
        path: JsonPointer,
        payload: Option<Value>,
        options: &[ModifyOption],
    ) -> CommandFuture<CommandResponse> {
        let mut envelope = self.envelope(kind, thing_id).with_path(path);
        envelope.value = payload;
        self.issue(envelope, options, Ok)
    }

    // --- Whole-thing commands ---

    /// Create a thing. Resolves with the created thing when the backend
    /// returns it.
    pub fn create(
        &self,
        thing: impl Into<Thing>,
        options: &[ModifyOption],
    ) -> CommandFuture<Option<Thing>> {
        let thing = thing.into();
        let envelope = self
            .envelope(CommandKind::CreateThing, thing.thing_id.clone())
            .with_value(thing.to_json());
        self.issue(envelope, options, decode_optional_thing)
    }

    /// Create a thing from its JSON form, which must carry `thingId`.
    pub fn create_from_json(
        &self,
        thing: Value,
        options: &[ModifyOption],
    ) -> CommandFuture<Option<Thing>> {
        let thing_id = match thing_id_of(&thing) {
            Ok(id) => id,
            Err(e) => return CommandFuture::failed(e),
        };
        let envelope = self
            .envelope(CommandKind::CreateThing, thing_id)
            .with_value(thing);
        self.issue(envelope, options, decode_optional_thing)
    }

    /// Create a thing together with its own policy. `policy` must be a JSON
    /// object; `null` is rejected rather than silently dropped.
    pub fn create_with_policy(
        &self,
        thing: impl Into<Thing>,
        policy: Value,
        options: &[ModifyOption],
    ) -> CommandFuture<Option<Thing>> {
        let thing = thing.into();
        let envelope = self
            .envelope(CommandKind::CreateThing, thing.thing_id.clone())
            .with_value(with_inline_policy(&thing, policy));
        self.issue(envelope, options, decode_optional_thing)
    }

    /// Create or replace a thing. Resolves with the thing if it was created.
    pub fn put(&self, thing: impl Into<Thing>, options: &[ModifyOption]) -> CommandFuture<Option<Thing>> {
        let thing = thing.into();
        let envelope = self
            .envelope(CommandKind::ModifyThing, thing.thing_id.clone())
            .with_value(thing.to_json());
        self.issue(envelope, options, decode_optional_thing)
    }

    pub fn put_with_policy(
        &self,
        thing: impl Into<Thing>,
        policy: Value,
        options: &[ModifyOption],
    ) -> CommandFuture<Option<Thing>> {
        let thing = thing.into();
        let envelope = self
            .envelope(CommandKind::ModifyThing, thing.thing_id.clone())
            .with_value(with_inline_policy(&thing, policy));
        self.issue(envelope, options, decode_optional_thing)
    }

    /// Replace an existing thing. Fails remotely if it does not exist.
    pub fn update(&self, thing: Thing, options: &[ModifyOption]) -> CommandFuture<()> {
        let envelope = self
            .envelope(CommandKind::ModifyThing, thing.thing_id.clone())
            .with_semantics(Semantics::Update)
            .with_value(thing.to_json());
        self.issue(envelope, options, decode_unit)
    }

    pub fn delete(&self, thing_id: ThingId, options: &[ModifyOption]) -> CommandFuture<()> {
        self.issue(self.envelope(CommandKind::DeleteThing, thing_id), options, decode_unit)
    }

    pub fn retrieve(&self, thing_id: ThingId) -> CommandFuture<Thing> {
        self.issue(self.envelope(CommandKind::RetrieveThing, thing_id), &[], decode_thing)
    }

    pub fn for_id(&self, thing_id: ThingId) -> ThingHandle {
        ThingHandle {
            handle: self.clone(),
            thing_id,
        }
    }

    // --- Registrations ---

    /// Receive every change of every thing on this channel.
    pub fn register_for_thing_changes<H>(&self, registration_id: &str, handler: H) -> ClientResult<()>
    where
        H: Handler<Change> + 'static,
    {
        self.register_for_changes(registration_id, Selector::all(), handler)
    }

    pub fn register_for_changes<H>(
        &self,
        registration_id: &str,
        selector: Selector,
        handler: H,
    ) -> ClientResult<()>
    where
        H: Handler<Change> + 'static,
    {
        self.core
            .dispatcher
            .registrations(self.channel)
            .changes
            .add(registration_id, selector, Arc::new(handler))
    }

    /// Remove a change or message registration of this channel. True if
    /// something was removed.
    pub fn deregister(&self, registration_id: &str) -> bool {
        self.core
            .dispatcher
            .registrations(self.channel)
            .remove(registration_id)
    }

    // --- Consumption ---

    /// Start delivering events of this channel. True if it was stopped.
    pub fn start_consumption(&self) -> bool {
        self.core.dispatcher.consumption().start(self.channel)
    }

    pub fn stop_consumption(&self) -> bool {
        self.core.dispatcher.consumption().stop(self.channel)
    }

    pub fn is_consuming(&self) -> bool {
        self.core.dispatcher.consumption().is_started(self.channel)
    }
}

fn thing_id_of(thing: &Value) -> ClientResult<ThingId> {
    let raw = thing
        .get("thingId")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::InvalidArgument("thing JSON must carry a thingId".into()))?;
    Ok(ThingId::parse(raw)?)
}

fn with_inline_policy(thing: &Thing, policy: Value) -> Value {
    let mut value = thing.to_json();
    if let Some(obj) = value.as_object_mut() {
        obj.insert(INLINE_POLICY.to_string(), policy);
    }
    value
}

// --- Thing handle ---

/// Commands and registrations scoped to one thing.
#[derive(Clone)]
pub struct ThingHandle {
    handle: ChannelHandle,
    thing_id: ThingId,
}

impl ThingHandle {
    pub fn thing_id(&self) -> &ThingId {
        &self.thing_id
    }

    fn envelope(&self, kind: CommandKind, path: JsonPointer) -> CommandEnvelope {
        self.handle.envelope(kind, self.thing_id.clone()).with_path(path)
    }

    fn modify(
        &self,
        kind: CommandKind,
        path: ClientResult<JsonPointer>,
        value: Option<Value>,
        options: &[ModifyOption],
    ) -> CommandFuture<()> {
        match path {
            Ok(path) => {
                let mut envelope = self.envelope(kind, path);
                envelope.value = value;
                self.handle.issue(envelope, options, decode_unit)
            }
            Err(e) => CommandFuture::failed(e),
        }
    }

    pub fn set_policy_id(&self, policy_id: PolicyId, options: &[ModifyOption]) -> CommandFuture<()> {
        self.modify(
            CommandKind::ModifyPolicyId,
            Ok(JsonPointer::root().push("policyId")),
            Some(Value::String(policy_id.to_string())),
            options,
        )
    }

    /// Create or replace the attribute at `path` (relative to
    /// `/attributes`). Accepts anything convertible to JSON: bool, integers,
    /// floats, strings, objects.
    pub fn put_attribute(
        &self,
        path: &JsonPointer,
        value: impl Into<Value>,
        options: &[ModifyOption],
    ) -> CommandFuture<()> {
        self.modify(
            CommandKind::ModifyAttribute,
            attribute_path(path),
            Some(value.into()),
            options,
        )
    }

    /// Replace all attributes. `attributes` must be a JSON object.
    pub fn set_attributes(&self, attributes: Value, options: &[ModifyOption]) -> CommandFuture<()> {
        if !attributes.is_object() {
            return CommandFuture::failed(ClientError::InvalidArgument(
                "attributes must be a JSON object".into(),
            ));
        }
        self.modify(
            CommandKind::ModifyAttributes,
            Ok(attributes_root()),
            Some(attributes),
            options,
        )
    }

    pub fn delete_attribute(&self, path: &JsonPointer, options: &[ModifyOption]) -> CommandFuture<()> {
        self.modify(CommandKind::DeleteAttribute, attribute_path(path), None, options)
    }

    pub fn delete_attributes(&self, options: &[ModifyOption]) -> CommandFuture<()> {
        self.modify(CommandKind::DeleteAttributes, Ok(attributes_root()), None, options)
    }

    pub fn put_feature(
        &self,
        feature_id: &str,
        feature: Value,
        options: &[ModifyOption],
    ) -> CommandFuture<()> {
        self.modify(
            CommandKind::ModifyFeature,
            feature_path(feature_id),
            Some(feature),
            options,
        )
    }

    pub fn delete_feature(&self, feature_id: &str, options: &[ModifyOption]) -> CommandFuture<()> {
        self.modify(CommandKind::DeleteFeature, feature_path(feature_id), None, options)
    }

    pub fn put_feature_property(
        &self,
        feature_id: &str,
        path: &JsonPointer,
        value: impl Into<Value>,
        options: &[ModifyOption],
    ) -> CommandFuture<()> {
        self.modify(
            CommandKind::ModifyFeatureProperty,
            feature_property_path(feature_id, path),
            Some(value.into()),
            options,
        )
    }

    pub fn delete_feature_property(
        &self,
        feature_id: &str,
        path: &JsonPointer,
        options: &[ModifyOption],
    ) -> CommandFuture<()> {
        self.modify(
            CommandKind::DeleteFeatureProperty,
            feature_property_path(feature_id, path),
            None,
            options,
        )
    }

    pub fn delete(&self, options: &[ModifyOption]) -> CommandFuture<()> {
        self.handle.delete(self.thing_id.clone(), options)
    }

    pub fn retrieve(&self) -> CommandFuture<Thing> {
        self.handle.retrieve(self.thing_id.clone())
    }

    /// Every change of this thing.
    pub fn register_for_changes<H>(&self, registration_id: &str, handler: H) -> ClientResult<()>
    where
        H: Handler<Change> + 'static,
    {
        self.handle.register_for_changes(
            registration_id,
            Selector::thing(self.thing_id.clone()),
            handler,
        )
    }

    /// Changes overlapping the attribute at `path`. The root path selects
    /// all attribute changes.
    pub fn register_for_attribute_changes<H>(
        &self,
        registration_id: &str,
        path: &JsonPointer,
        handler: H,
    ) -> ClientResult<()>
    where
        H: Handler<Change> + 'static,
    {
        self.handle.register_for_changes(
            registration_id,
            Selector::thing(self.thing_id.clone()).under(attributes_root().join(path)),
            handler,
        )
    }

    pub fn register_for_feature_changes<H>(
        &self,
        registration_id: &str,
        feature_id: &str,
        handler: H,
    ) -> ClientResult<()>
    where
        H: Handler<Change> + 'static,
    {
        let path = feature_path(feature_id)?;
        self.handle.register_for_changes(
            registration_id,
            Selector::thing(self.thing_id.clone()).under(path),
            handler,
        )
    }
}

// --- Live channel ---

/// The live channel: everything a `ChannelHandle` does, plus messages.
#[derive(Clone)]
pub struct LiveHandle {
    handle: ChannelHandle,
}

impl LiveHandle {
    pub(crate) fn new(core: Arc<ClientCore>) -> Self {
        Self {
            handle: ChannelHandle::new(Channel::Live, core),
        }
    }

    pub fn message(&self, thing_id: ThingId, subject: impl Into<String>) -> MessageBuilder {
        MessageBuilder {
            handle: self.handle.clone(),
            thing_id,
            subject: subject.into(),
            feature_id: None,
            payload: None,
            options: Vec::new(),
        }
    }

    pub fn register_for_messages<H>(
        &self,
        registration_id: &str,
        filter: MessageFilter,
        handler: H,
    ) -> ClientResult<()>
    where
        H: Handler<LiveMessage> + 'static,
    {
        self.handle
            .core
            .dispatcher
            .registrations(Channel::Live)
            .messages
            .add(registration_id, filter, Arc::new(handler))
    }
}

impl Deref for LiveHandle {
    type Target = ChannelHandle;

    fn deref(&self) -> &ChannelHandle {
        &self.handle
    }
}

/// A live message to a thing (or one of its features).
pub struct MessageBuilder {
    handle: ChannelHandle,
    thing_id: ThingId,
    subject: String,
    feature_id: Option<String>,
    payload: Option<Value>,
    options: Vec<ModifyOption>,
}

impl MessageBuilder {
    pub fn payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn feature(mut self, feature_id: impl Into<String>) -> Self {
        self.feature_id = Some(feature_id.into());
        self
    }

    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.options.push(ModifyOption::timeout(timeout));
        self
    }

    fn envelope(&self) -> ClientResult<CommandEnvelope> {
        if self.subject.trim().is_empty() || self.subject.contains('/') {
            return Err(ClientError::InvalidArgument(format!(
                "invalid message subject {:?}",
                self.subject
            )));
        }
        let base = match &self.feature_id {
            Some(feature_id) => feature_path(feature_id)?,
            None => JsonPointer::root(),
        };
        let path = base.push("inbox").push("messages").push(self.subject.as_str());

        let mut envelope = self
            .handle
            .envelope(CommandKind::SendMessage, self.thing_id.clone())
            .with_message_subject(self.subject.as_str())
            .with_path(path);
        envelope.value = self.payload.clone();
        Ok(envelope)
    }

    /// Send without waiting for an answer. Resolves once handed to the
    /// transport.
    pub fn send(mut self) -> CommandFuture<()> {
        self.options.push(ModifyOption::response_required(false));
        match self.envelope() {
            Ok(envelope) => self.handle.issue(envelope, &self.options, decode_unit),
            Err(e) => CommandFuture::failed(e),
        }
    }

    /// Send and resolve with the answer's payload.
    pub fn send_and_await(mut self) -> CommandFuture<Option<Value>> {
        self.options.push(ModifyOption::response_required(true));
        match self.envelope() {
            Ok(envelope) => self.handle.issue(envelope, &self.options, decode_payload),
            Err(e) => CommandFuture::failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_paths_are_rooted_under_attributes() {
        let path = attribute_path(&JsonPointer::parse("location/lat").unwrap()).unwrap();
        assert_eq!(path.to_string(), "/attributes/location/lat");
        assert!(attribute_path(&JsonPointer::root()).is_err());
    }

    #[test]
    fn feature_property_paths() {
        let path =
            feature_property_path("lamp", &JsonPointer::parse("/status/on").unwrap()).unwrap();
        assert_eq!(path.to_string(), "/features/lamp/properties/status/on");
        assert!(feature_property_path("lamp", &JsonPointer::root()).is_err());
        assert!(feature_path("").is_err());
        assert!(feature_path("a/b").is_err());
    }

    #[test]
    fn thing_id_is_required_in_json() {
        assert!(thing_id_of(&serde_json::json!({"attributes": {}})).is_err());
        assert_eq!(
            thing_id_of(&serde_json::json!({"thingId": "ns:x"}))
                .unwrap()
                .as_str(),
            "ns:x"
        );
    }
}
