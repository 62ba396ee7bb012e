//! Outgoing commands: option validation, header building, correlation and
//! the hand-off to the transport.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use twinlink_signals::headers::{
    ANY_ETAG, CORRELATION_ID, IF_MATCH, IF_NONE_MATCH, RESPONSE_REQUIRED, TIMEOUT,
};
use twinlink_signals::{
    copy_policy_placeholder, CommandEnvelope, CommandResponse, CorrelationId,
    ModifyOption, PolicyId, Semantics, ThingId,
};

use crate::config::ClientConfig;
use crate::correlator::ResponseCorrelator;
use crate::error::{ClientError, ClientResult};
use crate::future::{CommandFuture, Decoder};
use crate::transport::Transport;

/// Payload key the backend reads the policy to copy from.
pub const COPY_POLICY_FROM: &str = "_copyPolicyFrom";
/// Payload key of an inline policy created with the thing.
pub const INLINE_POLICY: &str = "_policy";

/// Status of the synthetic response for commands sent without
/// `response-required`.
const ACCEPTED: u16 = 202;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PolicySource {
    Policy(PolicyId),
    Thing(ThingId),
}

impl PolicySource {
    fn wire_value(&self) -> String {
        match self {
            PolicySource::Policy(id) => id.to_string(),
            PolicySource::Thing(id) => copy_policy_placeholder(id),
        }
    }
}

/// The options of one call, after conflict checks.
#[derive(Debug, Default)]
struct ResolvedOptions {
    exists: Option<bool>,
    copy_from: Option<PolicySource>,
    response_required: Option<bool>,
    timeout: Option<Duration>,
}

impl ResolvedOptions {
    fn resolve(envelope: &CommandEnvelope, options: &[ModifyOption]) -> ClientResult<Self> {
        let mut resolved = Self::default();

        for option in options {
            match option {
                ModifyOption::Exists(wanted) => {
                    if envelope.semantics != Semantics::Upsert {
                        return Err(ClientError::InvalidOptionCombination(format!(
                            "{option} is only valid for put commands, not {}",
                            envelope.kind.name()
                        )));
                    }
                    merge(&mut resolved.exists, *wanted, "exists(true) and exists(false)")?;
                }
                ModifyOption::CopyPolicy(id) => {
                    resolved.set_copy(envelope, PolicySource::Policy(id.clone()))?
                }
                ModifyOption::CopyPolicyFromThing(id) => {
                    resolved.set_copy(envelope, PolicySource::Thing(id.clone()))?
                }
                ModifyOption::ResponseRequired(required) => merge(
                    &mut resolved.response_required,
                    *required,
                    "responseRequired(true) and responseRequired(false)",
                )?,
                ModifyOption::Timeout(timeout) => {
                    if timeout.is_zero() {
                        return Err(ClientError::InvalidArgument(
                            "timeout must be positive".into(),
                        ));
                    }
                    merge(&mut resolved.timeout, *timeout, "two different timeouts")?;
                }
            }
        }

        let inline_policy = envelope
            .value
            .as_ref()
            .filter(|_| envelope.kind.is_whole_thing())
            .and_then(|v| v.get(INLINE_POLICY));
        if let Some(policy) = inline_policy {
            if !policy.is_object() {
                return Err(ClientError::InvalidArgument(
                    "inline policy must be a JSON object".into(),
                ));
            }
            if resolved.copy_from.is_some() {
                return Err(ClientError::InvalidOptionCombination(
                    "an inline policy cannot be combined with a policy copy option".into(),
                ));
            }
        }

        if envelope.semantics == Semantics::Retrieve && resolved.response_required == Some(false) {
            return Err(ClientError::InvalidOptionCombination(
                "a retrieve without a response has no result".into(),
            ));
        }

        Ok(resolved)
    }

    fn set_copy(&mut self, envelope: &CommandEnvelope, source: PolicySource) -> ClientResult<()> {
        let whole_thing_write = envelope.kind.is_whole_thing()
            && matches!(envelope.semantics, Semantics::Create | Semantics::Upsert);
        if !whole_thing_write {
            return Err(ClientError::InvalidOptionCombination(format!(
                "policy copy options are only valid when creating or putting a thing, not {}",
                envelope.kind.name()
            )));
        }
        merge(
            &mut self.copy_from,
            source,
            "copyPolicy and copyPolicyFromThing",
        )
    }
}

/// Record `value` in `slot`. Repeating the same value is tolerated; a
/// different one is a conflict.
fn merge<T: PartialEq>(slot: &mut Option<T>, value: T, conflict: &str) -> ClientResult<()> {
    match slot {
        Some(existing) if *existing != value => Err(ClientError::InvalidOptionCombination(
            format!("{conflict} are mutually exclusive"),
        )),
        _ => {
            *slot = Some(value);
            Ok(())
        }
    }
}

pub struct CommandGateway {
    transport: Arc<dyn Transport>,
    correlator: ResponseCorrelator,
    config: ClientConfig,
}

impl CommandGateway {
    pub fn new(
        transport: Arc<dyn Transport>,
        correlator: ResponseCorrelator,
        config: ClientConfig,
    ) -> Self {
        Self {
            transport,
            correlator,
            config,
        }
    }

    /// Validate, correlate and send one command.
    ///
    /// Never fails synchronously: invalid input comes back as an
    /// already-failed future and nothing reaches the transport.
    pub fn send<T>(
        &self,
        envelope: CommandEnvelope,
        options: &[ModifyOption],
        decode: Decoder<T>,
    ) -> CommandFuture<T> {
        match self.try_send(envelope, options) {
            Ok(future) => future.decode_with(decode),
            Err(e) => {
                debug!(error = %e, "Command rejected before dispatch");
                CommandFuture::failed(e)
            }
        }
    }

    fn try_send(
        &self,
        mut envelope: CommandEnvelope,
        options: &[ModifyOption],
    ) -> ClientResult<CommandFuture> {
        let resolved = ResolvedOptions::resolve(&envelope, options)?;

        if let Some(source) = &resolved.copy_from {
            match envelope.value.as_mut().and_then(Value::as_object_mut) {
                Some(payload) => {
                    payload.insert(COPY_POLICY_FROM.into(), Value::String(source.wire_value()));
                }
                None => {
                    return Err(ClientError::InvalidArgument(
                        "policy copy requires a thing payload".into(),
                    ))
                }
            }
        }

        match (resolved.exists, envelope.semantics) {
            (Some(true), _) | (None, Semantics::Update) => {
                envelope.headers.insert(IF_MATCH, ANY_ETAG);
            }
            (Some(false), _) => {
                envelope.headers.insert(IF_NONE_MATCH, ANY_ETAG);
            }
            _ => {}
        }

        let response_required = resolved
            .response_required
            .unwrap_or(self.config.response_required_default)
            || envelope.semantics == Semantics::Retrieve;
        envelope
            .headers
            .insert(RESPONSE_REQUIRED, response_required.to_string());

        if let Some(timeout) = resolved.timeout {
            envelope
                .headers
                .insert(TIMEOUT, format!("{}ms", timeout.as_millis()));
        }

        let correlation_id = envelope
            .correlation_id()
            .unwrap_or_else(CorrelationId::generate);
        envelope
            .headers
            .insert(CORRELATION_ID, correlation_id.as_str());

        if !response_required {
            return self.send_unacknowledged(envelope, correlation_id);
        }

        let timeout = resolved.timeout.unwrap_or(self.config.default_timeout);
        let future = self.correlator.register(
            correlation_id.clone(),
            envelope.thing_id.clone(),
            vec![envelope.response_subject()],
            Some(timeout),
        )?;

        let (kind, thing_id) = (envelope.kind, envelope.thing_id.clone());
        match self.transport.send(envelope) {
            Ok(()) => {
                debug!(
                    correlation_id = %correlation_id,
                    thing_id = %thing_id,
                    command = kind.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Command sent"
                );
            }
            Err(e) => {
                debug!(correlation_id = %correlation_id, error = %e, "Send failed");
                self.correlator.fail(&correlation_id, e.into());
            }
        }

        Ok(future)
    }

    fn send_unacknowledged(
        &self,
        envelope: CommandEnvelope,
        correlation_id: CorrelationId,
    ) -> ClientResult<CommandFuture> {
        let response = CommandResponse {
            correlation_id: Some(correlation_id.clone()),
            subject: envelope.response_subject(),
            thing_id: envelope.thing_id.clone(),
            status: ACCEPTED,
            path: envelope.path.clone(),
            payload: None,
            headers: envelope.headers.clone(),
        };
        let kind = envelope.kind;

        self.transport.send(envelope)?;
        debug!(
            correlation_id = %correlation_id,
            thing_id = %response.thing_id,
            command = kind.name(),
            "Command sent without response"
        );
        Ok(CommandFuture::ready(Ok(response)))
    }

    pub fn correlator(&self) -> &ResponseCorrelator {
        &self.correlator
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
