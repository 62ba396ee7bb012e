//! Inbound routing. Every message is classified once, by subject, then sent
//! to the correlator (replies) or to the registrations of its channel
//! (events and live messages).

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, trace};
use twinlink_signals::{Change, Channel, InboundMessage, LiveMessage, Signal};

use crate::consumption::ConsumptionController;
use crate::correlator::ResponseCorrelator;
use crate::registry::{RegistrationCategory, RegistrationTable};
use crate::selector::{MessageFilter, Selector};
use crate::transport::InboundReceiver;

/// Registrations of one channel: changes and live messages are separate id
/// namespaces.
pub struct ChannelRegistrations {
    pub changes: RegistrationTable<Change, Selector>,
    pub messages: RegistrationTable<LiveMessage, MessageFilter>,
}

impl ChannelRegistrations {
    fn new(channel: Channel, runtime: &Handle) -> Self {
        Self {
            changes: RegistrationTable::new(
                channel,
                RegistrationCategory::Changes,
                runtime.clone(),
            ),
            messages: RegistrationTable::new(
                channel,
                RegistrationCategory::Messages,
                runtime.clone(),
            ),
        }
    }

    /// Remove `registration_id` from both categories.
    pub fn remove(&self, registration_id: &str) -> bool {
        let changes = self.changes.remove(registration_id);
        let messages = self.messages.remove(registration_id);
        changes || messages
    }

    fn clear(&self) {
        self.changes.clear();
        self.messages.clear();
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A reply; `resolved` is false if nothing was pending for it.
    Correlated { resolved: bool },
    /// Enqueued to this many registrations.
    Delivered(usize),
    /// Event or message on a channel that is not consuming.
    ConsumptionStopped,
    Ignored,
}

pub struct EventDispatcher {
    correlator: ResponseCorrelator,
    consumption: Arc<ConsumptionController>,
    twin: ChannelRegistrations,
    live: ChannelRegistrations,
}

impl EventDispatcher {
    pub fn new(
        correlator: ResponseCorrelator,
        consumption: Arc<ConsumptionController>,
        runtime: &Handle,
    ) -> Self {
        Self {
            correlator,
            consumption,
            twin: ChannelRegistrations::new(Channel::Twin, runtime),
            live: ChannelRegistrations::new(Channel::Live, runtime),
        }
    }

    pub fn registrations(&self, channel: Channel) -> &ChannelRegistrations {
        match channel {
            Channel::Twin => &self.twin,
            Channel::Live => &self.live,
        }
    }

    pub fn consumption(&self) -> &ConsumptionController {
        &self.consumption
    }

    pub fn dispatch(&self, message: InboundMessage) -> Disposition {
        let channel = message.channel;
        let signal = Signal::decode(message);
        trace!(channel = %channel, kind = signal.kind(), "Inbound signal");

        match signal {
            reply @ (Signal::Response(_) | Signal::Error(_)) => Disposition::Correlated {
                resolved: self.correlator.resolve(reply),
            },
            Signal::Event(change) => {
                if !self.consumption.is_started(channel) {
                    debug!(
                        channel = %channel,
                        thing_id = %change.thing_id,
                        revision = change.revision,
                        "Consumption stopped; dropping change"
                    );
                    return Disposition::ConsumptionStopped;
                }
                Disposition::Delivered(self.registrations(channel).changes.dispatch(&change))
            }
            Signal::Message(message) => {
                if !self.consumption.is_started(channel) {
                    debug!(
                        channel = %channel,
                        thing_id = %message.thing_id,
                        subject = %message.subject,
                        "Consumption stopped; dropping message"
                    );
                    return Disposition::ConsumptionStopped;
                }
                Disposition::Delivered(self.registrations(channel).messages.dispatch(&message))
            }
            Signal::Unknown { subject, thing_id } => {
                debug!(subject = %subject, thing_id = %thing_id, "Unrecognised subject ignored");
                Disposition::Ignored
            }
        }
    }

    /// Drop every registration on both channels.
    pub fn clear(&self) {
        self.twin.clear();
        self.live.clear();
    }
}

impl InboundReceiver for EventDispatcher {
    fn on_inbound(&self, message: InboundMessage) {
        self.dispatch(message);
    }
}
