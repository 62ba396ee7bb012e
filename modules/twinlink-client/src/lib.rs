//! Client runtime for digital-twin messaging.
//!
//! Turns a one-way transport ("send an envelope", "a message arrived") into
//! futures that resolve exactly once per command, plus a multi-consumer
//! change bus with named registrations and per-channel start/stop.

pub mod client;
pub mod config;
pub mod consumption;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod future;
pub mod gateway;
pub mod handle;
pub mod registry;
pub mod selector;
pub mod telemetry;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod transport;

pub use client::TwinClient;
pub use config::ClientConfig;
pub use consumption::{ConsumptionController, ConsumptionState};
pub use correlator::ResponseCorrelator;
pub use dispatcher::{Disposition, EventDispatcher};
pub use error::{ClientError, ClientResult};
pub use future::CommandFuture;
pub use gateway::CommandGateway;
pub use handle::{ChannelHandle, LiveHandle, MessageBuilder, ThingHandle};
pub use registry::{FnHandler, Handler, RegistrationCategory, RegistrationTable};
pub use selector::{MessageFilter, Selector, Selects};
pub use transport::{InboundReceiver, Transport, TransportError};
