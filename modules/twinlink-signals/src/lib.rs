//! Wire vocabulary for the twinlink client.
//!
//! Ids, JSON pointers, the thin thing model, command envelopes, inbound
//! messages and the decoded `Signal` variant. No I/O and no runtime: the
//! client crate owns correlation and dispatch, this crate only names things.

pub mod change;
pub mod channel;
pub mod command;
pub mod error;
pub mod headers;
pub mod ids;
pub mod inbound;
pub mod options;
pub mod pointer;
pub mod thing;

pub use change::{Change, ChangeAction, LiveMessage, MessageDirection};
pub use channel::Channel;
pub use command::{CommandEnvelope, CommandKind, Semantics};
pub use error::{SignalError, SignalResult};
pub use headers::Headers;
pub use ids::{CorrelationId, PolicyId, ThingId};
pub use inbound::{CommandResponse, ErrorResponse, InboundMessage, Signal};
pub use options::{copy_policy_placeholder, ModifyOption};
pub use pointer::JsonPointer;
pub use thing::Thing;
