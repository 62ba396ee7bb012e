use thiserror::Error;

/// Errors raised while parsing or validating wire vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("invalid thing id: {0:?} (expected namespace:name)")]
    InvalidThingId(String),

    #[error("invalid policy id: {0:?} (expected namespace:name)")]
    InvalidPolicyId(String),

    #[error("invalid JSON pointer: {0:?}")]
    InvalidPointer(String),

    #[error("invalid thing: {0}")]
    InvalidThing(String),

    #[error("unknown channel: {0:?}")]
    UnknownChannel(String),
}

pub type SignalResult<T> = std::result::Result<T, SignalError>;
