//! Typed errors for the command and registration paths.

use std::time::Duration;

use thiserror::Error;
use twinlink_signals::{CorrelationId, ErrorResponse, SignalError};

use crate::transport::TransportError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Malformed input to an API call. Nothing was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Mutually exclusive options supplied together. Nothing was sent.
    #[error("invalid option combination: {0}")]
    InvalidOptionCombination(String),

    #[error("registration id already in use: {0}")]
    DuplicateRegistrationId(String),

    /// Internal invariant violation: ids are generated per command.
    #[error("correlation id already pending: {0}")]
    DuplicateCorrelationId(CorrelationId),

    #[error("not connected")]
    NotConnected,

    #[error("remote operation failed ({status} {error}): {message}")]
    RemoteOperationFailed {
        status: u16,
        error: String,
        message: String,
        description: Option<String>,
    },

    #[error("no response within {}ms", .0.as_millis())]
    CommandTimeout(Duration),

    /// The client shut down before the command resolved.
    #[error("client closed")]
    ClientClosed,

    #[error("no tokio runtime available")]
    NoRuntime,

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::CommandTimeout(_))
    }
}

impl From<SignalError> for ClientError {
    fn from(err: SignalError) -> Self {
        ClientError::InvalidArgument(err.to_string())
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotConnected => ClientError::NotConnected,
            TransportError::Closed => ClientError::ClientClosed,
        }
    }
}

impl From<ErrorResponse> for ClientError {
    fn from(err: ErrorResponse) -> Self {
        ClientError::RemoteOperationFailed {
            status: err.status,
            error: err.error,
            message: err.message,
            description: err.description,
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
