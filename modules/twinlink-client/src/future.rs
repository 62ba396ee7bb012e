//! The caller-facing half of a pending command.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use twinlink_signals::{CommandResponse, Thing};

use crate::error::{ClientError, ClientResult};

pub(crate) type Outcome = ClientResult<CommandResponse>;

/// Turns a successful response into the value the API method promises.
pub type Decoder<T> = fn(CommandResponse) -> ClientResult<T>;

/// Resolves once with the command's outcome.
///
/// Dropping it abandons interest only: the pending entry in the correlator
/// stays until its response arrives or it times out.
#[must_use = "a command future does nothing to the command when dropped, but its outcome is lost"]
pub struct CommandFuture<T = CommandResponse> {
    state: State,
    decode: Decoder<T>,
}

enum State {
    Waiting(oneshot::Receiver<Outcome>),
    Ready(Option<Outcome>),
}

impl CommandFuture<CommandResponse> {
    pub(crate) fn waiting(rx: oneshot::Receiver<Outcome>) -> Self {
        Self {
            state: State::Waiting(rx),
            decode: Ok,
        }
    }

    pub(crate) fn ready(outcome: Outcome) -> Self {
        Self {
            state: State::Ready(Some(outcome)),
            decode: Ok,
        }
    }

    /// Swap the decoder. Only raw response futures can be re-decoded.
    pub fn decode_with<U>(self, decode: Decoder<U>) -> CommandFuture<U> {
        CommandFuture {
            state: self.state,
            decode,
        }
    }
}

impl<T> CommandFuture<T> {
    /// An already-failed future. Used for validation errors so every async
    /// API reports failure the same way.
    pub fn failed(error: ClientError) -> Self {
        Self {
            state: State::Ready(Some(Err(error))),
            decode: |_| Err(ClientError::Decode("no response expected".into())),
        }
    }

    /// True if the outcome is already known without polling the channel.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(Some(_)))
    }
}

impl<T> Future for CommandFuture<T> {
    type Output = ClientResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let outcome = match &mut this.state {
            State::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Ok(outcome)) => outcome,
                // Sender dropped without resolving: the client went away.
                Poll::Ready(Err(_)) => Err(ClientError::ClientClosed),
            },
            State::Ready(slot) => slot.take().unwrap_or(Err(ClientError::ClientClosed)),
        };
        this.state = State::Ready(None);
        Poll::Ready(outcome.and_then(this.decode))
    }
}

// --- Decoders ---

pub fn decode_unit(_: CommandResponse) -> ClientResult<()> {
    Ok(())
}

pub fn decode_thing(response: CommandResponse) -> ClientResult<Thing> {
    let payload = response
        .payload
        .ok_or_else(|| ClientError::Decode(format!("{} carried no thing", response.subject)))?;
    Thing::from_json(&payload).map_err(|e| ClientError::Decode(e.to_string()))
}

/// A thing when the response carries one (201 Created), nothing otherwise.
pub fn decode_optional_thing(response: CommandResponse) -> ClientResult<Option<Thing>> {
    match &response.payload {
        Some(payload) if payload.is_object() => Thing::from_json(payload)
            .map(Some)
            .map_err(|e| ClientError::Decode(e.to_string())),
        _ => Ok(None),
    }
}

pub fn decode_payload(response: CommandResponse) -> ClientResult<Option<serde_json::Value>> {
    Ok(response.payload)
}
