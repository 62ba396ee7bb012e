//! Response correlation: one pending slot per outgoing command, resolved at
//! most once by a response, a remote error, a timeout or shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use twinlink_signals::{CorrelationId, Signal, ThingId};

use crate::error::{ClientError, ClientResult};
use crate::future::{CommandFuture, Outcome};

/// A command waiting for its response. Owned by the correlator until it
/// resolves or expires.
pub struct PendingCommand {
    pub correlation_id: CorrelationId,
    pub thing_id: ThingId,
    pub expected_subjects: Vec<String>,
    pub created_at: DateTime<Utc>,
    slot: oneshot::Sender<Outcome>,
    watchdog: Option<AbortHandle>,
}

impl PendingCommand {
    fn complete(self, outcome: Outcome) {
        if let Some(watchdog) = &self.watchdog {
            watchdog.abort();
        }
        if self.slot.send(outcome).is_err() {
            debug!(
                correlation_id = %self.correlation_id,
                "Caller abandoned command before it resolved"
            );
        }
    }
}

#[derive(Clone)]
pub struct ResponseCorrelator {
    inner: Arc<Inner>,
}

struct Inner {
    pending: DashMap<CorrelationId, PendingCommand>,
    runtime: Handle,
    closed: AtomicBool,
}

impl ResponseCorrelator {
    pub fn new(runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: DashMap::new(),
                runtime,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a pending entry and return the future it will resolve.
    ///
    /// With a `timeout`, a watchdog fails the entry with `CommandTimeout`
    /// if nothing arrives in time. Fails with `ClientClosed` once
    /// [`close`](Self::close) has run.
    pub fn register(
        &self,
        correlation_id: CorrelationId,
        thing_id: ThingId,
        expected_subjects: Vec<String>,
        timeout: Option<Duration>,
    ) -> ClientResult<CommandFuture> {
        if self.is_closed() {
            return Err(ClientError::ClientClosed);
        }
        let (tx, rx) = oneshot::channel();

        match self.inner.pending.entry(correlation_id.clone()) {
            Entry::Occupied(_) => {
                warn!(correlation_id = %correlation_id, "Correlation id collision");
                return Err(ClientError::DuplicateCorrelationId(correlation_id));
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingCommand {
                    correlation_id: correlation_id.clone(),
                    thing_id,
                    expected_subjects,
                    created_at: Utc::now(),
                    slot: tx,
                    watchdog: None,
                });
            }
        }

        // A close that ran between the check above and the insert has
        // already drained the map; this entry must not outlive it.
        if self.is_closed() {
            self.fail(&correlation_id, ClientError::ClientClosed);
            return Err(ClientError::ClientClosed);
        }

        if let Some(timeout) = timeout {
            self.arm_watchdog(correlation_id, timeout);
        }

        Ok(CommandFuture::waiting(rx))
    }

    fn arm_watchdog(&self, correlation_id: CorrelationId, timeout: Duration) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let id = correlation_id.clone();
        let task = self.inner.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                ResponseCorrelator { inner }.expire(&id, timeout);
            }
        });

        // The entry may already be gone if a response raced the spawn; the
        // watchdog then finds nothing and exits.
        match self.inner.pending.get_mut(&correlation_id) {
            Some(mut entry) => entry.watchdog = Some(task.abort_handle()),
            None => task.abort(),
        }
    }

    /// Resolve the entry a reply signal belongs to.
    ///
    /// Returns false when the signal is not a reply, has no correlation id,
    /// or matches nothing pending (late, duplicate or unknown). Such
    /// signals are dropped without touching any future.
    pub fn resolve(&self, signal: Signal) -> bool {
        let reply = match signal {
            Signal::Response(response) => Ok(response),
            Signal::Error(error) => Err(error),
            _ => return false,
        };

        let correlation_id = match &reply {
            Ok(response) => response.correlation_id.clone(),
            Err(error) => error.correlation_id.clone(),
        };
        let Some(correlation_id) = correlation_id else {
            warn!("Reply without correlation id dropped");
            return false;
        };

        let Some((_, pending)) = self.inner.pending.remove(&correlation_id) else {
            debug!(
                correlation_id = %correlation_id,
                "No pending command for reply; dropping"
            );
            return false;
        };

        let outcome = match reply {
            Ok(response) => {
                if !pending.expected_subjects.contains(&response.subject) {
                    warn!(
                        correlation_id = %correlation_id,
                        subject = %response.subject,
                        expected = ?pending.expected_subjects,
                        "Response subject differs from expected; resolving by correlation id"
                    );
                }
                debug!(
                    correlation_id = %correlation_id,
                    thing_id = %pending.thing_id,
                    status = response.status,
                    "Command resolved"
                );
                Ok(response)
            }
            Err(error) => {
                debug!(
                    correlation_id = %correlation_id,
                    thing_id = %pending.thing_id,
                    status = error.status,
                    error = %error.error,
                    "Command failed remotely"
                );
                Err(ClientError::from(error))
            }
        };

        pending.complete(outcome);
        true
    }

    /// Fail an entry with `CommandTimeout`. No-op if it already resolved.
    pub fn expire(&self, correlation_id: &CorrelationId, after: Duration) -> bool {
        match self.inner.pending.remove(correlation_id) {
            Some((_, pending)) => {
                warn!(
                    correlation_id = %correlation_id,
                    thing_id = %pending.thing_id,
                    timeout_ms = after.as_millis() as u64,
                    "Command timed out"
                );
                pending.complete(Err(ClientError::CommandTimeout(after)));
                true
            }
            None => false,
        }
    }

    /// Fail an entry with an arbitrary error, e.g. when the transport
    /// rejected the send after registration.
    pub fn fail(&self, correlation_id: &CorrelationId, error: ClientError) -> bool {
        match self.inner.pending.remove(correlation_id) {
            Some((_, pending)) => {
                pending.complete(Err(error));
                true
            }
            None => false,
        }
    }

    /// Fail every pending entry. Returns how many were failed.
    pub fn fail_all(&self, error: ClientError) -> usize {
        let ids: Vec<CorrelationId> = self
            .inner
            .pending
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        ids.iter()
            .filter(|id| self.fail(id, error.clone()))
            .count()
    }

    /// Refuse further registrations and fail everything pending with
    /// `ClientClosed`. Returns how many were failed.
    pub fn close(&self) -> usize {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.fail_all(ClientError::ClientClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.inner.pending.contains_key(correlation_id)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinlink_signals::{Channel, InboundMessage};

    fn thing() -> ThingId {
        ThingId::parse("ns:thing").unwrap()
    }

    fn expected() -> Vec<String> {
        vec!["things.responses:modifyAttribute".to_string()]
    }

    fn reply(id: &CorrelationId, subject: &str) -> Signal {
        Signal::decode(
            InboundMessage::new(subject, Channel::Twin, thing())
                .with_correlation_id(id.clone())
                .with_status(204),
        )
    }

    #[tokio::test]
    async fn first_reply_resolves_and_later_ones_are_dropped() {
        let correlator = ResponseCorrelator::new(Handle::current());
        let id = CorrelationId::generate();
        let fut = correlator
            .register(id.clone(), thing(), expected(), None)
            .unwrap();

        assert!(correlator.resolve(reply(&id, "things.responses:modifyAttribute")));
        assert!(!correlator.resolve(reply(&id, "things.responses:modifyAttribute")));
        assert_eq!(correlator.pending_count(), 0);
        assert_eq!(fut.await.unwrap().status, 204);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let correlator = ResponseCorrelator::new(Handle::current());
        let id = CorrelationId::from_raw("fixed");
        let _first = correlator
            .register(id.clone(), thing(), expected(), None)
            .unwrap();

        let err = correlator
            .register(id.clone(), thing(), expected(), None)
            .err()
            .unwrap();
        assert_eq!(err, ClientError::DuplicateCorrelationId(id));
        assert_eq!(correlator.pending_count(), 1);
    }

    #[tokio::test]
    async fn unknown_correlation_id_is_ignored() {
        let correlator = ResponseCorrelator::new(Handle::current());
        let stray = CorrelationId::generate();
        assert!(!correlator.resolve(reply(&stray, "things.responses:modifyAttribute")));
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_expires_and_late_reply_is_dropped() {
        let correlator = ResponseCorrelator::new(Handle::current());
        let id = CorrelationId::generate();
        let fut = correlator
            .register(id.clone(), thing(), expected(), Some(Duration::from_millis(50)))
            .unwrap();

        let err = fut.await.unwrap_err();
        assert_eq!(err, ClientError::CommandTimeout(Duration::from_millis(50)));
        assert!(!correlator.is_pending(&id));
        assert!(!correlator.resolve(reply(&id, "things.responses:modifyAttribute")));
    }

    #[tokio::test]
    async fn abandoned_future_keeps_entry_until_resolution() {
        let correlator = ResponseCorrelator::new(Handle::current());
        let id = CorrelationId::generate();
        drop(correlator.register(id.clone(), thing(), expected(), None).unwrap());

        assert!(correlator.is_pending(&id));
        assert!(correlator.resolve(reply(&id, "things.responses:modifyAttribute")));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn fail_all_drains_every_entry() {
        let correlator = ResponseCorrelator::new(Handle::current());
        let a = correlator
            .register(CorrelationId::generate(), thing(), expected(), None)
            .unwrap();
        let b = correlator
            .register(CorrelationId::generate(), thing(), expected(), None)
            .unwrap();

        assert_eq!(correlator.fail_all(ClientError::ClientClosed), 2);
        assert_eq!(a.await.unwrap_err(), ClientError::ClientClosed);
        assert_eq!(b.await.unwrap_err(), ClientError::ClientClosed);
    }

    #[tokio::test]
    async fn close_fails_pending_and_refuses_new_entries() {
        let correlator = ResponseCorrelator::new(Handle::current());
        let pending = correlator
            .register(CorrelationId::generate(), thing(), expected(), None)
            .unwrap();

        assert_eq!(correlator.close(), 1);
        assert_eq!(pending.await.unwrap_err(), ClientError::ClientClosed);

        let err = correlator
            .register(CorrelationId::generate(), thing(), expected(), None)
            .err()
            .unwrap();
        assert_eq!(err, ClientError::ClientClosed);
        assert_eq!(correlator.pending_count(), 0);
        assert_eq!(correlator.close(), 0);
    }
}
