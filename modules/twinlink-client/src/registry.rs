//! Registration table: named, caller-controlled subscriptions.
//!
//! Each registration owns a queue and a worker task. The dispatcher only
//! enqueues, so a slow or failing handler never holds up the inbound path or
//! other registrations, and each handler sees its items in arrival order.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use twinlink_signals::Channel;

use crate::error::{ClientError, ClientResult};
use crate::selector::Selects;

/// Namespaces for registration ids. Ids only collide within one category
/// of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationCategory {
    Changes,
    Messages,
}

impl RegistrationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationCategory::Changes => "changes",
            RegistrationCategory::Messages => "messages",
        }
    }
}

/// Receives notifications for one registration.
///
/// Returning an error (or panicking) is reported and isolated: the
/// registration stays active and other handlers are unaffected.
#[async_trait]
pub trait Handler<T: Send + 'static>: Send + Sync {
    async fn handle(&self, item: T) -> anyhow::Result<()>;
}

/// Adapter for plain closures.
pub struct FnHandler<F>(F);

impl<F> FnHandler<F> {
    pub fn new<T>(f: F) -> Self
    where
        F: Fn(T) -> anyhow::Result<()> + Send + Sync,
    {
        Self(f)
    }
}

#[async_trait]
impl<T, F> Handler<T> for FnHandler<F>
where
    T: Send + 'static,
    F: Fn(T) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, item: T) -> anyhow::Result<()> {
        (self.0)(item)
    }
}

pub struct Registration<T, S> {
    id: String,
    seq: u64,
    selector: S,
    active: Arc<AtomicBool>,
    queue: mpsc::UnboundedSender<T>,
}

impl<T, S> Registration<T, S> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn selector(&self) -> &S {
        &self.selector
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Enqueue for the worker. False once the registration was removed.
    fn deliver(&self, item: T) -> bool {
        self.is_active() && self.queue.send(item).is_ok()
    }
}

pub struct RegistrationTable<T, S> {
    channel: Channel,
    category: RegistrationCategory,
    entries: DashMap<String, Arc<Registration<T, S>>>,
    next_seq: AtomicU64,
    runtime: Handle,
}

impl<T, S> RegistrationTable<T, S>
where
    T: Clone + Send + 'static,
    S: Selects<T> + 'static,
{
    pub fn new(channel: Channel, category: RegistrationCategory, runtime: Handle) -> Self {
        Self {
            channel,
            category,
            entries: DashMap::new(),
            next_seq: AtomicU64::new(0),
            runtime,
        }
    }

    pub fn add(
        &self,
        registration_id: impl Into<String>,
        selector: S,
        handler: Arc<dyn Handler<T>>,
    ) -> ClientResult<()> {
        let id = registration_id.into();
        if id.trim().is_empty() {
            return Err(ClientError::InvalidArgument(
                "registration id must not be empty".into(),
            ));
        }

        match self.entries.entry(id.clone()) {
            Entry::Occupied(_) => Err(ClientError::DuplicateRegistrationId(id)),
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let active = Arc::new(AtomicBool::new(true));
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

                slot.insert(Arc::new(Registration {
                    id: id.clone(),
                    seq,
                    selector,
                    active: active.clone(),
                    queue: tx,
                }));

                self.runtime.spawn(run_worker(
                    id.clone(),
                    self.channel,
                    self.category,
                    rx,
                    active,
                    handler,
                ));

                info!(
                    registration_id = %id,
                    channel = %self.channel,
                    category = self.category.as_str(),
                    "Handler registered"
                );
                Ok(())
            }
        }
    }

    /// Remove a registration. Once this returns, its handler is not invoked
    /// again, apart from an invocation already running. Idempotent.
    pub fn remove(&self, registration_id: &str) -> bool {
        match self.entries.remove(registration_id) {
            Some((_, registration)) => {
                registration.active.store(false, Ordering::Release);
                info!(
                    registration_id = %registration_id,
                    channel = %self.channel,
                    category = self.category.as_str(),
                    "Handler deregistered"
                );
                true
            }
            None => false,
        }
    }

    /// Active registrations whose selector accepts `item`, in insertion
    /// order.
    pub fn matching(&self, item: &T) -> Vec<Arc<Registration<T, S>>> {
        let mut matches: Vec<Arc<Registration<T, S>>> = self
            .entries
            .iter()
            .filter(|entry| entry.is_active() && entry.selector.selects(item))
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by_key(|r| r.seq);
        matches
    }

    /// Hand `item` to every matching registration. Returns how many
    /// accepted it.
    pub fn dispatch(&self, item: &T) -> usize {
        self.matching(item)
            .into_iter()
            .filter(|registration| registration.deliver(item.clone()))
            .count()
    }

    pub fn contains(&self, registration_id: &str) -> bool {
        self.entries.contains_key(registration_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deactivate and drop every registration.
    pub fn clear(&self) {
        for entry in self.entries.iter() {
            entry.active.store(false, Ordering::Release);
        }
        self.entries.clear();
    }
}

async fn run_worker<T: Send + 'static>(
    id: String,
    channel: Channel,
    category: RegistrationCategory,
    mut rx: mpsc::UnboundedReceiver<T>,
    active: Arc<AtomicBool>,
    handler: Arc<dyn Handler<T>>,
) {
    while let Some(item) = rx.recv().await {
        if !active.load(Ordering::Acquire) {
            break;
        }

        match AssertUnwindSafe(handler.handle(item)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                registration_id = %id,
                channel = %channel,
                category = category.as_str(),
                error = %e,
                "Handler failed"
            ),
            Err(panic) => warn!(
                registration_id = %id,
                channel = %channel,
                category = category.as_str(),
                panic = %panic_message(panic.as_ref()),
                "Handler panicked"
            ),
        }
    }
    debug!(registration_id = %id, channel = %channel, "Registration worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
