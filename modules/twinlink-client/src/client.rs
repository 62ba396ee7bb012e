use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::{Stream, StreamExt};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, info};
use twinlink_signals::{Channel, CommandEnvelope, InboundMessage, ModifyOption};

use crate::config::ClientConfig;
use crate::consumption::ConsumptionController;
use crate::correlator::ResponseCorrelator;
use crate::dispatcher::EventDispatcher;
use crate::error::{ClientError, ClientResult};
use crate::future::{CommandFuture, Decoder};
use crate::gateway::CommandGateway;
use crate::handle::{ChannelHandle, LiveHandle};
use crate::transport::Transport;

/// State shared by the client and every handle derived from it.
pub(crate) struct ClientCore {
    pub(crate) gateway: CommandGateway,
    pub(crate) dispatcher: Arc<EventDispatcher>,
    pub(crate) runtime: Handle,
    config: ClientConfig,
    closed: AtomicBool,
    pumps: Mutex<Vec<AbortHandle>>,
}

impl ClientCore {
    pub(crate) fn issue<T>(
        &self,
        envelope: CommandEnvelope,
        options: &[ModifyOption],
        decode: Decoder<T>,
    ) -> CommandFuture<T> {
        if self.is_closed() {
            return CommandFuture::failed(ClientError::ClientClosed);
        }
        self.gateway.send(envelope, options, decode)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn shutdown(&self) -> usize {
        if self.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let pumps = std::mem::take(&mut *self.pumps.lock().unwrap_or_else(|e| e.into_inner()));
        for pump in pumps {
            pump.abort();
        }

        for channel in Channel::ALL {
            self.dispatcher.consumption().stop(channel);
        }
        self.dispatcher.clear();

        let failed = self.gateway.correlator().close();
        info!(
            label = %self.config.client_label,
            failed_commands = failed,
            "Client closed"
        );
        failed
    }
}

impl Drop for ClientCore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Entry point: one client per messaging session.
///
/// Cheap to clone. Dropping the last clone (and every handle) closes the
/// client.
#[derive(Clone)]
pub struct TwinClient {
    core: Arc<ClientCore>,
}

impl TwinClient {
    /// Wire a client to `transport`. Must be called inside a tokio runtime;
    /// the runtime is used for watchdogs, handler workers and stream pumps.
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> ClientResult<Self> {
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let correlator = ResponseCorrelator::new(runtime.clone());
        let consumption = Arc::new(ConsumptionController::new());
        let dispatcher = Arc::new(EventDispatcher::new(
            correlator.clone(),
            consumption,
            &runtime,
        ));
        transport.attach(dispatcher.clone());

        config.log_summary();
        let gateway = CommandGateway::new(transport, correlator, config.clone());

        Ok(Self {
            core: Arc::new(ClientCore {
                gateway,
                dispatcher,
                runtime,
                config,
                closed: AtomicBool::new(false),
                pumps: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn twin(&self) -> ChannelHandle {
        ChannelHandle::new(Channel::Twin, self.core.clone())
    }

    pub fn live(&self) -> LiveHandle {
        LiveHandle::new(self.core.clone())
    }

    /// Feed inbound messages from a stream-shaped transport. The pump runs
    /// until the stream ends or the client closes.
    pub fn consume<S>(&self, stream: S)
    where
        S: Stream<Item = InboundMessage> + Send + 'static,
    {
        let dispatcher = self.core.dispatcher.clone();
        let label = self.core.config.client_label.clone();
        let task = self.core.runtime.spawn(async move {
            let mut stream = Box::pin(stream);
            let mut received = 0u64;
            while let Some(message) = stream.next().await {
                dispatcher.dispatch(message);
                received += 1;
            }
            debug!(label = %label, received, "Inbound stream ended");
        });

        self.core
            .pumps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(task.abort_handle());
    }

    pub fn pending_commands(&self) -> usize {
        self.core.gateway.correlator().pending_count()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.core.config
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Fail every pending command with `ClientClosed`, drop all
    /// registrations and stop consumption. Later commands fail with
    /// `ClientClosed`. Returns how many pending commands were failed.
    pub fn close(&self) -> usize {
        self.core.shutdown()
    }
}
