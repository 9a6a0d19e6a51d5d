//! Builder for [`BridgeHandler`].
//!
//! Provides a fluent API for wiring the runtime, transports and message
//! factory of a handler.

use std::sync::Arc;
use std::time::Duration;

use syncbridge_core::{BridgeError, DefaultMessageFactory, MessageFactory, MessageTranslator};
use tokio::runtime::Handle;

use crate::cache::{ClientCache, TransportFactory};
use crate::handler::{BridgeHandler, Inner};
use crate::options::TransportOptionKey;
use crate::transport::{HyperTransport, Transport};

/// Builder for creating a [`BridgeHandler`].
///
/// # Example
///
/// ```ignore
/// use syncbridge_client::BridgeHandler;
///
/// let handler = BridgeHandler::builder()
///     .runtime(runtime.handle().clone())
///     .pull_timeout(Duration::from_secs(30))
///     .build()?;
/// ```
#[derive(Default)]
pub struct BridgeHandlerBuilder {
    /// Runtime the call tasks are spawned on.
    runtime: Option<Handle>,
    /// Transport for calls that need no dedicated connection settings.
    transport: Option<Arc<dyn Transport>>,
    /// Builds dedicated transports for the client cache.
    transport_factory: Option<TransportFactory>,
    /// Creates the external messages handed back to callers.
    message_factory: Option<Arc<dyn MessageFactory>>,
    /// Per-pull timeout of streamed response bodies.
    pull_timeout: Option<Duration>,
}

impl std::fmt::Debug for BridgeHandlerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHandlerBuilder")
            .field("runtime", &self.runtime.is_some())
            .field("transport", &self.transport.is_some())
            .field("transport_factory", &self.transport_factory.is_some())
            .field("message_factory", &self.message_factory.is_some())
            .field("pull_timeout", &self.pull_timeout)
            .finish()
    }
}

impl BridgeHandlerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn call tasks on this runtime.
    ///
    /// Defaults to the runtime current at [`build`](Self::build) time.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Use `transport` for calls without dedicated connection settings.
    ///
    /// Default: a [`HyperTransport`] with default settings.
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Build dedicated transports with `factory`.
    ///
    /// Default: [`HyperTransport::from_key`].
    pub fn transport_factory<F, T>(mut self, factory: F) -> Self
    where
        F: Fn(&TransportOptionKey) -> Result<T, BridgeError> + Send + Sync + 'static,
        T: Transport + 'static,
    {
        self.transport_factory = Some(Arc::new(move |key: &TransportOptionKey| {
            factory(key).map(|transport| Arc::new(transport) as Arc<dyn Transport>)
        }));
        self
    }

    /// Create external messages with `factory`.
    pub fn message_factory<F: MessageFactory + 'static>(mut self, factory: F) -> Self {
        self.message_factory = Some(Arc::new(factory));
        self
    }

    /// Per-pull timeout for streamed response bodies.
    ///
    /// Default: 5 seconds.
    pub fn pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = Some(timeout);
        self
    }

    /// Build the handler.
    ///
    /// Fails without an explicit runtime when not called from inside one, or
    /// when the default transport cannot be built.
    pub fn build(self) -> Result<BridgeHandler, BridgeError> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| {
                BridgeError::InvalidConfiguration(format!("no tokio runtime available: {e}"))
            })?,
        };

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new()?),
        };

        let transport_factory: TransportFactory = self.transport_factory.unwrap_or_else(|| {
            Arc::new(|key: &TransportOptionKey| {
                HyperTransport::from_key(key).map(|transport| Arc::new(transport) as Arc<dyn Transport>)
            })
        });

        let message_factory: Arc<dyn MessageFactory> = self
            .message_factory
            .unwrap_or_else(|| Arc::new(DefaultMessageFactory::default()));
        let mut translator = MessageTranslator::new(message_factory);
        if let Some(timeout) = self.pull_timeout {
            translator = translator.with_pull_timeout(timeout);
        }

        Ok(BridgeHandler::from_inner(Inner {
            translator,
            cache: ClientCache::new(transport, transport_factory),
            runtime,
        }))
    }
}
