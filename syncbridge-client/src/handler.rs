//! The bridge handler: one cancellable task per external call.
//!
//! ```ignore
//! let handler = BridgeHandler::builder().runtime(runtime.handle().clone()).build()?;
//!
//! let call = handler.invoke(request, RequestOptions::new().timeout(Duration::from_secs(5)));
//! let response = call.wait()?;
//! ```

use std::sync::Arc;

use syncbridge_core::{
    BridgeError, CancelObserver, CancelToken, ExternalRequest, ExternalResponse, MessageFactory,
    MessageTranslator,
};
use tokio::runtime::Handle;
#[cfg(feature = "tracing")]
use tracing::Instrument;

use crate::builder::BridgeHandlerBuilder;
use crate::cache::ClientCache;
use crate::options::RequestOptions;
use crate::response::{CallState, ResponseHandle};
use crate::sink::tee_to_file;

/// Runs external calls on a tokio runtime through a cached set of transports.
///
/// Cloning is cheap; clones share the transport cache.
#[derive(Clone)]
pub struct BridgeHandler {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) translator: MessageTranslator<Arc<dyn MessageFactory>>,
    pub(crate) cache: ClientCache,
    pub(crate) runtime: Handle,
}

impl std::fmt::Debug for BridgeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHandler")
            .field("cache", &self.inner.cache)
            .finish_non_exhaustive()
    }
}

impl BridgeHandler {
    /// Create a new handler builder.
    pub fn builder() -> BridgeHandlerBuilder {
        BridgeHandlerBuilder::new()
    }

    /// Create a handler with default settings on the current runtime.
    pub fn new() -> Result<Self, BridgeError> {
        Self::builder().build()
    }

    pub(crate) fn from_inner(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Start `request` on a new task and return a handle to its outcome.
    ///
    /// Returns immediately; nothing is sent before the task runs.
    pub fn invoke(&self, request: ExternalRequest, options: RequestOptions) -> ResponseHandle {
        let token = CancelToken::new();
        let state = Arc::new(CallState::new());
        #[cfg(feature = "tracing")]
        let span = tracing::info_span!(
            "bridge.call",
            method = %request.method(),
            uri = %request.uri(),
        );

        let inner = self.inner.clone();
        let task_state = state.clone();
        let cancel = token.observer();
        let call = async move {
            if !task_state.start() {
                #[cfg(feature = "tracing")]
                tracing::debug!("call cancelled before start");
                return;
            }
            let outcome = inner.execute(request, options, cancel).await;
            #[cfg(feature = "tracing")]
            if let Err(err) = &outcome {
                tracing::debug!(error = %err, "call failed");
            }
            task_state.settle(outcome);
        };
        #[cfg(feature = "tracing")]
        let call = call.instrument(span);
        self.inner.runtime.spawn(call);

        ResponseHandle::new(state, token, self.inner.runtime.clone())
    }

    /// Number of dedicated transports built so far.
    pub fn cached_transports(&self) -> usize {
        self.inner.cache.len()
    }
}

impl Inner {
    async fn execute(
        &self,
        request: ExternalRequest,
        options: RequestOptions,
        cancel: CancelObserver,
    ) -> Result<ExternalResponse, BridgeError> {
        if let Some(delay) = options.get_delay()? {
            #[cfg(feature = "tracing")]
            tracing::debug!(?delay, "delaying request");
            cancel
                .guard(async {
                    tokio::time::sleep(delay).await;
                    Ok(())
                })
                .await?;
        }

        let mut internal = self.translator.to_internal(&request);
        if let Some(timeout) = options.get_timeout()? {
            internal.set_transfer_timeout(Some(timeout));
            internal.set_inactivity_timeout(Some(timeout));
        }
        if let Some(timeout) = options.get_connect_timeout()? {
            internal.set_connect_timeout(Some(timeout));
        }

        let key = options.transport_key()?;
        let transport = self.cache.resolve(key.as_ref())?;

        if let Some(versions) = options.get_protocols()? {
            internal.set_protocol_versions(versions)?;
        }

        let mut response = transport.request(internal, cancel.clone()).await?;
        #[cfg(feature = "tracing")]
        tracing::debug!(status = %response.status(), "transport responded");

        if let Some(path) = options.get_sink() {
            let path = path.to_path_buf();
            response = response.map_body(|body| tee_to_file(body, path));
        }

        if options.is_stream() {
            Ok(self
                .translator
                .to_external_streaming(response, self.runtime.clone(), cancel))
        } else {
            self.translator.to_external(response, &cancel).await
        }
    }
}
