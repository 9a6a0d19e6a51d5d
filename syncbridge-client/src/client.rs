//! Thin async client over a [`Transport`].

use std::sync::Arc;

use syncbridge_core::{
    BridgeError, CancelObserver, DefaultMessageFactory, ExternalRequest, ExternalResponse,
    MessageFactory, MessageTranslator,
};

use crate::transport::{HyperTransport, Transport};

/// Sends external requests from async code without spawning a task.
///
/// Unlike [`BridgeHandler`](crate::BridgeHandler) there are no per-call
/// options: the request runs on the caller's task with the given cancel
/// observer, and the response body is buffered.
///
/// # Example
///
/// ```ignore
/// let client = BridgeClient::new(HyperTransport::new()?);
/// let response = client.request(request, CancelObserver::never()).await?;
/// ```
#[derive(Clone)]
pub struct BridgeClient<F = DefaultMessageFactory> {
    transport: Arc<dyn Transport>,
    translator: MessageTranslator<F>,
}

impl<F> std::fmt::Debug for BridgeClient<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient").finish_non_exhaustive()
    }
}

impl BridgeClient {
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            translator: MessageTranslator::default(),
        }
    }

    /// A client over a default [`HyperTransport`].
    pub fn with_default_transport() -> Result<Self, BridgeError> {
        Ok(Self::new(HyperTransport::new()?))
    }
}

impl<F: MessageFactory> BridgeClient<F> {
    /// Create external responses with `factory`.
    pub fn with_message_factory<G: MessageFactory>(self, factory: G) -> BridgeClient<G> {
        BridgeClient {
            transport: self.transport,
            translator: MessageTranslator::new(factory),
        }
    }

    pub async fn request(
        &self,
        request: ExternalRequest,
        cancel: CancelObserver,
    ) -> Result<ExternalResponse, BridgeError> {
        let internal = self.translator.to_internal(&request);
        let response = self.transport.request(internal, cancel.clone()).await?;
        self.translator.to_external(response, &cancel).await
    }
}
