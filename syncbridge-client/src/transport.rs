//! HTTP transport layer.
//!
//! [`Transport`] is the seam between the bridge and the HTTP engine. The
//! provided implementation, [`HyperTransport`], uses hyper_util's legacy
//! client and supports:
//!
//! - HTTP/1.0, HTTP/1.1 and HTTP/2 with ALPN negotiation
//! - TLS with rustls (feature-gated), custom CA files and client certificates
//! - `CONNECT` and SOCKS5 proxies
//! - Connection pooling
//!
//! # Feature Flags
//!
//! - `tls` (default) - Enables `tls-ring` + `tls-native-roots` for convenience
//! - `tls-ring` / `tls-aws-lc` - Crypto providers
//! - `tls-native-roots` / `tls-webpki-roots` - Root certificates

use std::future::Future;
use std::pin::Pin;

use syncbridge_core::{BridgeError, CancelObserver, InternalRequest, InternalResponse};

mod body;
mod connector;
mod hyper;
mod proxy;

pub use body::TransportBody;
pub use connector::{
    DangerousAcceptAnyCertVerifier, build_https_connector, build_tls_config, has_tls_support,
};
pub use hyper::{HyperTransport, HyperTransportBuilder};
pub use proxy::ProxyConnector;

// Re-export rustls types that users might need for TLS configuration
pub use rustls::ClientConfig as TlsClientConfig;

/// Future returned by [`Transport::request`].
pub type ResponseFuture =
    Pin<Box<dyn Future<Output = Result<InternalResponse, BridgeError>> + Send>>;

/// Sends internal requests over the network.
///
/// The returned response carries its body as a pull stream; the transport
/// must stop both the exchange and the body as soon as `cancel` fires.
pub trait Transport: Send + Sync {
    fn request(&self, request: InternalRequest, cancel: CancelObserver) -> ResponseFuture;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn request(&self, request: InternalRequest, cancel: CancelObserver) -> ResponseFuture {
        (**self).request(request, cancel)
    }
}
