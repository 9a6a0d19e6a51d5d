//! Blocking-style HTTP calls bridged onto an async hyper client.
//!
//! This crate connects the message model of `syncbridge-core` to the network:
//!
//! - [`BridgeHandler`]: runs each external call on its own tokio task and
//!   returns a cancellable [`ResponseHandle`]
//! - [`RequestOptions`]: per-call delay, timeouts, TLS, proxy, address family,
//!   download sink, protocol versions and streaming
//! - [`transport`]: the [`Transport`] seam and the hyper-based
//!   [`HyperTransport`]
//! - [`BridgeClient`]: a thin async client without tasks or options
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use syncbridge_client::{BridgeHandler, RequestOptions};
//! use syncbridge_core::ExternalRequest;
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let handler = BridgeHandler::builder()
//!     .runtime(runtime.handle().clone())
//!     .build()?;
//!
//! let request = ExternalRequest::new(http::Method::GET, "https://example.com/".parse()?);
//! let options = RequestOptions::from_json(r#"{"timeout": 5, "verify": false}"#)?;
//!
//! // From blocking code:
//! let response = handler.invoke(request, options).wait()?;
//! println!("{} {}", response.status(), response.reason());
//! ```
//!
//! ## Cancellation
//!
//! [`ResponseHandle::cancel`] signals the call's cancel token. A call that has
//! not settled yet fails with [`BridgeError::Cancelled`]; a settled call keeps
//! its outcome.
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `tls` (default) | `tls-ring` + `tls-native-roots` |
//! | `tls-ring` / `tls-aws-lc` | rustls crypto provider |
//! | `tls-native-roots` / `tls-webpki-roots` | root certificates for default verification |
//! | `tracing` | `tracing` spans and events for every bridged call |

mod builder;
mod cache;
mod client;
mod handler;
pub mod options;
mod response;
pub mod sink;
pub mod transport;

pub use builder::BridgeHandlerBuilder;
pub use cache::{ClientCache, TransportFactory};
pub use client::BridgeClient;
pub use handler::BridgeHandler;
pub use options::{
    CertOption, ClientCertKey, IpFamily, ProxyKey, ProxyOption, RequestOptions,
    TransportOptionKey, VerifyMode, VerifyOption,
};
pub use response::{CallPhase, ResponseHandle};
pub use transport::{HyperTransport, HyperTransportBuilder, Transport};

// Re-export core types for convenience
pub use syncbridge_core::{
    BridgeError, CancelObserver, CancelToken, ExternalRequest, ExternalResponse,
};
