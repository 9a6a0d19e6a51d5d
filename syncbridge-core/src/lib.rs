//! Core types for bridging an async HTTP transport and blocking callers.
//!
//! This crate holds everything that does not touch the network:
//!
//! - [`message`]: internal (transport-side) and external (caller-side) messages
//! - [`stream`]: buffered and pull streams and the adapters between them
//! - [`MessageTranslator`]: conversion between the two message models
//! - [`ProtocolVersionNegotiator`]: protocol version selection
//! - [`CancelToken`]: one-shot cooperative cancellation
//! - [`BridgeError`]: the shared error type

pub mod blocking;
pub mod cancel;
pub mod error;
pub mod message;
pub mod protocol;
pub mod stream;
pub mod translate;
pub mod version;

pub use cancel::{CancelObserver, CancelToken};
pub use error::BridgeError;
pub use message::{
    BodySource, DefaultMessageFactory, ExternalRequest, ExternalResponse, InternalRequest,
    InternalResponse, MessageFactory,
};
pub use protocol::ProtocolVersionNegotiator;
pub use stream::{
    BufferedPushAdapter, BufferedStream, ChunkedPullStream, MemoryStream, PullStream,
    SharedStream, StreamCopier,
};
pub use translate::MessageTranslator;
pub use version::{DEFAULT_PROTOCOL_VERSIONS, parse_version, version_str};

// Re-export the http crate so callers build messages with matching types.
pub use http;
