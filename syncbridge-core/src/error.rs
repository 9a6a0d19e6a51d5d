//! Error taxonomy shared by every bridge component.
//!
//! [`BridgeError`] covers configuration mistakes raised at construction,
//! protocol negotiation failures raised during translation, misuse of
//! terminal or read-only streams, and failures coming out of the transport.

use std::time::Duration;

use http::Version;

use crate::version::version_str;

/// Errors produced while bridging requests, responses and bodies.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// A component was constructed with unusable settings.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An explicitly requested protocol version is not acceptable for the request.
    #[error("source request doesn't support the provided HTTP protocol version: {}", display_version(.0))]
    UnsupportedProtocolVersion(Version),

    /// More than one version is acceptable and the target default is not one of them.
    #[error("can't choose HTTP protocol version automatically: [{}]", join_versions(.0))]
    AmbiguousProtocolVersion(Vec<Version>),

    /// The stream was closed or detached.
    #[error("stream is closed")]
    StreamClosed,

    /// The stream does not support positioning.
    #[error("source stream is not seekable")]
    NotSeekable,

    /// The stream does not support writes.
    #[error("source stream is not writable")]
    NotWritable,

    /// A single pull did not yield a chunk in time.
    #[error("pull timed out after {0:?}")]
    PullTimeout(Duration),

    /// A transfer or inactivity deadline elapsed.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Transport-level failure (connection, TLS, protocol).
    #[error("transport error: {0}")]
    Transport(String),

    /// The operation was cancelled through a cancel token.
    #[error("operation cancelled")]
    Cancelled,

    /// Local I/O failure, e.g. while writing a download sink.
    #[error("i/o error: {0}")]
    Io(String),

    /// A message could not be built from the given parts.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl BridgeError {
    /// Returns true for [`BridgeError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled)
    }

    /// Returns true for both request-level and per-pull timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout(_) | BridgeError::PullTimeout(_))
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io(err.to_string())
    }
}

impl From<http::Error> for BridgeError {
    fn from(err: http::Error) -> Self {
        BridgeError::InvalidMessage(err.to_string())
    }
}

fn display_version(version: &Version) -> &'static str {
    version_str(*version)
}

fn join_versions(versions: &[Version]) -> String {
    versions
        .iter()
        .map(|v| version_str(*v))
        .collect::<Vec<_>>()
        .join(", ")
}
