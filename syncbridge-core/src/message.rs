//! Message model for both sides of the bridge.
//!
//! Internal messages are what a transport sends and receives: pull-based
//! bodies, a list of acceptable protocol versions and per-request timeouts.
//! External messages are the blocking-style values handed to callers: a
//! concrete protocol version and a shared
//! [`BufferedStream`](crate::stream::BufferedStream) body.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri, Version};

use crate::BridgeError;
use crate::stream::{BufferedPushAdapter, PullStream, SharedStream};
use crate::version::{DEFAULT_PROTOCOL_VERSIONS, dedup_versions};

// ============================================================================
// BodySource
// ============================================================================

type BodyFactory = Arc<dyn Fn() -> PullStream + Send + Sync>;

/// Request body: a length hint plus a factory for fresh pull streams.
///
/// Every call to [`stream`](BodySource::stream) starts a new pass over the
/// body, so a transport may replay it (e.g. on redirect).
#[derive(Clone)]
pub struct BodySource {
    length: Option<u64>,
    factory: BodyFactory,
}

impl BodySource {
    pub fn empty() -> Self {
        Self {
            length: Some(0),
            factory: Arc::new(PullStream::empty),
        }
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            length: Some(data.len() as u64),
            factory: Arc::new(move || PullStream::from_bytes(data.clone())),
        }
    }

    /// Body backed by a buffered stream. Each pass wraps the stream in a new
    /// [`BufferedPushAdapter`], which rewinds it first when it is seekable.
    pub fn from_shared(stream: SharedStream) -> Self {
        Self {
            length: stream.size(),
            factory: Arc::new(move || BufferedPushAdapter::new(stream.clone()).into_pull_stream()),
        }
    }

    /// Body produced by an arbitrary factory. `length` of `None` means unknown.
    pub fn from_fn<F>(length: Option<u64>, factory: F) -> Self
    where
        F: Fn() -> PullStream + Send + Sync + 'static,
    {
        Self {
            length,
            factory: Arc::new(factory),
        }
    }

    /// Declared body length, `None` when unknown.
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Start a fresh pass over the body.
    pub fn stream(&self) -> PullStream {
        (self.factory)()
    }
}

impl Default for BodySource {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodySource")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// InternalRequest
// ============================================================================

/// A transport-bound request.
#[derive(Debug, Clone)]
pub struct InternalRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    protocol_versions: Vec<Version>,
    body: BodySource,
    transfer_timeout: Option<Duration>,
    inactivity_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl InternalRequest {
    /// Create a request accepting HTTP/1.1 and HTTP/2 with an empty body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            protocol_versions: DEFAULT_PROTOCOL_VERSIONS.to_vec(),
            body: BodySource::empty(),
            transfer_timeout: None,
            inactivity_timeout: None,
            connect_timeout: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn set_uri(&mut self, uri: Uri) {
        self.uri = uri;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Acceptable protocol versions, in preference order, without duplicates.
    pub fn protocol_versions(&self) -> &[Version] {
        &self.protocol_versions
    }

    /// Replace the acceptable protocol versions. Duplicates are dropped; an
    /// empty list is rejected.
    pub fn set_protocol_versions<I>(&mut self, versions: I) -> Result<(), BridgeError>
    where
        I: IntoIterator<Item = Version>,
    {
        let versions = dedup_versions(versions);
        if versions.is_empty() {
            return Err(BridgeError::InvalidConfiguration(
                "protocol version list must not be empty".into(),
            ));
        }
        self.protocol_versions = versions;
        Ok(())
    }

    /// Accept exactly one protocol version.
    pub fn set_protocol_version(&mut self, version: Version) {
        self.protocol_versions = vec![version];
    }

    pub fn body(&self) -> &BodySource {
        &self.body
    }

    pub fn set_body(&mut self, body: BodySource) {
        self.body = body;
    }

    /// Deadline for the whole exchange, head and body.
    pub fn transfer_timeout(&self) -> Option<Duration> {
        self.transfer_timeout
    }

    pub fn set_transfer_timeout(&mut self, timeout: Option<Duration>) {
        self.transfer_timeout = timeout;
    }

    /// Maximum gap between two body chunks.
    pub fn inactivity_timeout(&self) -> Option<Duration> {
        self.inactivity_timeout
    }

    pub fn set_inactivity_timeout(&mut self, timeout: Option<Duration>) {
        self.inactivity_timeout = timeout;
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn set_connect_timeout(&mut self, timeout: Option<Duration>) {
        self.connect_timeout = timeout;
    }
}

// ============================================================================
// InternalResponse
// ============================================================================

/// A response produced by a transport.
///
/// The body is single-consumer and single-pass.
#[derive(Debug)]
pub struct InternalResponse {
    pub(crate) version: Version,
    pub(crate) status: StatusCode,
    pub(crate) reason: Option<String>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: PullStream,
    pub(crate) request: InternalRequest,
    pub(crate) previous: Option<Box<InternalResponse>>,
}

impl InternalResponse {
    pub fn new(
        version: Version,
        status: StatusCode,
        headers: HeaderMap,
        body: PullStream,
        request: InternalRequest,
    ) -> Self {
        Self {
            version,
            status,
            reason: None,
            headers,
            body,
            request,
            previous: None,
        }
    }

    /// Set the reason phrase sent by the peer.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Link the response this one followed (redirect chain).
    pub fn with_previous(mut self, previous: InternalResponse) -> Self {
        self.previous = Some(Box::new(previous));
        self
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Reason phrase as received, `None` if the peer sent none.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body_mut(&mut self) -> &mut PullStream {
        &mut self.body
    }

    pub fn into_body(self) -> PullStream {
        self.body
    }

    /// Replace the body with `f(body)`, keeping everything else.
    pub fn map_body<F>(mut self, f: F) -> Self
    where
        F: FnOnce(PullStream) -> PullStream,
    {
        self.body = f(std::mem::replace(&mut self.body, PullStream::empty()));
        self
    }

    pub fn request(&self) -> &InternalRequest {
        &self.request
    }

    pub fn previous(&self) -> Option<&InternalResponse> {
        self.previous.as_deref()
    }
}

// ============================================================================
// External messages
// ============================================================================

/// Blocking-style request as seen by callers of the bridge.
#[derive(Debug, Clone)]
pub struct ExternalRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: SharedStream,
}

impl ExternalRequest {
    /// Create an HTTP/1.1 request with an empty in-memory body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: SharedStream::memory(),
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_header(mut self, name: http::header::HeaderName, value: http::HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<SharedStream>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &SharedStream {
        &self.body
    }

    pub fn set_body(&mut self, body: SharedStream) {
        self.body = body;
    }
}

/// Blocking-style response handed back to callers of the bridge.
#[derive(Debug, Clone)]
pub struct ExternalResponse {
    status: StatusCode,
    reason: String,
    version: Version,
    headers: HeaderMap,
    body: SharedStream,
}

impl ExternalResponse {
    /// Create an HTTP/1.1 response with an empty in-memory body. An empty
    /// `reason` is replaced by the canonical reason of `status`.
    pub fn new(status: StatusCode, reason: &str) -> Self {
        let reason = if reason.is_empty() {
            status.canonical_reason().unwrap_or_default().to_owned()
        } else {
            reason.to_owned()
        };
        Self {
            status,
            reason,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: SharedStream::memory(),
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_header(mut self, name: http::header::HeaderName, value: http::HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<SharedStream>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &SharedStream {
        &self.body
    }

    pub fn set_body(&mut self, body: SharedStream) {
        self.body = body;
    }
}

// ============================================================================
// MessageFactory
// ============================================================================

/// Creates external messages with a fresh, writable body.
pub trait MessageFactory: Send + Sync {
    fn create_request(&self, method: Method, uri: Uri) -> ExternalRequest;

    fn create_response(&self, status: StatusCode, reason: &str) -> ExternalResponse;
}

impl<T: MessageFactory + ?Sized> MessageFactory for Arc<T> {
    fn create_request(&self, method: Method, uri: Uri) -> ExternalRequest {
        (**self).create_request(method, uri)
    }

    fn create_response(&self, status: StatusCode, reason: &str) -> ExternalResponse {
        (**self).create_response(status, reason)
    }
}

/// Factory producing in-memory bodies and a fixed default protocol version.
#[derive(Debug, Clone, Copy)]
pub struct DefaultMessageFactory {
    version: Version,
}

impl DefaultMessageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `version` as the protocol version of created messages.
    pub fn with_version(version: Version) -> Self {
        Self { version }
    }

    pub fn version(&self) -> Version {
        self.version
    }
}

impl Default for DefaultMessageFactory {
    fn default() -> Self {
        Self {
            version: Version::HTTP_11,
        }
    }
}

impl MessageFactory for DefaultMessageFactory {
    fn create_request(&self, method: Method, uri: Uri) -> ExternalRequest {
        ExternalRequest::new(method, uri).with_version(self.version)
    }

    fn create_response(&self, status: StatusCode, reason: &str) -> ExternalResponse {
        ExternalResponse::new(status, reason).with_version(self.version)
    }
}
