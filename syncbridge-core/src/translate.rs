//! Conversion between internal and external messages.

use std::time::Duration;

use http::HeaderMap;
use http::Version;
use tokio::runtime::Handle;

use crate::message::{
    BodySource, DefaultMessageFactory, ExternalRequest, ExternalResponse, InternalRequest,
    InternalResponse, MessageFactory,
};
use crate::protocol::ProtocolVersionNegotiator;
use crate::stream::{
    BufferedPushAdapter, ChunkedPullStream, DEFAULT_PULL_TIMEOUT, PullStream, SharedStream,
    StreamCopier,
};
use crate::{BridgeError, CancelObserver};

/// Translates messages between the transport side and the caller side.
///
/// External messages are created through the injected [`MessageFactory`].
#[derive(Debug, Clone)]
pub struct MessageTranslator<F = DefaultMessageFactory> {
    factory: F,
    pull_timeout: Duration,
}

impl Default for MessageTranslator<DefaultMessageFactory> {
    fn default() -> Self {
        Self::new(DefaultMessageFactory::default())
    }
}

impl<F: MessageFactory> MessageTranslator<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            pull_timeout: DEFAULT_PULL_TIMEOUT,
        }
    }

    /// Per-pull timeout for bodies produced by [`to_external_streaming`](Self::to_external_streaming).
    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Build an internal request from a caller's request.
    ///
    /// The only acceptable protocol version is the one the caller declared.
    /// The body is read lazily through a [`BufferedPushAdapter`] per pass.
    pub fn to_internal(&self, request: &ExternalRequest) -> InternalRequest {
        let mut target = InternalRequest::new(request.method().clone(), request.uri().clone());
        *target.headers_mut() = request.headers().clone();
        target.set_body(BodySource::from_shared(request.body().clone()));
        target.set_protocol_version(request.version());
        target
    }

    /// Build the external request shell (method, URI, headers, version) without a body.
    pub fn to_external_request_without_body(
        &self,
        request: &InternalRequest,
        version: Option<Version>,
    ) -> Result<ExternalRequest, BridgeError> {
        let mut target = self
            .factory
            .create_request(request.method().clone(), request.uri().clone());
        append_headers(target.headers_mut(), request.headers());

        let version = ProtocolVersionNegotiator::negotiate(
            request.protocol_versions(),
            version,
            target.version(),
        )?;
        target.set_version(version);
        Ok(target)
    }

    /// Build an external request and copy the request body into it.
    pub async fn to_external_request(
        &self,
        request: &InternalRequest,
        version: Option<Version>,
        cancel: &CancelObserver,
    ) -> Result<ExternalRequest, BridgeError> {
        let target = self.to_external_request_without_body(request, version)?;
        let mut body = request.body().stream();
        StreamCopier::copy(&mut body, target.body(), cancel).await?;
        Ok(target)
    }

    /// Build an external response, buffering the whole body.
    pub async fn to_external(
        &self,
        response: InternalResponse,
        cancel: &CancelObserver,
    ) -> Result<ExternalResponse, BridgeError> {
        let (target, mut body) = self.external_shell(response);
        StreamCopier::copy(&mut body, target.body(), cancel).await?;
        Ok(target)
    }

    /// Build an external response whose body reads from the live response
    /// stream on demand.
    ///
    /// Reads block the calling thread; they must not happen on a
    /// current-thread runtime.
    pub fn to_external_streaming(
        &self,
        response: InternalResponse,
        handle: Handle,
        cancel: CancelObserver,
    ) -> ExternalResponse {
        let (mut target, body) = self.external_shell(response);
        let stream = ChunkedPullStream::new(body, handle)
            .with_timeout(self.pull_timeout)
            .with_cancel(cancel);
        target.set_body(SharedStream::new(stream));
        target
    }

    /// Build an internal response from a caller's response.
    pub fn from_external(
        &self,
        response: ExternalResponse,
        request: InternalRequest,
        previous: Option<InternalResponse>,
    ) -> InternalResponse {
        let body = BufferedPushAdapter::new(response.body().clone()).into_pull_stream();
        let mut target = InternalResponse::new(
            response.version(),
            response.status(),
            response.headers().clone(),
            body,
            request,
        );
        if !response.reason().is_empty() {
            target = target.with_reason(response.reason());
        }
        if let Some(previous) = previous {
            target = target.with_previous(previous);
        }
        target
    }

    fn external_shell(&self, response: InternalResponse) -> (ExternalResponse, PullStream) {
        let mut target = self
            .factory
            .create_response(response.status, response.reason.as_deref().unwrap_or_default());
        target.set_version(response.version);
        append_headers(target.headers_mut(), &response.headers);
        (target, response.body)
    }
}

/// Append every `(name, value)` pair of `source`, keeping repeated names.
fn append_headers(target: &mut HeaderMap, source: &HeaderMap) {
    for (name, value) in source {
        target.append(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{BufferedStream, MemoryStream};
    use bytes::Bytes;
    use http::header::{CONTENT_TYPE, SET_COOKIE};
    use http::{HeaderValue, Method, StatusCode, Uri};

    fn translator() -> MessageTranslator {
        MessageTranslator::default()
    }

    fn internal_request() -> InternalRequest {
        InternalRequest::new(Method::GET, Uri::from_static("http://example.com/items"))
    }

    #[tokio::test]
    async fn test_to_internal_copies_request() {
        let external = ExternalRequest::new(Method::PUT, Uri::from_static("http://example.com/x"))
            .with_version(Version::HTTP_2)
            .with_header(SET_COOKIE, HeaderValue::from_static("a=1"))
            .with_header(SET_COOKIE, HeaderValue::from_static("b=2"))
            .with_body(MemoryStream::from_bytes("body"));

        let internal = translator().to_internal(&external);

        assert_eq!(internal.method(), &Method::PUT);
        assert_eq!(internal.uri(), "http://example.com/x");
        assert_eq!(internal.protocol_versions(), &[Version::HTTP_2]);
        let cookies: Vec<_> = internal.headers().get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies, ["a=1", "b=2"]);
        assert_eq!(internal.body().length(), Some(4));

        let mut body = internal.body().stream();
        let cancel = CancelObserver::never();
        assert_eq!(body.pull(&cancel).await.unwrap(), Some(Bytes::from("body")));
        assert_eq!(body.pull(&cancel).await.unwrap(), None);
    }

    #[test]
    fn test_request_shell_negotiates_version() {
        let mut request = internal_request();
        request
            .headers_mut()
            .append(CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let shell = translator()
            .to_external_request_without_body(&request, None)
            .unwrap();
        assert_eq!(shell.version(), Version::HTTP_11);
        assert_eq!(shell.headers()[CONTENT_TYPE], "text/plain");

        let shell = translator()
            .to_external_request_without_body(&request, Some(Version::HTTP_2))
            .unwrap();
        assert_eq!(shell.version(), Version::HTTP_2);

        request.set_protocol_versions([Version::HTTP_10, Version::HTTP_2]).unwrap();
        let err = translator()
            .to_external_request_without_body(&request, None)
            .unwrap_err();
        assert!(matches!(err, BridgeError::AmbiguousProtocolVersion(_)));
    }

    #[tokio::test]
    async fn test_to_external_request_copies_body() {
        let mut request = internal_request();
        request.set_body(BodySource::from_bytes("payload"));

        let external = translator()
            .to_external_request(&request, None, &CancelObserver::never())
            .await
            .unwrap();
        assert_eq!(external.body().contents().unwrap(), Bytes::from("payload"));
    }

    #[tokio::test]
    async fn test_response_round_trip() {
        let original = ExternalResponse::new(StatusCode::CREATED, "Made It")
            .with_version(Version::HTTP_2)
            .with_header(SET_COOKIE, HeaderValue::from_static("a=1"))
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_header(SET_COOKIE, HeaderValue::from_static("b=2"))
            .with_body(MemoryStream::from_bytes(r#"{"ok":true}"#));

        let translator = translator();
        let internal = translator.from_external(original.clone(), internal_request(), None);
        let external = translator
            .to_external(internal, &CancelObserver::never())
            .await
            .unwrap();

        assert_eq!(external.status(), original.status());
        assert_eq!(external.reason(), original.reason());
        assert_eq!(external.version(), original.version());
        assert_eq!(external.headers(), original.headers());
        let cookies: Vec<_> = external.headers().get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies, ["a=1", "b=2"]);
        assert_eq!(external.body().contents().unwrap(), Bytes::from(r#"{"ok":true}"#));
    }

    #[test]
    fn test_from_external_links_request_and_previous() {
        let translator = translator();
        let first = translator.from_external(
            ExternalResponse::new(StatusCode::FOUND, ""),
            internal_request(),
            None,
        );
        let second = translator.from_external(
            ExternalResponse::new(StatusCode::OK, "OK"),
            internal_request(),
            Some(first),
        );

        assert_eq!(second.request().uri(), "http://example.com/items");
        assert_eq!(second.reason(), Some("OK"));
        let previous = second.previous().unwrap();
        assert_eq!(previous.status(), StatusCode::FOUND);
        assert_eq!(previous.reason(), Some("Found"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_to_external_streaming_reads_lazily() {
        let response = InternalResponse::new(
            Version::HTTP_11,
            StatusCode::OK,
            HeaderMap::new(),
            PullStream::from_chunks(["hello ", "stream"]),
            internal_request(),
        );

        let external = translator().to_external_streaming(
            response,
            Handle::current(),
            CancelObserver::never(),
        );

        let mut body = external.body().lock();
        assert!(!body.is_seekable());
        assert_eq!(body.read(5).unwrap(), Bytes::from("hello"));
        assert_eq!(body.contents().unwrap(), Bytes::from(" stream"));
        assert!(body.eof());
    }
}
