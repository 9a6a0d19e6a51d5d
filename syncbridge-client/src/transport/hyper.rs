//! Hyper-based [`Transport`].
//!
//! This module provides [`HyperTransport`], the transport backed by
//! hyper_util's legacy client.

use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use http::Version;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;
use syncbridge_core::{
    BridgeError, CancelObserver, InternalRequest, InternalResponse, PullStream,
};
use tokio::time::Instant;

use super::body::TransportBody;
use super::connector::{build_https_connector, build_tls_config};
use super::proxy::ProxyConnector;
use super::{ResponseFuture, Transport};
use crate::options::{ClientCertKey, IpFamily, ProxyKey, TransportOptionKey, VerifyMode};

/// Type alias for the hyper client with HTTPS and proxy connectors.
type HyperClient = Client<HttpsConnector<ProxyConnector>, TransportBody>;

/// Connection settings that need a client of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ClientVariant {
    connect_timeout: Option<Duration>,
    /// Offer only HTTP/1.1 during TLS negotiation.
    http1_only: bool,
}

/// Everything needed to build a [`HyperClient`] for a variant.
struct ClientTemplate {
    tls_config: ClientConfig,
    connector: ProxyConnector,
    connect_timeout: Option<Duration>,
    http2_only: bool,
    pool_idle_timeout: Option<Duration>,
    pool_max_idle_per_host: usize,
}

impl ClientTemplate {
    fn variant_for(&self, request: &InternalRequest) -> ClientVariant {
        ClientVariant {
            connect_timeout: request.connect_timeout().or(self.connect_timeout),
            http1_only: !self.http2_only && !request.protocol_versions().contains(&Version::HTTP_2),
        }
    }

    fn build(&self, variant: ClientVariant) -> HyperClient {
        let connector = build_https_connector(
            self.connector.with_connect_timeout(variant.connect_timeout),
            self.tls_config.clone(),
            variant.http1_only,
        );

        let mut builder = Client::builder(TokioExecutor::new());

        // Configure connection pool timer (required for pool_idle_timeout to work)
        builder.pool_timer(TokioTimer::new());

        if let Some(timeout) = self.pool_idle_timeout {
            builder.pool_idle_timeout(timeout);
        }
        builder.pool_max_idle_per_host(self.pool_max_idle_per_host);

        if self.http2_only {
            builder.http2_only(true);
        }

        builder.build(connector)
    }
}

/// HTTP transport using hyper_util's legacy client.
///
/// Supports HTTP/1.0, HTTP/1.1 and HTTP/2 (negotiated via ALPN over TLS),
/// connection pooling, proxies and per-client TLS settings.
///
/// HTTP/2 is only offered to servers when the request accepts it, and each
/// request's connect timeout is honored. Requests that differ in either run
/// on separate pooled clients, built on first use.
///
/// # Example
///
/// ```ignore
/// use syncbridge_client::transport::HyperTransport;
///
/// let transport = HyperTransport::builder()
///     .pool_max_idle_per_host(8)
///     .build()?;
/// let response = transport.request(request, CancelObserver::never()).await?;
/// ```
#[derive(Clone)]
pub struct HyperTransport {
    template: Arc<ClientTemplate>,
    clients: Arc<Mutex<HashMap<ClientVariant, HyperClient>>>,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("http2_only", &self.template.http2_only)
            .field("connect_timeout", &self.template.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Create a new transport builder.
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::new()
    }

    /// Create a new transport with default settings.
    pub fn new() -> Result<Self, BridgeError> {
        Self::builder().build()
    }

    /// Create a transport for a cache key.
    pub fn from_key(key: &TransportOptionKey) -> Result<Self, BridgeError> {
        HyperTransportBuilder::from_key(key).build()
    }

    /// Check if this transport is configured for HTTP/2 only.
    pub fn is_http2_only(&self) -> bool {
        self.template.http2_only
    }

    fn client_for(&self, request: &InternalRequest) -> HyperClient {
        let variant = self.template.variant_for(request);
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        clients
            .entry(variant)
            .or_insert_with(|| {
                #[cfg(feature = "tracing")]
                tracing::debug!(?variant, "building hyper client");
                self.template.build(variant)
            })
            .clone()
    }
}

impl Transport for HyperTransport {
    fn request(&self, request: InternalRequest, cancel: CancelObserver) -> ResponseFuture {
        let client = self.client_for(&request);
        Box::pin(send(client, request, cancel))
    }
}

/// Builder for [`HyperTransport`].
pub struct HyperTransportBuilder {
    /// Custom TLS configuration; overrides `verify` and `client_cert`.
    tls_config: Option<ClientConfig>,
    /// How server certificates are verified.
    verify: VerifyMode,
    /// Client certificate for mutual TLS.
    client_cert: Option<ClientCertKey>,
    /// Proxy rules.
    proxy: Option<ProxyKey>,
    /// Restrict connections to one address family.
    ip_family: Option<IpFamily>,
    /// TCP connect timeout for requests that carry none.
    connect_timeout: Option<Duration>,
    /// Force HTTP/2 only (h2c on plain connections).
    http2_only: bool,
    /// Connection pool idle timeout.
    pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections per host.
    pool_max_idle_per_host: usize,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransportBuilder {
    /// Create a new transport builder with default settings.
    pub fn new() -> Self {
        Self {
            tls_config: None,
            verify: VerifyMode::Default,
            client_cert: None,
            proxy: None,
            ip_family: None,
            connect_timeout: None,
            http2_only: false,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }

    /// Start from the connection settings of a cache key.
    pub fn from_key(key: &TransportOptionKey) -> Self {
        let mut builder = Self::new().verify(key.verify.clone());
        builder.client_cert = key.client_cert.clone();
        builder.proxy = key.proxy.clone();
        builder.ip_family = key.ip_family;
        builder
    }

    /// Set a custom TLS configuration.
    ///
    /// Takes precedence over [`verify`](Self::verify) and
    /// [`client_cert`](Self::client_cert). Its ALPN list must be empty.
    pub fn tls_config(mut self, config: ClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    pub fn verify(mut self, verify: VerifyMode) -> Self {
        self.verify = verify;
        self
    }

    pub fn client_cert(mut self, cert: ClientCertKey) -> Self {
        self.client_cert = Some(cert);
        self
    }

    pub fn proxy(mut self, proxy: ProxyKey) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Only connect to addresses of `family`.
    pub fn ip_family(mut self, family: IpFamily) -> Self {
        self.ip_family = Some(family);
        self
    }

    /// Connect timeout for requests without their own.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Enable HTTP/2 only mode.
    ///
    /// Plain `http://` connections then speak HTTP/2 with prior knowledge.
    pub fn http2_only(mut self, enabled: bool) -> Self {
        self.http2_only = enabled;
        self
    }

    /// Set the connection pool idle timeout.
    ///
    /// Default: 90 seconds.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Disable connection pool idle timeout.
    pub fn pool_idle_timeout_none(mut self) -> Self {
        self.pool_idle_timeout = None;
        self
    }

    /// Set the maximum number of idle connections per host.
    ///
    /// Default: 32.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<HyperTransport, BridgeError> {
        let tls_config = match self.tls_config {
            Some(config) => config,
            None => build_tls_config(&self.verify, self.client_cert.as_ref())?,
        };
        if !tls_config.alpn_protocols.is_empty() {
            return Err(BridgeError::InvalidConfiguration(
                "TLS configuration must not preset ALPN protocols".into(),
            ));
        }

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        // Binding to the unspecified address of a family skips resolved
        // addresses of the other family.
        if let Some(family) = self.ip_family {
            let local: IpAddr = match family {
                IpFamily::V4 => Ipv4Addr::UNSPECIFIED.into(),
                IpFamily::V6 => Ipv6Addr::UNSPECIFIED.into(),
            };
            http.set_local_address(Some(local));
        }

        let template = ClientTemplate {
            tls_config,
            connector: ProxyConnector::new(http, self.proxy.as_ref()),
            connect_timeout: self.connect_timeout,
            http2_only: self.http2_only,
            pool_idle_timeout: self.pool_idle_timeout,
            pool_max_idle_per_host: self.pool_max_idle_per_host,
        };

        Ok(HyperTransport {
            template: Arc::new(template),
            clients: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

impl std::fmt::Debug for HyperTransportBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransportBuilder")
            .field("tls_config", &self.tls_config.is_some())
            .field("verify", &self.verify)
            .field("client_cert", &self.client_cert.as_ref().map(|c| &c.path))
            .field("proxy", &self.proxy)
            .field("ip_family", &self.ip_family)
            .field("connect_timeout", &self.connect_timeout)
            .field("http2_only", &self.http2_only)
            .field("pool_idle_timeout", &self.pool_idle_timeout)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .finish()
    }
}

// ============================================================================
// Request execution
// ============================================================================

/// Transfer and inactivity limits of one exchange.
#[derive(Debug, Clone, Copy)]
struct Limits {
    transfer: Option<(Instant, Duration)>,
    inactivity: Option<Duration>,
}

impl Limits {
    fn new(request: &InternalRequest) -> Self {
        Self {
            transfer: request
                .transfer_timeout()
                .map(|timeout| (Instant::now() + timeout, timeout)),
            inactivity: request.inactivity_timeout(),
        }
    }

    /// Run `fut` under whichever limit expires first.
    async fn bound<T, F>(&self, fut: F) -> Result<T, BridgeError>
    where
        F: Future<Output = Result<T, BridgeError>>,
    {
        let idle = self
            .inactivity
            .map(|timeout| (Instant::now() + timeout, timeout));

        let (deadline, error) = match (self.transfer, idle) {
            (Some(transfer), Some(idle)) if idle.0 < transfer.0 => (idle.0, inactivity_error(idle.1)),
            (Some(transfer), _) => (transfer.0, transfer_error(transfer.1)),
            (None, Some(idle)) => (idle.0, inactivity_error(idle.1)),
            (None, None) => return fut.await,
        };

        match tokio::time::timeout_at(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(error),
        }
    }
}

fn transfer_error(timeout: Duration) -> BridgeError {
    BridgeError::Timeout(format!("transfer timeout of {timeout:?} exceeded"))
}

fn inactivity_error(timeout: Duration) -> BridgeError {
    BridgeError::Timeout(format!("no data received for {timeout:?}"))
}

/// Pick the wire version from the acceptable list.
///
/// and ALPN may upgrade it to HTTP/2 when HTTP/2 is also acceptable.
/// and ALPN may upgrade it to HTTP/2.
fn wire_version(acceptable: &[Version]) -> Version {
    match acceptable {
        [Version::HTTP_2] => Version::HTTP_2,
        [Version::HTTP_10] => Version::HTTP_10,
        _ => Version::HTTP_11,
    }
}

fn to_http_request(
    request: &InternalRequest,
) -> Result<http::Request<TransportBody>, BridgeError> {
    let mut http_request = http::Request::builder()
        .method(request.method().clone())
        .uri(request.uri().clone())
        .version(wire_version(request.protocol_versions()))
        .body(TransportBody::from_source(request.body()))?;
    *http_request.headers_mut() = request.headers().clone();
    Ok(http_request)
}

async fn send(
    client: HyperClient,
    request: InternalRequest,
    cancel: CancelObserver,
) -> Result<InternalResponse, BridgeError> {
    let limits = Limits::new(&request);
    let http_request = to_http_request(&request)?;
    #[cfg(feature = "tracing")]
    tracing::debug!(
        method = %request.method(),
        uri = %request.uri(),
        version = ?http_request.version(),
        "sending request"
    );

    let exchange = async { client.request(http_request).await.map_err(transport_error) };
    let response = cancel.guard(limits.bound(exchange)).await?;

    let (parts, body) = response.into_parts();
    #[cfg(feature = "tracing")]
    tracing::debug!(status = %parts.status, version = ?parts.version, "received response head");

    let reason = parts
        .extensions
        .get::<hyper::ext::ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned());

    let body = response_body(body, limits, cancel);
    let mut response =
        InternalResponse::new(parts.version, parts.status, parts.headers, body, request);
    if let Some(reason) = reason {
        response = response.with_reason(reason);
    }
    Ok(response)
}

/// Response body with the limits and cancellation applied to every chunk.
fn response_body(body: Incoming, limits: Limits, cancel: CancelObserver) -> PullStream {
    PullStream::new(async_stream::try_stream! {
        let mut data = body.into_data_stream();
        loop {
            let next = async { data.next().await.transpose().map_err(transport_error) };
            match cancel.guard(limits.bound(next)).await? {
                Some(chunk) => yield chunk,
                None => break,
            }
        }
    })
}

/// Flatten an error chain into a [`BridgeError`].
///
/// Errors raised by our own request body keep their original kind.
fn transport_error(err: impl std::error::Error + 'static) -> BridgeError {
    let mut message = err.to_string();
    let mut source: Option<&(dyn std::error::Error + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(bridge) = cause.downcast_ref::<BridgeError>() {
            return bridge.clone();
        }
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    BridgeError::Transport(message)
}
