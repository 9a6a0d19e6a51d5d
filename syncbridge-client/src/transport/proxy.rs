//! Proxy-aware TCP connector.
//!
//! Destinations matched by the proxy rules are reached through the proxy:
//! `socks5://` and `socks5h://` proxies use a SOCKS5 handshake, `http://`
//! proxies always use a `CONNECT` tunnel, for plain `http://` destinations
//! too. Everything else connects directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use http::Uri;
use http::uri::{Authority, Scheme};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::connect::proxy::{SocksV5, Tunnel};
use hyper_util::client::proxy::matcher::{Intercept, Matcher};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tower_service::Service;

use crate::options::ProxyKey;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// TCP connector that honors a [`ProxyKey`].
#[derive(Clone, Debug)]
pub struct ProxyConnector {
    http: HttpConnector,
    matcher: Option<Arc<Matcher>>,
}

impl ProxyConnector {
    pub fn new(http: HttpConnector, proxy: Option<&ProxyKey>) -> Self {
        let matcher = proxy.map(|proxy| {
            let mut builder = Matcher::builder();
            if let Some(uri) = proxy.schemes.get("http") {
                builder = builder.http(uri.as_str());
            }
            if let Some(uri) = proxy.schemes.get("https") {
                builder = builder.https(uri.as_str());
            }
            let no = proxy.no.iter().map(String::as_str).collect::<Vec<_>>().join(",");
            Arc::new(builder.no(no).build())
        });

        Self { http, matcher }
    }

    /// A copy whose TCP connects (to the proxy or the destination) give up after `timeout`.
    pub(crate) fn with_connect_timeout(&self, timeout: Option<Duration>) -> Self {
        let mut http = self.http.clone();
        http.set_connect_timeout(timeout);
        Self {
            http,
            matcher: self.matcher.clone(),
        }
    }

    /// The proxy to use for `dst`, or `None` to connect directly.
    fn route(&self, dst: &Uri) -> Option<Intercept> {
        self.matcher.as_ref()?.intercept(dst)
    }
}

impl Service<Uri> for ProxyConnector {
    type Response = TokioIo<TcpStream>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.http.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let intercept = self.route(&dst);
        let mut http = self.http.clone();

        Box::pin(async move {
            let Some(intercept) = intercept else {
                return Ok(http.call(dst).await?);
            };

            let proxy = intercept.uri().clone();
            let dst = with_default_port(dst);
            #[cfg(feature = "tracing")]
            tracing::debug!(%proxy, %dst, "connecting through proxy");

            match proxy.scheme_str() {
                Some(scheme @ ("socks5" | "socks5h")) => {
                    let mut socks = SocksV5::new(proxy.clone(), http).local_dns(scheme == "socks5");
                    if let Some((user, pass)) = intercept.raw_auth() {
                        socks = socks.with_auth(user.to_owned(), pass.to_owned());
                    }
                    std::future::poll_fn(|cx| socks.poll_ready(cx)).await?;
                    Ok(socks.call(dst).await?)
                }
                _ => {
                    let mut tunnel = Tunnel::new(proxy.clone(), http);
                    if let Some(auth) = intercept.basic_auth() {
                        tunnel = tunnel.with_auth(auth.clone());
                    }
                    std::future::poll_fn(|cx| tunnel.poll_ready(cx)).await?;
                    Ok(tunnel.call(dst).await?)
                }
            }
        })
    }
}

/// Spell out the destination port; the proxy connectors assume 443 otherwise.
fn with_default_port(dst: Uri) -> Uri {
    if dst.port().is_some() {
        return dst;
    }
    let port = if dst.scheme() == Some(&Scheme::HTTP) { 80 } else { 443 };
    let Some(authority) = dst
        .host()
        .and_then(|host| format!("{host}:{port}").parse::<Authority>().ok())
    else {
        return dst;
    };

    let mut parts = dst.clone().into_parts();
    parts.authority = Some(authority);
    Uri::from_parts(parts).unwrap_or(dst)
}
