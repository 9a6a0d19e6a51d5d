//! Shared fixtures: a local axum server and request helpers.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Request};
use axum::http::{StatusCode, header};
use axum::response::Response;
use axum::routing::{any, get as route_get};
use bytes::Bytes;
use syncbridge_core::ExternalRequest;
use syncbridge_core::http::Method;

/// Echo method, version, `x-echo` headers and body back to the caller.
async fn echo(request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();

    let mut response = Response::builder()
        .header("x-method", parts.method.as_str())
        .header("x-version", format!("{:?}", parts.version))
        .header("x-body-length", body.len().to_string());
    for value in parts.headers.get_all("x-echo") {
        response = response.header("x-echo", value);
    }
    response.body(Body::from(body)).unwrap()
}

async fn status(Path(code): Path<u16>) -> Response {
    Response::builder()
        .status(StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST))
        .body(Body::empty())
        .unwrap()
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "late"
}

async fn cookies() -> Response {
    Response::builder()
        .header(header::SET_COOKIE, "a=1")
        .header(header::CONTENT_TYPE, "text/plain")
        .header(header::SET_COOKIE, "b=2")
        .body(Body::from("cookies"))
        .unwrap()
}

/// Three chunks, 50ms apart.
async fn chunks() -> Response {
    let stream = async_stream::stream! {
        for chunk in ["one,", "two,", "three"] {
            tokio::time::sleep(Duration::from_millis(50)).await;
            yield Ok::<_, Infallible>(Bytes::from(chunk));
        }
    };
    Response::new(Body::from_stream(stream))
}

/// One chunk, then silence.
async fn stall() -> Response {
    let stream = async_stream::stream! {
        yield Ok::<_, Infallible>(Bytes::from("first"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        yield Ok::<_, Infallible>(Bytes::from("never"));
    };
    Response::new(Body::from_stream(stream))
}

fn router() -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/status/{code}", route_get(status))
        .route("/slow", route_get(slow))
        .route("/cookies", route_get(cookies))
        .route("/chunks", route_get(chunks))
        .route("/stall", route_get(stall))
}

/// Serve the test routes on an ephemeral port of the current runtime.
pub async fn spawn_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router()).await.unwrap();
    });
    addr
}

pub fn get(addr: SocketAddr, path: &str) -> ExternalRequest {
    request(Method::GET, addr, path)
}

pub fn request(method: Method, addr: SocketAddr, path: &str) -> ExternalRequest {
    ExternalRequest::new(method, format!("http://{addr}{path}").parse().unwrap())
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}
