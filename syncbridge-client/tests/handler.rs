mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use syncbridge_client::transport::ResponseFuture;
use syncbridge_client::{
    BridgeClient, BridgeError, BridgeHandler, CallPhase, HyperTransport, RequestOptions,
    Transport, TransportOptionKey,
};
use syncbridge_core::http::header::SET_COOKIE;
use syncbridge_core::http::{HeaderMap, HeaderValue, Method, StatusCode, Version};
use syncbridge_core::{CancelObserver, InternalRequest, InternalResponse, MemoryStream, PullStream};

use common::{closed_addr, get, init_tracing, request, spawn_server};

#[tokio::test(flavor = "multi_thread")]
async fn test_get_round_trip() {
    init_tracing();
    let addr = spawn_server().await;
    let handler = BridgeHandler::new().unwrap();

    let request = get(addr, "/echo")
        .with_header("x-echo".parse().unwrap(), HeaderValue::from_static("a"))
        .with_header("x-echo".parse().unwrap(), HeaderValue::from_static("b"));
    let response = handler
        .invoke(request, RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.reason(), "OK");
    assert_eq!(response.version(), Version::HTTP_11);
    assert_eq!(response.headers()["x-method"], "GET");
    let echoed: Vec<_> = response.headers().get_all("x-echo").iter().collect();
    assert_eq!(echoed, ["a", "b"]);
    assert!(response.body().contents().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_post_body_is_streamed_to_server() {
    let addr = spawn_server().await;
    let handler = BridgeHandler::new().unwrap();

    let request = request(Method::POST, addr, "/echo")
        .with_body(MemoryStream::from_bytes("hello from a blocking caller"));
    let response = handler
        .invoke(request, RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(response.headers()["x-method"], "POST");
    assert_eq!(response.headers()["x-body-length"], "28");
    assert_eq!(
        response.body().contents().unwrap(),
        Bytes::from("hello from a blocking caller")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_error_status_is_a_response() {
    let addr = spawn_server().await;
    let handler = BridgeHandler::new().unwrap();

    let response = handler
        .invoke(get(addr, "/status/404"), RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.reason(), "Not Found");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_repeated_response_headers_are_kept() {
    let addr = spawn_server().await;
    let handler = BridgeHandler::new().unwrap();

    let response = handler
        .invoke(get(addr, "/cookies"), RequestOptions::new())
        .await
        .unwrap();

    let cookies: Vec<_> = response.headers().get_all(SET_COOKIE).iter().collect();
    assert_eq!(cookies, ["a=1", "b=2"]);
    assert_eq!(response.body().contents().unwrap(), Bytes::from("cookies"));
}

#[test]
fn test_blocking_wait_from_plain_thread() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let addr = runtime.block_on(spawn_server());
    let handler = BridgeHandler::builder()
        .runtime(runtime.handle().clone())
        .build()
        .unwrap();

    let call = handler.invoke(get(addr, "/echo"), RequestOptions::new());
    let response = call.wait().unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(call.phase(), CallPhase::Resolved);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_before_completion() {
    let addr = spawn_server().await;
    let handler = BridgeHandler::new().unwrap();

    let call = handler.invoke(get(addr, "/slow"), RequestOptions::new());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(call.cancel());
    assert_eq!(call.phase(), CallPhase::Cancelled);
    assert_eq!(call.await.unwrap_err(), BridgeError::Cancelled);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_after_completion_is_noop() {
    let addr = spawn_server().await;
    let handler = BridgeHandler::new().unwrap();

    let call = handler.invoke(get(addr, "/echo"), RequestOptions::new());
    let first = call.wait().unwrap();

    assert!(!call.cancel());
    assert_eq!(call.phase(), CallPhase::Resolved);
    let second = call.wait().unwrap();
    assert_eq!(first.status(), second.status());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_during_delay() {
    let addr = spawn_server().await;
    let handler = BridgeHandler::new().unwrap();

    let started = Instant::now();
    let call = handler.invoke(
        get(addr, "/echo"),
        RequestOptions::new().delay(Duration::from_secs(10)),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(call.cancel());

    assert_eq!(call.await.unwrap_err(), BridgeError::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delay_postpones_request() {
    let addr = spawn_server().await;
    let handler = BridgeHandler::new().unwrap();

    let started = Instant::now();
    let response = handler
        .invoke(
            get(addr, "/echo"),
            RequestOptions::new().delay(Duration::from_millis(200)),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timeout_rejects() {
    let addr = spawn_server().await;
    let handler = BridgeHandler::new().unwrap();

    let started = Instant::now();
    let call = handler.invoke(
        get(addr, "/slow"),
        RequestOptions::from_json(r#"{"timeout": 0.2}"#).unwrap(),
    );
    let err = call.await.unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(!err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_inactivity_timeout_on_body() {
    let addr = spawn_server().await;
    let handler = BridgeHandler::new().unwrap();

    let err = handler
        .invoke(
            get(addr, "/stall"),
            RequestOptions::new().timeout(Duration::from_millis(300)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Timeout(_)), "unexpected error: {err}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connection_refused() {
    let addr = closed_addr().await;
    let handler = BridgeHandler::new().unwrap();

    let err = handler
        .invoke(get(addr, "/echo"), RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Transport(_)), "unexpected error: {err}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sink_receives_body() {
    let addr = spawn_server().await;
    let handler = BridgeHandler::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("download.txt");

    let response = handler
        .invoke(get(addr, "/chunks"), RequestOptions::new().sink(&path))
        .await
        .unwrap();

    assert_eq!(response.body().contents().unwrap(), Bytes::from("one,two,three"));
    assert_eq!(std::fs::read(&path).unwrap(), b"one,two,three");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_streamed_response_reads_on_demand() {
    let addr = spawn_server().await;
    let handler = BridgeHandler::new().unwrap();

    let response = handler
        .invoke(get(addr, "/chunks"), RequestOptions::new().stream(true))
        .await
        .unwrap();

    let body = response.body().clone();
    let contents = tokio::task::spawn_blocking(move || {
        let first = body.read(4)?;
        let rest = body.contents()?;
        Ok::<_, BridgeError>((first, rest, body.eof()))
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(contents.0, Bytes::from("one,"));
    assert_eq!(contents.1, Bytes::from("two,three"));
    assert!(contents.2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_streamed_response_pull_timeout() {
    let addr = spawn_server().await;
    let handler = BridgeHandler::builder()
        .pull_timeout(Duration::from_millis(100))
        .build()
        .unwrap();

    let response = handler
        .invoke(get(addr, "/stall"), RequestOptions::new().stream(true))
        .await
        .unwrap();

    let body = response.body().clone();
    let err = tokio::task::spawn_blocking(move || body.contents())
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err, BridgeError::PullTimeout(Duration::from_millis(100)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_stops_streamed_body() {
    let addr = spawn_server().await;
    let handler = BridgeHandler::new().unwrap();

    let call = handler.invoke(get(addr, "/stall"), RequestOptions::new().stream(true));
    let response = call.wait().unwrap();
    assert!(!call.cancel());

    let body = response.body().clone();
    let err = tokio::task::spawn_blocking(move || body.contents())
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err, BridgeError::Cancelled);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_protocols_override() {
    let addr = spawn_server().await;
    let handler = BridgeHandler::new().unwrap();

    let response = handler
        .invoke(get(addr, "/echo"), RequestOptions::new().protocols(["1.0"]))
        .await
        .unwrap();
    assert_eq!(response.headers()["x-version"], "HTTP/1.0");

    let err = handler
        .invoke(get(addr, "/echo"), RequestOptions::new().protocols(["9"]))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidConfiguration(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_equivalent_options_share_a_transport() {
    let addr = spawn_server().await;
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    let handler = BridgeHandler::builder()
        .transport_factory(move |key: &TransportOptionKey| {
            counter.fetch_add(1, Ordering::SeqCst);
            HyperTransport::from_key(key)
        })
        .build()
        .unwrap();

    let a = RequestOptions::from_json(
        r#"{"verify": false, "proxy": {"http": "http://127.0.0.1:9", "https": "http://127.0.0.1:9", "no": ["127.0.0.1", "localhost"]}}"#,
    )
    .unwrap();
    let b = RequestOptions::from_json(
        r#"{"proxy": {"no": ["LOCALHOST", "127.0.0.1"], "https": "http://127.0.0.1:9", "http": "http://127.0.0.1:9"}, "verify": false}"#,
    )
    .unwrap();

    for options in [a, b] {
        let response = handler.invoke(get(addr, "/echo"), options).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert_eq!(handler.cached_transports(), 1);

    let v4 = RequestOptions::new().force_ip_resolve(syncbridge_client::IpFamily::V4);
    handler.invoke(get(addr, "/echo"), v4).await.unwrap();
    assert_eq!(built.load(Ordering::SeqCst), 2);

    // Default settings never touch the cache.
    let default = RequestOptions::from_json(r#"{"verify": true}"#).unwrap();
    handler.invoke(get(addr, "/echo"), default).await.unwrap();
    assert_eq!(handler.cached_transports(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bridge_client_request() {
    let addr = spawn_server().await;
    let client = BridgeClient::with_default_transport().unwrap();

    let request = request(Method::PUT, addr, "/echo").with_body(MemoryStream::from_bytes("put"));
    let response = client
        .request(request, CancelObserver::never())
        .await
        .unwrap();

    assert_eq!(response.headers()["x-method"], "PUT");
    assert_eq!(response.body().contents().unwrap(), Bytes::from("put"));
}

/// Answers every request with `204` and records its connect timeout.
#[derive(Clone, Default)]
struct RecordingTransport {
    connect_timeouts: Arc<Mutex<Vec<Option<Duration>>>>,
}

impl Transport for RecordingTransport {
    fn request(&self, request: InternalRequest, _cancel: CancelObserver) -> ResponseFuture {
        self.connect_timeouts
            .lock()
            .unwrap()
            .push(request.connect_timeout());
        Box::pin(async move {
            Ok(InternalResponse::new(
                Version::HTTP_11,
                StatusCode::NO_CONTENT,
                HeaderMap::new(),
                PullStream::empty(),
                request,
            ))
        })
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connect_timeout_keeps_default_transport() {
    let transport = RecordingTransport::default();
    let handler = BridgeHandler::builder()
        .transport(transport.clone())
        .build()
        .unwrap();

    let response = handler
        .invoke(
            request(Method::GET, "127.0.0.1:1".parse().unwrap(), "/"),
            RequestOptions::from_json(r#"{"connect_timeout": 1}"#).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        *transport.connect_timeouts.lock().unwrap(),
        [Some(Duration::from_secs(1))]
    );
    assert_eq!(handler.cached_transports(), 0);
}
