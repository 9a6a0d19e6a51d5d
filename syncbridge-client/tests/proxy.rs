mod common;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use syncbridge_client::{BridgeError, BridgeHandler, RequestOptions};
use syncbridge_core::http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use common::{closed_addr, get, init_tracing, spawn_server};

/// A minimal CONNECT proxy that records every request head it receives.
struct ConnectProxy {
    addr: SocketAddr,
    heads: Arc<Mutex<Vec<String>>>,
}

impl ConnectProxy {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let heads = Arc::new(Mutex::new(Vec::new()));

        let recorded = heads.clone();
        tokio::spawn(async move {
            loop {
                let Ok((client, _)) = listener.accept().await else {
                    return;
                };
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = tunnel(client, recorded).await;
                });
            }
        });

        Self { addr, heads }
    }

    fn uri(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn heads(&self) -> Vec<String> {
        self.heads.lock().unwrap().clone()
    }
}

async fn read_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        head.push(stream.read_u8().await?);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

async fn tunnel(mut client: TcpStream, recorded: Arc<Mutex<Vec<String>>>) -> std::io::Result<()> {
    let head = read_head(&mut client).await?;
    recorded.lock().unwrap().push(head.clone());

    let target = head
        .strip_prefix("CONNECT ")
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or_default()
        .to_string();
    let mut upstream = match TcpStream::connect(&target).await {
        Ok(upstream) => upstream,
        Err(err) => {
            client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await?;
            return Err(err);
        }
    };

    client
        .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .await?;
    tokio::io::copy_bidirectional(&mut client, &mut upstream).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_request_tunnels_through_proxy() {
    init_tracing();
    let addr = spawn_server().await;
    let proxy = ConnectProxy::spawn().await;
    let handler = BridgeHandler::new().unwrap();

    let options = RequestOptions::from_json(&format!(r#"{{"proxy": "{}"}}"#, proxy.uri())).unwrap();
    let response = handler.invoke(get(addr, "/echo"), options).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let heads = proxy.heads();
    assert_eq!(heads.len(), 1);
    assert!(
        heads[0].starts_with(&format!("CONNECT {addr} HTTP/1.1\r\n")),
        "unexpected head: {:?}",
        heads[0]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_proxy_credentials_are_sent() {
    let addr = spawn_server().await;
    let proxy = ConnectProxy::spawn().await;
    let handler = BridgeHandler::new().unwrap();

    let uri = format!("http://user:pass@{}", proxy.addr);
    let options = RequestOptions::from_json(&format!(r#"{{"proxy": {{"http": "{uri}"}}}}"#)).unwrap();
    handler.invoke(get(addr, "/echo"), options).await.unwrap();

    let heads = proxy.heads();
    assert_eq!(heads.len(), 1);
    assert!(
        heads[0].contains("Proxy-Authorization: Basic dXNlcjpwYXNz\r\n"),
        "unexpected head: {:?}",
        heads[0]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_proxy_list_bypasses_proxy() {
    let addr = spawn_server().await;
    let proxy = ConnectProxy::spawn().await;
    let handler = BridgeHandler::new().unwrap();

    let options = RequestOptions::from_json(&format!(
        r#"{{"proxy": {{"http": "{}", "no": ["127.0.0.1"]}}}}"#,
        proxy.uri()
    ))
    .unwrap();
    let response = handler.invoke(get(addr, "/echo"), options).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(proxy.heads().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_proxy_fails() {
    let addr = spawn_server().await;
    let dead = closed_addr().await;
    let handler = BridgeHandler::new().unwrap();

    let options = RequestOptions::from_json(&format!(r#"{{"proxy": "http://{dead}"}}"#)).unwrap();
    let err = handler
        .invoke(get(addr, "/echo"), options)
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Transport(_)), "unexpected error: {err}");
}
