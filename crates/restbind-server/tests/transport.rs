//! Tests over a real socket.

use std::time::Duration;

use restbind_core::{MethodParameter, Payload, RouteDefinition};
use restbind_server::{RestRouter, Server, ServerConfig, ShutdownSignal};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

async fn start(config: ServerConfig) -> (std::net::SocketAddr, ShutdownSignal, JoinHandle<()>) {
    let mut rest = RestRouter::new();
    rest.register(
        RouteDefinition::get("/hello/:name")
            .param(MethodParameter::path::<String>("name"))
            .returns::<String>()
            .blocking(|args| Ok(Payload::some(format!("hello {}", args.required::<String>("name")?))))
            .unwrap(),
    )
    .unwrap();
    rest.not_found_default();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let server = Server::new(rest, config);
    let handle = tokio::spawn(server.serve(listener, shutdown.clone()));
    (addr, shutdown, handle)
}

async fn exchange(addr: std::net::SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut received))
        .await
        .expect("response in time")
        .unwrap();
    String::from_utf8(received).unwrap()
}

async fn stop(shutdown: ShutdownSignal, handle: JoinHandle<()>) {
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server stops")
        .unwrap();
}

#[tokio::test]
async fn test_request_is_dispatched_over_http() {
    let config = ServerConfig::builder().shutdown_timeout(Duration::from_millis(200)).build();
    let (addr, shutdown, handle) = start(config).await;

    let response = exchange(addr, "GET /hello/ada HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("hello ada"), "{response}");

    let response = exchange(addr, "GET /missing HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");

    stop(shutdown, handle).await;
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let config = ServerConfig::builder()
        .max_body_bytes(8)
        .shutdown_timeout(Duration::from_millis(200))
        .build();
    let (addr, shutdown, handle) = start(config).await;

    let body = "x".repeat(32);
    let raw = format!(
        "POST /hello/ada HTTP/1.1\r\nHost: test\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    let response = exchange(addr, &raw).await;
    assert!(response.starts_with("HTTP/1.1 413"), "{response}");

    stop(shutdown, handle).await;
}
