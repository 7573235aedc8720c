//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use shadow_proxy::proxy::{
    BackendCaller, BackendError, BackendResponse, BackendTarget, BackendTargets, CallHandle,
    ComparisonRecord, ComparisonSink, ForkedRequest,
};

/// A request as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Handle to a running mock backend.
#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.received.lock().unwrap().clone()
    }

    /// Poll until `count` requests arrived or `within` elapsed.
    pub async fn wait_for(&self, count: usize, within: Duration) -> Vec<ReceivedRequest> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let received = self.received();
            if received.len() >= count || tokio::time::Instant::now() >= deadline {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(status: u16, body: &'static str) -> MockBackend {
    start_programmable_backend(move |_| async move { (status, body.to_string()) }).await
}

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` sees each parsed request and produces the status and body to answer with.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn(ReceivedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let log = received.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    let log = log.clone();
                    tokio::spawn(async move {
                        let Some(request) = read_request(&mut socket).await else {
                            return;
                        };
                        log.lock().unwrap().push(request.clone());

                        let head_only = request.method == "HEAD";
                        let (status, body) = f(request).await;
                        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
                        let mut response_str = format!(
                            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nX-Backend: {}\r\nConnection: close\r\n\r\n",
                            status.as_u16(),
                            status.canonical_reason().unwrap_or("Unknown"),
                            body.len(),
                            addr.port(),
                        );
                        if !head_only {
                            response_str.push_str(&body);
                        }
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockBackend { addr, received }
}

async fn read_request(socket: &mut TcpStream) -> Option<ReceivedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(ReceivedRequest {
        method,
        path,
        headers,
        body,
    })
}

/// Targets that are never dialled; for tests driving a stub caller.
pub fn stub_targets() -> BackendTargets {
    BackendTargets {
        primary: BackendTarget::parse("http://primary.test:8081").unwrap(),
        secondary: BackendTarget::parse("http://secondary.test:8082").unwrap(),
    }
}

type OnCall = dyn Fn(&ForkedRequest) -> CallHandle + Send + Sync;

/// In-process caller that records every fork and answers through `on_call`.
pub struct StubCaller {
    calls: Mutex<Vec<ForkedRequest>>,
    on_call: Box<OnCall>,
}

impl StubCaller {
    pub fn new<F>(on_call: F) -> Arc<Self>
    where
        F: Fn(&ForkedRequest) -> CallHandle + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            on_call: Box::new(on_call),
        })
    }

    pub fn calls(&self) -> Vec<ForkedRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl BackendCaller for StubCaller {
    fn call(&self, request: ForkedRequest) -> CallHandle {
        let handle = (self.on_call)(&request);
        self.calls.lock().unwrap().push(request);
        handle
    }
}

pub fn ok(status: u16, body: &'static str) -> CallHandle {
    CallHandle::ready(Ok(BackendResponse::new(
        StatusCode::from_u16(status).unwrap(),
        body,
    )))
}

pub fn refused(request: &ForkedRequest) -> CallHandle {
    CallHandle::ready(Err(BackendError::Request {
        backend: request.backend,
        message: "connection refused".into(),
    }))
}

/// A call that only ends when its scope is cancelled, closing without a value.
pub fn hanging(request: &ForkedRequest) -> CallHandle {
    let (completer, handle) = CallHandle::channel();
    let scope = request.scope.clone();
    let backend = request.backend;
    tokio::spawn(async move {
        tokio::select! {
            _ = scope.cancelled() => drop(completer),
            _ = tokio::time::sleep(Duration::from_secs(60)) => {
                completer.complete(Err(BackendError::Timeout {
                    backend,
                    timeout: Duration::from_secs(60),
                }));
            }
        }
    });
    handle
}

/// A call that answers after `delay`.
pub fn delayed(delay: Duration, status: u16, body: &'static str) -> CallHandle {
    let (completer, handle) = CallHandle::channel();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        completer.complete(Ok(BackendResponse::new(
            StatusCode::from_u16(status).unwrap(),
            body,
        )));
    });
    handle
}

/// Sink forwarding every comparison record to a channel.
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<ComparisonRecord>,
}

impl RecordingSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ComparisonRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl ComparisonSink for RecordingSink {
    fn observe(&self, record: &ComparisonRecord) {
        let _ = self.tx.send(record.clone());
    }
}

/// Receive the next comparison record, failing the test after `within`.
pub async fn next_record(
    rx: &mut mpsc::UnboundedReceiver<ComparisonRecord>,
    within: Duration,
) -> ComparisonRecord {
    tokio::time::timeout(within, rx.recv())
        .await
        .expect("comparison record in time")
        .expect("sink channel open")
}

/// Start the proxy on an ephemeral port in front of the given backends.
pub async fn spawn_proxy(
    mut config: shadow_proxy::ProxyConfig,
) -> (SocketAddr, shadow_proxy::Shutdown) {
    config.listener.host = "127.0.0.1".into();
    config.listener.port = 0;

    let server = shadow_proxy::HttpServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = shadow_proxy::Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

/// Config mirroring from `primary` to `secondary`.
pub fn mirror_config(primary: &str, secondary: &str) -> shadow_proxy::ProxyConfig {
    let mut config = shadow_proxy::ProxyConfig::default();
    config.backends.primary_url = primary.to_string();
    config.backends.secondary_url = secondary.to_string();
    config
}

/// Address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
