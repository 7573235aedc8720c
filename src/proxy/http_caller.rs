//! Backend caller over HTTP/1.1 using the hyper-util client.
//!
//! Each call runs in its own task and races the network exchange against the
//! fork's cancellation scope. A cancelled call drops its completer, so the
//! handle closes without a value.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Request};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::time::{Duration, Instant};

use crate::config::{BackendsConfig, LimitsConfig};
use crate::observability::metrics;
use crate::proxy::caller::{BackendCaller, BackendError, BackendResponse, CallHandle, CallResult};
use crate::proxy::fork::ForkedRequest;

/// Headers that describe a single hop and are never forwarded.
const HOP_BY_HOP: [header::HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Calls backends over plain HTTP.
#[derive(Clone)]
pub struct HttpCaller {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
    max_response_bytes: usize,
}

impl HttpCaller {
    pub fn new(backends: &BackendsConfig, limits: &LimitsConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_millis(backends.connect_timeout_ms)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            timeout: Duration::from_millis(backends.call_timeout_ms),
            max_response_bytes: limits.max_response_body_bytes,
        }
    }

    async fn execute(&self, request: ForkedRequest) -> CallResult {
        let backend = request.backend;
        let upstream = build_upstream_request(request)?;

        let exchange = async {
            let response = self
                .client
                .request(upstream)
                .await
                .map_err(|e| {
                    if e.is_connect() {
                        BackendError::Connect {
                            backend,
                            message: e.to_string(),
                        }
                    } else {
                        BackendError::Request {
                            backend,
                            message: e.to_string(),
                        }
                    }
                })?;

            let (parts, body) = response.into_parts();
            let body = axum::body::to_bytes(Body::new(body), self.max_response_bytes)
                .await
                .map_err(|e| BackendError::Body {
                    backend,
                    message: e.to_string(),
                })?;

            let mut headers = parts.headers;
            strip_hop_by_hop(&mut headers);

            Ok::<_, BackendError>(BackendResponse {
                status: parts.status,
                headers,
                body,
            })
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                backend,
                timeout: self.timeout,
            }),
        }
    }
}

impl BackendCaller for HttpCaller {
    fn call(&self, request: ForkedRequest) -> CallHandle {
        let (completer, handle) = CallHandle::channel();
        let caller = self.clone();

        tokio::spawn(async move {
            let backend = request.backend;
            let scope = request.scope.clone();
            let started = Instant::now();

            tokio::select! {
                biased;
                _ = scope.cancelled() => {
                    tracing::debug!(backend = %backend, "Backend call cancelled");
                    metrics::record_backend_call(backend.as_str(), "cancelled", started);
                }
                result = caller.execute(request) => {
                    let label = match &result {
                        Ok(_) => "ok",
                        Err(BackendError::Timeout { .. }) => "timeout",
                        Err(_) => "error",
                    };
                    if let Err(e) = &result {
                        tracing::debug!(backend = %backend, error = %e, "Backend call failed");
                    }
                    metrics::record_backend_call(backend.as_str(), label, started);
                    completer.complete(result);
                }
            }
        });

        handle
    }
}

/// Turn a fork into the request sent on the wire: absolute URI on the
/// backend, `Host` rewritten to the backend, hop-by-hop headers removed.
fn build_upstream_request(request: ForkedRequest) -> Result<Request<Body>, BackendError> {
    let backend = request.backend;
    let invalid = |message: String| BackendError::InvalidRequest { backend, message };

    let uri = request.upstream_uri().map_err(|e| invalid(e.to_string()))?;
    let host = HeaderValue::from_str(request.target.authority().as_str())
        .map_err(|e| invalid(e.to_string()))?;

    let mut upstream = Request::new(Body::from(request.body));
    *upstream.method_mut() = request.method;
    *upstream.uri_mut() = uri;
    *upstream.headers_mut() = request.headers;

    let headers = upstream.headers_mut();
    strip_hop_by_hop(headers);
    headers.insert(header::HOST, host);

    Ok(upstream)
}
