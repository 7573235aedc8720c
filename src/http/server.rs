//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router: liveness endpoint plus the mirroring handler
//! - Wire up middleware (request ID, tracing, request timeout)
//! - Serve a listener with graceful shutdown bounded by the grace period

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::get,
    Router,
};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::http::response;
use crate::observability::metrics;
use crate::proxy::{CancelScope, HttpCaller, Orchestrator, TargetError};

/// Path of the liveness endpoint.
pub const STATUS_PATH: &str = "/status";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// HTTP server for the mirroring proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a server that calls backends over HTTP.
    pub fn new(config: ProxyConfig) -> Result<Self, TargetError> {
        let caller = Arc::new(HttpCaller::new(&config.backends, &config.limits));
        let orchestrator = Orchestrator::from_config(&config, caller)?;
        Ok(Self::with_orchestrator(config, Arc::new(orchestrator)))
    }

    /// Create a server around an existing orchestrator.
    pub fn with_orchestrator(config: ProxyConfig, orchestrator: Arc<Orchestrator>) -> Self {
        tracing::info!(
            primary = %orchestrator.targets().primary,
            secondary = %orchestrator.targets().secondary,
            environment = %config.environment,
            "Mirroring configured"
        );
        let state = AppState { orchestrator };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route(STATUS_PATH, get(status_handler))
            .fallback(proxy_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(config.timeouts.request_budget()))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = request.request_id().unwrap_or("-"),
                )
            }))
            .layer(set_request_id_layer())
    }

    /// The router, for embedding or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve `listener` until `shutdown` fires, then drain in-flight requests
    /// for at most the configured grace period.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let grace = self.config.timeouts.shutdown_grace();
        tracing::info!(
            address = %addr,
            header_budget_ms = self.config.timeouts.header_budget().as_millis() as u64,
            request_budget_ms = self.config.timeouts.request_budget().as_millis() as u64,
            "HTTP server starting"
        );

        let (draining_tx, draining_rx) = oneshot::channel::<()>();
        let serve = axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining in-flight requests");
                let _ = draining_tx.send(());
            })
            .into_future();
        tokio::pin!(serve);

        tokio::select! {
            biased;
            result = &mut serve => {
                result?;
                tracing::info!("HTTP server stopped");
                return Ok(());
            }
            _ = draining_rx => {}
        }

        match tokio::time::timeout(grace, serve).await {
            Ok(result) => result?,
            Err(_) => tracing::warn!(
                grace_secs = grace.as_secs(),
                "Shutdown grace period elapsed, abandoning in-flight requests"
            ),
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Liveness endpoint; never touches the backends.
async fn status_handler() -> &'static str {
    "OK!\n"
}

/// Mirroring handler: orchestrates every request not matched elsewhere.
///
/// An embedding host may put a [`CancelScope`] into the request extensions
/// to cancel the exchange explicitly; dropping the handler future has the
/// same effect.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let request_id = request.request_id().unwrap_or("-").to_string();
    let inbound = request
        .extensions()
        .get::<CancelScope>()
        .cloned()
        .unwrap_or_default();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        "Orchestrating request start"
    );

    let response = match state.orchestrator.orchestrate(request, &inbound).await {
        Ok(primary) => response::from_backend(primary),
        Err(error) => response::internal_error(&request_id, &error),
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), started);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{
        BackendCaller, BackendError, BackendResponse, CallHandle, ForkedRequest, NoopCaller,
    };
    use crate::http::response::INTERNAL_ERROR_MESSAGE;
    use axum::http::{HeaderValue, StatusCode};
    use tower::ServiceExt;

    /// Answers every call from a fixed table keyed by backend.
    struct Scripted {
        primary: Result<BackendResponse, BackendError>,
        secondary: Result<BackendResponse, BackendError>,
    }

    impl BackendCaller for Scripted {
        fn call(&self, request: ForkedRequest) -> CallHandle {
            match request.backend {
                crate::proxy::BackendId::Primary => CallHandle::ready(self.primary.clone()),
                crate::proxy::BackendId::Secondary => CallHandle::ready(self.secondary.clone()),
            }
        }
    }

    fn server(caller: Arc<dyn BackendCaller>) -> HttpServer {
        let config = ProxyConfig::default();
        let orchestrator = Orchestrator::from_config(&config, caller).unwrap();
        HttpServer::with_orchestrator(config, Arc::new(orchestrator))
    }

    async fn body_of(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn status_endpoint_bypasses_orchestration() {
        let app = server(Arc::new(NoopCaller)).router();
        let response = app
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, b"OK!\n");
    }

    #[tokio::test]
    async fn primary_response_is_returned_with_request_id() {
        let mut primary = BackendResponse::new(StatusCode::OK, "from primary");
        primary.headers.insert("main-header", HeaderValue::from_static("YES"));
        let caller = Scripted {
            primary: Ok(primary),
            secondary: Ok(BackendResponse::new(StatusCode::BAD_REQUEST, "NOK!")),
        };

        let response = server(Arc::new(caller))
            .router()
            .oneshot(
                Request::post("/orders")
                    .header("x-request-id", "fixed-id")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["main-header"], "YES");
        assert_eq!(response.headers()["x-request-id"], "fixed-id");
        assert_eq!(body_of(response).await, b"from primary");
    }

    #[tokio::test]
    async fn primary_failure_maps_to_generic_500() {
        let caller = Scripted {
            primary: Err(BackendError::Request {
                backend: crate::proxy::BackendId::Primary,
                message: "connection refused".into(),
            }),
            secondary: Ok(BackendResponse::new(StatusCode::OK, "fine")),
        };

        let response = server(Arc::new(caller))
            .router()
            .oneshot(Request::get("/anything").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(body_of(response).await, INTERNAL_ERROR_MESSAGE.as_bytes());
    }

    #[tokio::test]
    async fn protocol_violation_maps_to_generic_500() {
        let response = server(Arc::new(NoopCaller))
            .router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(response).await, INTERNAL_ERROR_MESSAGE.as_bytes());
    }

    #[tokio::test]
    async fn oversized_body_maps_to_generic_500() {
        let mut config = ProxyConfig::default();
        config.limits.max_request_body_bytes = 4;
        let caller = Scripted {
            primary: Ok(BackendResponse::new(StatusCode::OK, "unused")),
            secondary: Ok(BackendResponse::new(StatusCode::OK, "unused")),
        };
        let orchestrator = Orchestrator::from_config(&config, Arc::new(caller)).unwrap();
        let app = HttpServer::with_orchestrator(config, Arc::new(orchestrator)).router();

        let response = app
            .oneshot(Request::put("/upload").body(Body::from("way too large")).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(server(Arc::new(NoopCaller)).run(listener, rx));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.send(()).unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("server should stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
