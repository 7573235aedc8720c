//! End-to-end request orchestration.
//!
//! ```text
//! inbound request
//!     → RequestSnapshot::capture (drain body once)
//!     → fork × 2 (primary, secondary) bound to one sub-scope
//!     → caller.call × 2 (both in flight before racing)
//!     → comparator spawned (detached)
//!     → race_primary(primary, inbound)
//!     → primary outcome handed to the comparator, result returned
//! ```

use axum::body::Body;
use axum::http::Request;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::config::ProxyConfig;
use crate::http::request::RequestIdExt;
use crate::proxy::backend::{BackendId, BackendTargets, BackendTarget, TargetError};
use crate::proxy::caller::{BackendCaller, BackendResponse};
use crate::proxy::cancel::CancelScope;
use crate::proxy::compare::{Comparator, ComparisonContext, DiffPolicy, Outcome};
use crate::proxy::error::OrchestrateError;
use crate::proxy::fork::RequestSnapshot;
use crate::proxy::race::{race_primary, RaceOutcome};

/// Mirrors requests to a primary and a secondary backend.
///
/// Holds no per-request state; share it behind an `Arc` and call
/// [`orchestrate`](Self::orchestrate) concurrently.
pub struct Orchestrator {
    caller: Arc<dyn BackendCaller>,
    targets: BackendTargets,
    comparator: Comparator,
    max_body_bytes: usize,
}

impl Orchestrator {
    pub fn new(
        caller: Arc<dyn BackendCaller>,
        targets: BackendTargets,
        comparator: Comparator,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            caller,
            targets,
            comparator,
            max_body_bytes,
        }
    }

    /// Build an orchestrator from configuration with the default comparator sinks.
    pub fn from_config(config: &ProxyConfig, caller: Arc<dyn BackendCaller>) -> Result<Self, TargetError> {
        let targets = BackendTargets {
            primary: BackendTarget::parse(&config.backends.primary_url)?,
            secondary: BackendTarget::parse(&config.backends.secondary_url)?,
        };
        let comparator = Comparator::new(
            DiffPolicy::from_config(&config.compare),
            config.timeouts.comparison_timeout(),
        );
        Ok(Self::new(caller, targets, comparator, config.limits.max_request_body_bytes))
    }

    pub fn targets(&self) -> &BackendTargets {
        &self.targets
    }

    /// Mirror `request` and return the primary backend's response.
    ///
    /// Returns as soon as the primary settles or `inbound` is cancelled; the
    /// secondary never delays or alters the result. Dropping the returned
    /// future before it resolves is treated like inbound cancellation.
    pub async fn orchestrate(
        &self,
        request: Request<Body>,
        inbound: &CancelScope,
    ) -> Result<BackendResponse, OrchestrateError> {
        let context = ComparisonContext {
            request_id: request.request_id().map(str::to_string),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
        };

        // The body may still be streaming in; cancellation must not wait for it.
        let snapshot = tokio::select! {
            biased;
            _ = inbound.cancelled() => {
                tracing::debug!(
                    request_id = context.request_id.as_deref().unwrap_or("-"),
                    "Inbound request cancelled while reading the body"
                );
                return Err(OrchestrateError::Cancelled);
            }
            captured = RequestSnapshot::capture(request, self.max_body_bytes) => captured?,
        };

        let sub_scope = CancelScope::new();
        let teardown = sub_scope.drop_guard();

        let primary = self.caller.call(snapshot.fork(
            BackendId::Primary,
            self.targets.get(BackendId::Primary),
            &sub_scope,
        ));
        let secondary = self.caller.call(snapshot.fork(
            BackendId::Secondary,
            self.targets.get(BackendId::Secondary),
            &sub_scope,
        ));

        let (report, primary_outcome) = oneshot::channel();
        self.comparator
            .spawn(context.clone(), primary_outcome, secondary, sub_scope.clone());

        tracing::debug!(
            request_id = context.request_id.as_deref().unwrap_or("-"),
            method = %snapshot.method(),
            path = %context.path,
            body_bytes = snapshot.body().len(),
            "Forks dispatched"
        );

        match race_primary(primary, inbound).await {
            RaceOutcome::Settled(Ok(response)) => {
                teardown.disarm();
                let _ = report.send(Outcome::Response(response.clone()));
                Ok(response)
            }
            RaceOutcome::Settled(Err(error)) => {
                teardown.disarm();
                tracing::warn!(
                    request_id = context.request_id.as_deref().unwrap_or("-"),
                    error = %error,
                    "Primary backend failed"
                );
                let _ = report.send(Outcome::Failure(error.clone()));
                Err(OrchestrateError::PrimaryBackend(error))
            }
            RaceOutcome::Cancelled => {
                tracing::debug!(
                    request_id = context.request_id.as_deref().unwrap_or("-"),
                    "Inbound request cancelled, tearing down forks"
                );
                sub_scope.cancel();
                let _ = report.send(Outcome::Cancelled);
                drop(teardown);
                Err(OrchestrateError::Cancelled)
            }
            RaceOutcome::Closed => {
                teardown.disarm();
                tracing::error!(
                    request_id = context.request_id.as_deref().unwrap_or("-"),
                    backend = %BackendId::Primary,
                    "Backend caller closed without a result"
                );
                let _ = report.send(Outcome::Closed);
                Err(OrchestrateError::ProtocolViolation(BackendId::Primary))
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("targets", &self.targets)
            .field("comparator", &self.comparator)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}
