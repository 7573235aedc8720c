//! Background comparison of primary and secondary outcomes.
//!
//! # Responsibilities
//! - Wait for the primary outcome handed over by the orchestrator
//! - Wait for the secondary outcome, bounded by the comparison timeout and the
//!   shared sub-scope
//! - Classify the pair into a [`Verdict`] and hand a [`ComparisonRecord`] to
//!   every configured [`ComparisonSink`]
//! - Cancel the sub-scope once done, releasing the secondary call
//!
//! Nothing in here can reach the client: the comparator runs detached and is
//! never awaited by the request path.

use axum::http::{HeaderMap, HeaderName, Method};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::CompareConfig;
use crate::observability::metrics;
use crate::proxy::caller::{BackendError, BackendResponse, CallHandle, CallResult};
use crate::proxy::cancel::CancelScope;

/// Settled state of one backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Response(BackendResponse),
    Failure(BackendError),
    Cancelled,
    /// The caller closed the call without ever delivering a value.
    Closed,
}

impl From<CallResult> for Outcome {
    fn from(result: CallResult) -> Self {
        match result {
            Ok(response) => Outcome::Response(response),
            Err(error) => Outcome::Failure(error),
        }
    }
}

impl Outcome {
    fn describe(&self) -> String {
        match self {
            Outcome::Response(res) => format!("{} ({} bytes)", res.status, res.body.len()),
            Outcome::Failure(err) => format!("failed: {}", err),
            Outcome::Cancelled => "cancelled".to_string(),
            Outcome::Closed => "closed without a result".to_string(),
        }
    }
}

/// Classification of a primary/secondary pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Status, headers and body agree.
    Match,
    StatusMismatch,
    HeaderMismatch,
    BodyMismatch,
    /// Primary failed while the secondary answered.
    PrimaryFailed,
    /// Secondary failed while the primary answered.
    SecondaryFailed,
    BothFailed,
    /// The secondary did not settle within the comparison timeout.
    Skipped,
    /// One side was cancelled before settling.
    Cancelled,
    /// The primary caller closed its call without a result.
    ProtocolViolation,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Match => "match",
            Verdict::StatusMismatch => "status_mismatch",
            Verdict::HeaderMismatch => "header_mismatch",
            Verdict::BodyMismatch => "body_mismatch",
            Verdict::PrimaryFailed => "primary_failed",
            Verdict::SecondaryFailed => "secondary_failed",
            Verdict::BothFailed => "both_failed",
            Verdict::Skipped => "skipped",
            Verdict::Cancelled => "cancelled",
            Verdict::ProtocolViolation => "protocol_violation",
        }
    }

    pub fn is_divergent(&self) -> bool {
        !matches!(
            self,
            Verdict::Match | Verdict::Skipped | Verdict::Cancelled | Verdict::ProtocolViolation
        )
    }
}

/// Equality policy applied to two outcomes.
///
/// Status first, then body bytes, then headers (all values per name, in
/// order) minus the ignored names.
#[derive(Debug, Clone, Default)]
pub struct DiffPolicy {
    ignored_headers: HashSet<HeaderName>,
}

impl DiffPolicy {
    pub fn new(ignored_headers: impl IntoIterator<Item = HeaderName>) -> Self {
        Self {
            ignored_headers: ignored_headers.into_iter().collect(),
        }
    }

    /// Build from config. Names that are not valid header names are skipped;
    /// validation reports them at startup.
    pub fn from_config(config: &CompareConfig) -> Self {
        Self::new(
            config
                .ignored_headers
                .iter()
                .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok()),
        )
    }

    /// `None` for the secondary means it was not observed in time.
    pub fn verdict(&self, primary: &Outcome, secondary: Option<&Outcome>) -> Verdict {
        if *primary == Outcome::Closed {
            return Verdict::ProtocolViolation;
        }
        let secondary = match secondary {
            Some(outcome) => outcome,
            None => return Verdict::Skipped,
        };

        match (primary, secondary) {
            (Outcome::Closed, _) => Verdict::ProtocolViolation,
            (Outcome::Cancelled, _) | (_, Outcome::Cancelled | Outcome::Closed) => Verdict::Cancelled,
            (Outcome::Failure(_), Outcome::Failure(_)) => Verdict::BothFailed,
            (Outcome::Failure(_), Outcome::Response(_)) => Verdict::PrimaryFailed,
            (Outcome::Response(_), Outcome::Failure(_)) => Verdict::SecondaryFailed,
            (Outcome::Response(a), Outcome::Response(b)) => {
                if a.status != b.status {
                    Verdict::StatusMismatch
                } else if a.body != b.body {
                    Verdict::BodyMismatch
                } else if !self.headers_match(&a.headers, &b.headers) {
                    Verdict::HeaderMismatch
                } else {
                    Verdict::Match
                }
            }
        }
    }

    fn headers_match(&self, a: &HeaderMap, b: &HeaderMap) -> bool {
        let compared = |headers: &HeaderMap| -> HashSet<HeaderName> {
            headers
                .keys()
                .filter(|name| !self.ignored_headers.contains(*name))
                .cloned()
                .collect()
        };

        let names = compared(a);
        if names != compared(b) {
            return false;
        }
        names
            .iter()
            .all(|name| a.get_all(name).iter().eq(b.get_all(name).iter()))
    }
}

/// Identifies the request a comparison belongs to.
#[derive(Debug, Clone)]
pub struct ComparisonContext {
    pub request_id: Option<String>,
    pub method: Method,
    pub path: String,
}

/// One observed primary/secondary pair.
#[derive(Debug, Clone)]
pub struct ComparisonRecord {
    pub context: ComparisonContext,
    pub primary: Outcome,
    /// `None` when the secondary was abandoned after the comparison timeout.
    pub secondary: Option<Outcome>,
    pub verdict: Verdict,
    pub observed_at: SystemTime,
    /// Time spent waiting for the secondary after the primary settled.
    pub waited: Duration,
}

impl ComparisonRecord {
    pub fn observed_at_millis(&self) -> u128 {
        self.observed_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
    }
}

/// Receives comparison records. Implementations must not block.
pub trait ComparisonSink: Send + Sync + 'static {
    fn observe(&self, record: &ComparisonRecord);
}

/// Logs every record through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ComparisonSink for LogSink {
    fn observe(&self, record: &ComparisonRecord) {
        let request_id = record.context.request_id.as_deref().unwrap_or("-");
        let secondary = record
            .secondary
            .as_ref()
            .map(Outcome::describe)
            .unwrap_or_else(|| "not observed".to_string());

        if record.verdict.is_divergent() {
            tracing::info!(
                request_id = %request_id,
                method = %record.context.method,
                path = %record.context.path,
                verdict = record.verdict.as_str(),
                primary = %record.primary.describe(),
                secondary = %secondary,
                observed_at = record.observed_at_millis() as u64,
                "Backends diverged"
            );
        } else {
            tracing::debug!(
                request_id = %request_id,
                method = %record.context.method,
                path = %record.context.path,
                verdict = record.verdict.as_str(),
                waited_ms = record.waited.as_millis() as u64,
                "Comparison finished"
            );
        }
    }
}

/// Counts verdicts.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSink;

impl ComparisonSink for MetricsSink {
    fn observe(&self, record: &ComparisonRecord) {
        metrics::record_comparison(record.verdict.as_str());
    }
}

/// Spawns detached comparison tasks.
#[derive(Clone)]
pub struct Comparator {
    policy: Arc<DiffPolicy>,
    timeout: Duration,
    sinks: Vec<Arc<dyn ComparisonSink>>,
}

impl Comparator {
    /// Comparator with the default sinks ([`LogSink`] and [`MetricsSink`]).
    pub fn new(policy: DiffPolicy, timeout: Duration) -> Self {
        Self {
            policy: Arc::new(policy),
            timeout,
            sinks: vec![Arc::new(LogSink), Arc::new(MetricsSink)],
        }
    }

    /// Add another sink.
    pub fn with_sink(mut self, sink: Arc<dyn ComparisonSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Start the detached comparison for one request.
    ///
    /// `primary` delivers the primary outcome once the race is decided; a
    /// dropped sender counts as `Cancelled`. `scope` is cancelled when the
    /// task finishes.
    pub fn spawn(
        &self,
        context: ComparisonContext,
        primary: oneshot::Receiver<Outcome>,
        secondary: CallHandle,
        scope: CancelScope,
    ) -> JoinHandle<()> {
        let comparator = self.clone();
        tokio::spawn(async move {
            comparator.run(context, primary, secondary, scope).await;
        })
    }

    async fn run(
        &self,
        context: ComparisonContext,
        primary: oneshot::Receiver<Outcome>,
        secondary: CallHandle,
        scope: CancelScope,
    ) {
        let primary = primary.await.unwrap_or(Outcome::Cancelled);
        let started = Instant::now();

        let secondary = tokio::select! {
            biased;
            settled = secondary => Some(settled.map_or(Outcome::Cancelled, Outcome::from)),
            _ = scope.cancelled() => Some(Outcome::Cancelled),
            _ = tokio::time::sleep(self.timeout) => {
                tracing::debug!(
                    path = %context.path,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Secondary did not settle in time, comparison skipped"
                );
                None
            }
        };
        scope.cancel();

        let verdict = self.policy.verdict(&primary, secondary.as_ref());
        let record = ComparisonRecord {
            context,
            primary,
            secondary,
            verdict,
            observed_at: SystemTime::now(),
            waited: started.elapsed(),
        };

        for sink in &self.sinks {
            sink.observe(&record);
        }
    }
}

impl std::fmt::Debug for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Comparator")
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
