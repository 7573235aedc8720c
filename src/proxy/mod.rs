//! Request orchestration engine.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → fork.rs (drain body, one ForkedRequest per backend)
//!     → caller.rs / http_caller.rs (primary and secondary in flight)
//!     → race.rs (primary outcome vs inbound cancellation)
//!     → client gets the primary outcome
//!     → compare.rs (detached: secondary outcome, verdict, sinks)
//! ```
//!
//! # Design Decisions
//! - The secondary never affects the client-visible result or its latency
//! - One cancellation sub-scope per request, shared by both forks and the
//!   comparator; the comparator always cancels it when done
//! - Backend targets are injected per orchestrator, no process-wide state

pub mod backend;
pub mod caller;
pub mod cancel;
pub mod compare;
pub mod error;
pub mod fork;
pub mod http_caller;
pub mod orchestrator;
pub mod race;

pub use backend::{BackendId, BackendTarget, BackendTargets, TargetError};
pub use caller::{BackendCaller, BackendError, BackendResponse, CallCompleter, CallHandle, CallResult, NoopCaller};
pub use cancel::CancelScope;
pub use compare::{Comparator, ComparisonRecord, ComparisonSink, DiffPolicy, Outcome, Verdict};
pub use error::OrchestrateError;
pub use fork::{BodyReadError, ForkedRequest, RequestSnapshot};
pub use http_caller::HttpCaller;
pub use orchestrator::Orchestrator;
