//! Observability subsystem.
//!
//! ```text
//! http::server ─┐
//! proxy::*     ─┼─→ logging.rs (tracing subscriber, pretty or JSON)
//! comparator   ─┘   metrics.rs (request, backend call and verdict counters)
//!                       → Prometheus scrape endpoint (when enabled)
//! ```
//!
//! Divergences between the backends surface here only: as `info` log events
//! from the comparator's log sink and as `shadow_comparisons_total` samples.

pub mod logging;
pub mod metrics;
