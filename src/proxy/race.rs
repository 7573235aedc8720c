//! Race selector: primary outcome versus inbound cancellation.
//!
//! Event driven over two sources. The primary [`CallHandle`] covers both the
//! response and the error case; the inbound [`CancelScope`] covers client
//! disconnects and parent timeouts. Whichever fires first decides the
//! client-visible result. When both are ready at once, cancellation wins.

use crate::proxy::caller::{CallHandle, CallResult};
use crate::proxy::cancel::CancelScope;

/// How the race was decided.
#[derive(Debug)]
pub enum RaceOutcome {
    /// The primary call settled with a response or an error.
    Settled(CallResult),
    /// The inbound scope was cancelled first.
    Cancelled,
    /// The primary handle closed without ever delivering a value.
    Closed,
}

/// Wait for the primary call or inbound cancellation, whichever comes first.
pub async fn race_primary(primary: CallHandle, inbound: &CancelScope) -> RaceOutcome {
    tokio::select! {
        biased;
        _ = inbound.cancelled() => RaceOutcome::Cancelled,
        settled = primary => match settled {
            Some(result) => RaceOutcome::Settled(result),
            None => RaceOutcome::Closed,
        },
    }
}
