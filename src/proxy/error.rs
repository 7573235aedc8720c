//! Errors surfaced by the orchestration engine.

use thiserror::Error;

use crate::proxy::backend::BackendId;
use crate::proxy::caller::BackendError;
use crate::proxy::fork::BodyReadError;

#[derive(Debug, Error)]
pub enum OrchestrateError {
    /// The inbound body could not be drained; no backend was called.
    #[error("failed to read inbound request body")]
    BodyRead(#[from] BodyReadError),

    /// The primary backend call failed.
    #[error("primary backend failed")]
    PrimaryBackend(#[source] BackendError),

    /// The inbound request was cancelled before the primary settled.
    #[error("orchestration cancelled")]
    Cancelled,

    /// A backend caller closed its call without delivering a result.
    #[error("{0} backend caller closed without delivering a result")]
    ProtocolViolation(BackendId),
}

impl OrchestrateError {
    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestrateError::BodyRead(_) => "body_read",
            OrchestrateError::PrimaryBackend(_) => "primary_backend",
            OrchestrateError::Cancelled => "cancelled",
            OrchestrateError::ProtocolViolation(_) => "protocol_violation",
        }
    }
}
