//! Response handling.
//!
//! # Responsibilities
//! - Copy the primary backend's status, headers (every value, in order) and
//!   body onto the client response
//! - Map every orchestration failure to one generic 500 response
//!
//! # Design Decisions
//! - The client never sees backend identities or backend error text; only
//!   the status code and timing differ across failure kinds
//! - Failures are logged with their kind and request ID

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::proxy::{BackendResponse, OrchestrateError};

/// Body of every internal error response.
pub const INTERNAL_ERROR_MESSAGE: &str =
    "Unexpected issue proxying the request. Please try again later.";

/// Client response carrying the primary backend's response verbatim.
pub fn from_backend(primary: BackendResponse) -> Response {
    let mut response = Response::new(Body::from(primary.body));
    *response.status_mut() = primary.status;
    *response.headers_mut() = primary.headers;
    response
}

/// Uniform internal error response for `error`.
pub fn internal_error(request_id: &str, error: &OrchestrateError) -> Response {
    match error {
        // Already logged by the orchestrator.
        OrchestrateError::Cancelled | OrchestrateError::ProtocolViolation(_) => {
            tracing::debug!(request_id = %request_id, kind = error.kind(), "Responding with internal error");
        }
        OrchestrateError::BodyRead(source) => {
            tracing::error!(
                request_id = %request_id,
                kind = error.kind(),
                error = %source,
                "Something went wrong orchestrating the request"
            );
        }
        OrchestrateError::PrimaryBackend(source) => {
            tracing::error!(
                request_id = %request_id,
                kind = error.kind(),
                error = %source,
                "Something went wrong orchestrating the request"
            );
        }
    }

    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE).into_response()
}
