//! Request cloning.
//!
//! The inbound body is read once into memory; every fork gets its own handle
//! to the same bytes, so each backend call can consume its copy
//! independently. Method, URI path and query, and headers are carried over
//! verbatim. Only the destination differs between forks.

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, Uri};
use thiserror::Error;

use crate::proxy::backend::{BackendId, BackendTarget};
use crate::proxy::cancel::CancelScope;

/// The inbound body could not be materialised.
#[derive(Debug, Error)]
pub enum BodyReadError {
    #[error("request body exceeds the limit of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    Read(#[source] axum::Error),
}

/// Immutable copy of an inbound request with its body fully drained.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl RequestSnapshot {
    /// Drain `request` into memory, refusing bodies larger than `max_body_bytes`.
    pub async fn capture(request: Request<Body>, max_body_bytes: usize) -> Result<Self, BodyReadError> {
        let (parts, body) = request.into_parts();

        // Reject early when the client announces an oversized body.
        let declared = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if matches!(declared, Some(len) if len > max_body_bytes) {
            return Err(BodyReadError::TooLarge { limit: max_body_bytes });
        }

        let body = axum::body::to_bytes(body, max_body_bytes)
            .await
            .map_err(BodyReadError::Read)?;

        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Produce the copy destined for `backend`, bound to the shared `scope`.
    pub fn fork(&self, backend: BackendId, target: &BackendTarget, scope: &CancelScope) -> ForkedRequest {
        ForkedRequest {
            backend,
            target: target.clone(),
            method: self.method.clone(),
            uri: self.uri.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            scope: scope.clone(),
        }
    }
}

/// One outbound copy of an inbound request.
#[derive(Debug, Clone)]
pub struct ForkedRequest {
    pub backend: BackendId,
    pub target: BackendTarget,
    pub method: Method,
    /// The URI as received (origin-form); use [`upstream_uri`](Self::upstream_uri)
    /// for the rewritten destination.
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Shared sub-request scope; cancelled when the request is torn down.
    pub scope: CancelScope,
}

impl ForkedRequest {
    /// The absolute URI pointing at this fork's backend.
    pub fn upstream_uri(&self) -> Result<Uri, axum::http::Error> {
        self.target.uri_for(self.uri.path_and_query())
    }
}
