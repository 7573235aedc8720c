//! Backend caller contract.
//!
//! A [`BackendCaller`] issues one call per [`ForkedRequest`] and hands back a
//! [`CallHandle`] immediately. The handle resolves to exactly one
//! `Result<BackendResponse, BackendError>`, or to `None` if the caller gave up
//! without producing a value (e.g. the request scope was cancelled).
//!
//! A single one-shot result replaces a separate response/error channel pair,
//! so "both fired" cannot happen.

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::proxy::backend::BackendId;
use crate::proxy::fork::ForkedRequest;

/// A fully buffered backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BackendResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Failure of a single backend call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("could not build request for {backend}: {message}")]
    InvalidRequest { backend: BackendId, message: String },

    #[error("could not connect to {backend}: {message}")]
    Connect { backend: BackendId, message: String },

    #[error("request to {backend} failed: {message}")]
    Request { backend: BackendId, message: String },

    #[error("{backend} did not respond within {timeout:?}")]
    Timeout { backend: BackendId, timeout: Duration },

    #[error("reading {backend} response body failed: {message}")]
    Body { backend: BackendId, message: String },
}

impl BackendError {
    pub fn backend(&self) -> BackendId {
        match self {
            BackendError::InvalidRequest { backend, .. }
            | BackendError::Connect { backend, .. }
            | BackendError::Request { backend, .. }
            | BackendError::Timeout { backend, .. }
            | BackendError::Body { backend, .. } => *backend,
        }
    }
}

pub type CallResult = Result<BackendResponse, BackendError>;

/// Performs backend calls.
///
/// `call` must not block: implementations spawn the actual work and return
/// the handle right away. A call must settle its completer at most once; a
/// call that will never produce a value drops the completer.
pub trait BackendCaller: Send + Sync + 'static {
    fn call(&self, request: ForkedRequest) -> CallHandle;
}

/// Receiving side of a backend call.
#[derive(Debug)]
pub struct CallHandle {
    rx: oneshot::Receiver<CallResult>,
}

/// Sending side of a backend call. Dropping it without completing closes the
/// handle without a value.
#[derive(Debug)]
pub struct CallCompleter {
    tx: oneshot::Sender<CallResult>,
}

impl CallHandle {
    /// Create a connected completer/handle pair.
    pub fn channel() -> (CallCompleter, CallHandle) {
        let (tx, rx) = oneshot::channel();
        (CallCompleter { tx }, CallHandle { rx })
    }

    /// A handle that is already resolved with `result`.
    pub fn ready(result: CallResult) -> Self {
        let (completer, handle) = Self::channel();
        completer.complete(result);
        handle
    }

    /// A handle that is already closed without a value.
    pub fn closed() -> Self {
        let (_, handle) = Self::channel();
        handle
    }
}

impl Future for CallHandle {
    /// `None` when the caller closed the call without a result.
    type Output = Option<CallResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}

impl CallCompleter {
    /// Deliver the call's result. Returns false if nobody is listening anymore.
    pub fn complete(self, result: CallResult) -> bool {
        self.tx.send(result).is_ok()
    }
}

/// Caller that never produces a result: every handle closes immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCaller;

impl BackendCaller for NoopCaller {
    fn call(&self, _request: ForkedRequest) -> CallHandle {
        CallHandle::closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_handle_yields_result() {
        let handle = CallHandle::ready(Ok(BackendResponse::new(StatusCode::OK, "hi")));
        let result = handle.await.expect("value delivered").unwrap();
        assert_eq!(result.status, StatusCode::OK);
        assert_eq!(result.body, Bytes::from_static(b"hi"));
    }

    #[tokio::test]
    async fn dropped_completer_closes_handle_without_value() {
        let (completer, handle) = CallHandle::channel();
        drop(completer);
        assert!(handle.await.is_none());
        assert!(CallHandle::closed().await.is_none());
    }

    #[test]
    fn completing_after_handle_dropped_reports_false() {
        let (completer, handle) = CallHandle::channel();
        drop(handle);
        let err = BackendError::Request {
            backend: BackendId::Secondary,
            message: "refused".into(),
        };
        assert_eq!(err.backend(), BackendId::Secondary);
        assert!(!completer.complete(Err(err)));
    }
}
