//! Cancellation scopes.
//!
//! A [`CancelScope`] is a cloneable, one-way cancellation signal. The inbound
//! request carries one; the orchestrator creates a second, shared "sub-scope"
//! that both forks and the comparator observe.

use std::sync::Arc;
use tokio::sync::watch;

/// A cloneable cancellation signal backed by a watch channel.
///
/// All clones observe the same state. Cancelling is idempotent and cannot be
/// undone.
#[derive(Debug, Clone)]
pub struct CancelScope {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelScope {
    /// Create a new, live scope.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Cancel the scope, waking every task waiting in [`cancelled`](Self::cancelled).
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once the scope has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves when the scope is cancelled. Resolves immediately if it already is.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Returns a guard that cancels this scope when dropped, unless disarmed.
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop {
            scope: Some(self.clone()),
        }
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancels its scope on drop.
///
/// Held across the await points of a future so that dropping the future
/// (client gone, server timeout) tears down everything bound to the scope.
#[derive(Debug)]
#[must_use = "dropping the guard cancels the scope immediately"]
pub struct CancelOnDrop {
    scope: Option<CancelScope>,
}

impl CancelOnDrop {
    /// Release the scope without cancelling it.
    pub fn disarm(mut self) {
        self.scope = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(scope) = self.scope.take() {
            scope.cancel();
        }
    }
}
