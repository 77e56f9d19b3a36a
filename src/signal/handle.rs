//! In-process stop requests.
//!
//! A `StopHandle` is cloned into whatever needs to interrupt a running worker
//! (a Ctrl-C listener, a test, an embedding application). Each run consumes a
//! child of the handle's root token: `request` cancels the current run only,
//! `shutdown` cancels the root and therefore every run, present and future.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct StopHandle {
    root: CancellationToken,
    run: Arc<Mutex<CancellationToken>>,
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StopHandle {
    pub fn new() -> Self {
        let root = CancellationToken::new();
        let run = Arc::new(Mutex::new(root.child_token()));
        Self { root, run }
    }

    fn current(&self) -> MutexGuard<'_, CancellationToken> {
        self.run.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ask the current (or next) run to stop after the message it is handling.
    pub fn request(&self) {
        self.current().cancel();
    }

    /// Stop the current run and every later one.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.current().is_cancelled()
    }

    /// Token the next run checks for interrupts.
    pub fn token(&self) -> CancellationToken {
        self.current().clone()
    }

    /// Swap in a fresh token once a run has ended, so a request aimed at it
    /// does not leak into the next one.
    pub(crate) fn rearm(&self) {
        *self.current() = self.root.child_token();
    }
}

/// Idle wait that returns early when `token` is cancelled.
pub async fn idle_wait(token: &CancellationToken, duration: Duration) {
    if duration.is_zero() {
        tokio::task::yield_now().await;
        return;
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => {},
        _ = token.cancelled() => {},
    }
}
