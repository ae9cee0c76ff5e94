//! Cooperative cancellation utilities.
//!
//! A [`CancelSignal`] is shared between the orchestrator and its shard tasks. Each
//! fetch run gets a fresh signal; the binary additionally registers a process-wide
//! signal fired on Ctrl+C that fetchers built with
//! [`with_shutdown`](crate::pagination::PaginationFetcher::with_shutdown) follow.

use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared handle to a cancellation signal.
pub type SharedCancel = Arc<CancelSignal>;

static GLOBAL_SHUTDOWN: OnceCell<SharedCancel> = OnceCell::new();

/// Register the process-wide shutdown signal so subsystems can discover it lazily.
pub fn set_global_shutdown(handle: SharedCancel) {
    let _ = GLOBAL_SHUTDOWN.set(handle);
}

/// Retrieve the registered process-wide shutdown signal, if any.
pub fn get_global_shutdown() -> Option<SharedCancel> {
    GLOBAL_SHUTDOWN.get().cloned()
}

/// One-shot cancellation flag that async tasks can wait on.
#[derive(Debug, Default)]
pub struct CancelSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    /// Create a new, unfired signal.
    pub fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Create a new signal wrapped in [`Arc`].
    pub fn shared() -> SharedCancel {
        Arc::new(Self::new())
    }

    /// Fire the signal. Waiters are woken exactly once; later calls are no-ops.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether the signal has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register interest before checking the flag so a cancel() landing in
        // between is not missed.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Fire `self` when `upstream` fires, until `self` fires on its own.
    ///
    /// Spawns a small watcher task; it exits as soon as either signal fires.
    pub fn follow(self: &Arc<Self>, upstream: SharedCancel) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = upstream.cancelled() => this.cancel(),
                _ = this.cancelled() => {}
            }
        });
    }
}
