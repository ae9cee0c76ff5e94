//! Fetch lifecycle status and progress
//!
//! Status is published with replay of the current value: a new subscriber first
//! sees the status at the time it subscribed, then every later transition.
//! Progress is a plain broadcast without replay.

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

/// Buffered status transitions per subscriber
pub const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Buffered progress events per subscriber
pub const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Fetch lifecycle status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FetchStatus {
    /// No fetch running
    #[default]
    Idle,
    /// A fetch is running
    Fetching,
    /// Every shard was processed (placeholders included)
    Completed,
    /// The pipeline itself failed
    Failed(String),
    /// The fetch was cancelled
    Cancelled,
}

impl FetchStatus {
    /// Whether the status ends a fetch
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FetchStatus::Completed | FetchStatus::Failed(_) | FetchStatus::Cancelled
        )
    }
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStatus::Idle => write!(f, "idle"),
            FetchStatus::Fetching => write!(f, "fetching"),
            FetchStatus::Completed => write!(f, "completed"),
            FetchStatus::Failed(error) => write!(f, "failed: {error}"),
            FetchStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Progress snapshot emitted after every shard completes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct FetchProgress {
    /// Records received so far, first page included
    pub processed: usize,
    /// Total records reported by the first page
    pub total: usize,
    /// Shards finished (success or placeholder)
    pub completed_shards: usize,
    /// Shards planned
    pub total_shards: usize,
    /// Shards replaced by a placeholder
    pub failed_shards: usize,
    /// `processed * 100 / total`, 0 when total is 0
    pub percentage: f64,
}

impl FetchProgress {
    /// Build a snapshot; the percentage is derived from the record counts
    pub fn new(
        processed: usize,
        total: usize,
        completed_shards: usize,
        total_shards: usize,
        failed_shards: usize,
    ) -> Self {
        let percentage = if total > 0 {
            processed as f64 * 100.0 / total as f64
        } else {
            0.0
        };
        Self {
            processed,
            total,
            completed_shards,
            total_shards,
            failed_shards,
            percentage,
        }
    }

    /// Whether every planned shard has finished
    pub fn is_complete(&self) -> bool {
        self.completed_shards >= self.total_shards
    }

    /// Human-readable progress string for logging
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] Fetched {}/{} records - {:.1}% complete ({}/{} shards)",
            self.processed, self.total, self.percentage, self.completed_shards, self.total_shards
        )];
        if self.failed_shards > 0 {
            parts.push(format!("- {} failed", self.failed_shards));
        }
        parts.join(" ")
    }
}

/// Current status plus a broadcast of transitions
pub(crate) struct StatusChannel {
    current: Mutex<FetchStatus>,
    tx: broadcast::Sender<FetchStatus>,
}

impl StatusChannel {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            current: Mutex::new(FetchStatus::Idle),
            tx,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FetchStatus> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn get(&self) -> FetchStatus {
        self.lock().clone()
    }

    /// Subscribe under the lock so no transition falls between snapshot and receiver
    pub(crate) fn subscribe(&self) -> StatusSubscription {
        let current = self.lock();
        StatusSubscription {
            initial: Some(current.clone()),
            rx: self.tx.subscribe(),
        }
    }

    /// Move to `next` if `allowed` accepts the current status
    ///
    /// Returns the status that blocked the transition otherwise.
    pub(crate) fn transition<F>(&self, allowed: F, next: FetchStatus) -> Result<(), FetchStatus>
    where
        F: FnOnce(&FetchStatus) -> bool,
    {
        let mut current = self.lock();
        if !allowed(&current) {
            return Err(current.clone());
        }
        *current = next.clone();
        // No receivers is fine
        let _ = self.tx.send(next);
        Ok(())
    }
}

/// Status observer: yields the status at subscription time, then each transition
pub struct StatusSubscription {
    initial: Option<FetchStatus>,
    rx: broadcast::Receiver<FetchStatus>,
}

impl StatusSubscription {
    /// Next status; `None` once the fetcher is dropped and the backlog drained
    pub async fn recv(&mut self) -> Option<FetchStatus> {
        if let Some(status) = self.initial.take() {
            return Some(status);
        }
        loop {
            match self.rx.recv().await {
                Ok(status) => return Some(status),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Status subscriber lagged, transitions skipped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next status if one is already available
    pub fn try_recv(&mut self) -> Option<FetchStatus> {
        if let Some(status) = self.initial.take() {
            return Some(status);
        }
        loop {
            match self.rx.try_recv() {
                Ok(status) => return Some(status),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Status subscriber lagged, transitions skipped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain everything currently available
    pub fn drain(&mut self) -> Vec<FetchStatus> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Convert into a [`Stream`] of statuses
    pub fn into_stream(self) -> impl Stream<Item = FetchStatus> + Send + Unpin {
        Box::pin(futures_util::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|status| (status, subscription))
        }))
    }
}
