//! Bounded-concurrency fetch orchestrator
//!
//! Drives one fetch run end to end:
//!
//! 1. Page 1 is fetched through the retry policy to learn the total record count
//! 2. The rest of the range is planned with [`calculate_shards`]
//! 3. Each shard runs as its own task; at most `concurrency` are in flight
//! 4. A shard that exhausts its retries is replaced by a failure-flagged placeholder
//! 5. The aggregation loop is the only writer of the accumulator and progress
//!
//! One fetch runs per instance at a time. Independent instances share nothing.

use crate::fetcher::{FetcherError, FetcherResult, PageSource, RetryPolicy};
use crate::metrics::{self, FetchMetrics};
use crate::pagination::config::{DataFetchConfig, ResultOrder};
use crate::pagination::shard::{calculate_shards, DataShard};
use crate::pagination::status::{
    FetchProgress, FetchStatus, StatusChannel, StatusSubscription, PROGRESS_CHANNEL_CAPACITY,
};
use crate::pagination::{FetchError, FetchOutcome, PageOutcome};
use crate::shutdown::{self, CancelSignal, SharedCancel};
use crate::{PageRequest, PageResponse, RequestKind};
use futures_util::stream::{self, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Pull every record out of a paginated [`PageSource`]
pub struct PaginationFetcher<T> {
    source: Arc<dyn PageSource<T>>,
    config: DataFetchConfig,
    kind: RequestKind,
    update_time: i64,
    shutdown: Option<SharedCancel>,
    status: StatusChannel,
    progress_tx: broadcast::Sender<FetchProgress>,
    progress: Mutex<FetchProgress>,
    current_run: Mutex<Option<SharedCancel>>,
}

/// A shard's final page: fetched, or a placeholder after exhausted retries
type ShardPage<T> = (DataShard, PageResponse<T>);

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T> PaginationFetcher<T>
where
    T: Send + 'static,
{
    /// Create a fetcher over `source`
    ///
    /// Picks up the process-wide shutdown signal if one is registered.
    ///
    /// # Errors
    /// [`FetchError::InvalidConfig`] if `config` fails validation
    pub fn new<S>(source: S, config: DataFetchConfig) -> Result<Self, FetchError>
    where
        S: PageSource<T> + 'static,
    {
        Self::from_shared(Arc::new(source), config)
    }

    /// Create a fetcher over a source the caller keeps a handle to
    pub fn from_shared(
        source: Arc<dyn PageSource<T>>,
        config: DataFetchConfig,
    ) -> Result<Self, FetchError> {
        config.validate()?;
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);

        Ok(Self {
            source,
            config,
            kind: RequestKind::default(),
            update_time: 0,
            shutdown: shutdown::get_global_shutdown(),
            status: StatusChannel::new(),
            progress_tx,
            progress: Mutex::new(FetchProgress::default()),
            current_run: Mutex::new(None),
        })
    }

    /// Set which library the page requests target
    pub fn with_request_kind(mut self, kind: RequestKind) -> Self {
        self.kind = kind;
        self
    }

    /// Only fetch records updated after `update_time` (Unix millis, 0 = everything)
    pub fn with_update_time(mut self, update_time: i64) -> Self {
        self.update_time = update_time;
        self
    }

    /// Attach a shared shutdown signal; firing it cancels the running fetch
    pub fn with_shutdown(mut self, shutdown: SharedCancel) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &DataFetchConfig {
        &self.config
    }

    /// Current lifecycle status
    pub fn status(&self) -> FetchStatus {
        self.status.get()
    }

    /// Last progress snapshot of the current or most recent run
    pub fn current_progress(&self) -> FetchProgress {
        *lock(&self.progress)
    }

    /// Observe status: the current value first, then every transition
    pub fn subscribe_status(&self) -> StatusSubscription {
        self.status.subscribe()
    }

    /// Observe progress events emitted from now on
    pub fn subscribe_progress(&self) -> broadcast::Receiver<FetchProgress> {
        self.progress_tx.subscribe()
    }

    /// Cancel the running fetch
    ///
    /// Fires the run's cancellation signal and moves `Fetching` to `Cancelled`.
    /// Safe to call in any state; extra calls do nothing.
    pub fn cancel(&self) {
        let mut current_run = lock(&self.current_run);
        if let Some(run) = current_run.take() {
            run.cancel();
        }
        if self
            .status
            .transition(|s| *s == FetchStatus::Fetching, FetchStatus::Cancelled)
            .is_ok()
        {
            info!(kind = %self.kind, "Fetch cancellation requested");
        }
    }

    /// Return a finished fetcher to `Idle` so it can fetch again
    ///
    /// # Errors
    /// [`FetchError::AlreadyInProgress`] while a fetch is running
    pub fn reset(&self) -> Result<(), FetchError> {
        let _current_run = lock(&self.current_run);
        match self
            .status
            .transition(|s| s.is_terminal(), FetchStatus::Idle)
        {
            Ok(()) => {
                *lock(&self.progress) = FetchProgress::default();
                debug!("Fetcher reset to idle");
                Ok(())
            }
            Err(FetchStatus::Fetching) => Err(FetchError::AlreadyInProgress),
            Err(_) => Ok(()),
        }
    }

    /// Fetch every page
    ///
    /// # Returns
    /// Page 1 data followed by shard data in the configured [`ResultOrder`], plus
    /// per-page success flags. Status ends `Completed` even when pages failed;
    /// check [`FetchOutcome::failed_pages`].
    ///
    /// Dropping the returned future before it resolves (a timeout, a losing
    /// `select!` branch) cancels the run and leaves the status `Cancelled`.
    ///
    /// # Errors
    /// - [`FetchError::AlreadyInProgress`] if a fetch is running (it is left alone)
    /// - [`FetchError::NotIdle`] if the last fetch ended and [`reset`](Self::reset)
    ///   was not called
    /// - [`FetchError::Cancelled`] if the fetch was cancelled
    /// - [`FetchError::Pipeline`] if a shard task died; status becomes `Failed`
    pub async fn fetch_all_data(&self) -> Result<FetchOutcome<T>, FetchError> {
        let mut guard = RunGuard {
            fetcher: self,
            run: self.begin()?,
            metrics: FetchMetrics::start(self.kind),
            finished: false,
        };
        let span = info_span!(
            "fetch_all",
            kind = %self.kind,
            update_time = self.update_time,
            page_size = self.config.base_page_size,
            concurrency = self.config.concurrency
        );

        let result = self.run(&guard.run).instrument(span).await;
        guard.finish();
        let metrics = &guard.metrics;

        match result {
            Ok(outcome) => {
                let completed = self
                    .status
                    .transition(|s| *s == FetchStatus::Fetching, FetchStatus::Completed);
                if completed.is_err() {
                    metrics.record_cancelled();
                    return Err(FetchError::Cancelled);
                }
                metrics.record_completed(outcome.data.len(), outcome.failed_pages().len());
                Ok(outcome)
            }
            Err(FetchError::Cancelled) => {
                let _ = self
                    .status
                    .transition(|s| *s == FetchStatus::Fetching, FetchStatus::Cancelled);
                metrics.record_cancelled();
                Err(FetchError::Cancelled)
            }
            Err(FetchError::Pipeline(message)) => {
                error!(error = %message, "Fetch pipeline failed");
                let _ = self.status.transition(
                    |s| *s == FetchStatus::Fetching,
                    FetchStatus::Failed(message.clone()),
                );
                metrics.record_failed(&message);
                Err(FetchError::Pipeline(message))
            }
            Err(other) => Err(other),
        }
    }

    /// Claim the fetcher for a new run
    fn begin(&self) -> Result<SharedCancel, FetchError> {
        let mut current_run = lock(&self.current_run);
        self.status
            .transition(|s| *s == FetchStatus::Idle, FetchStatus::Fetching)
            .map_err(|blocked| match blocked {
                FetchStatus::Fetching => FetchError::AlreadyInProgress,
                other => FetchError::NotIdle(other),
            })?;

        let run = CancelSignal::shared();
        if let Some(shutdown) = &self.shutdown {
            if shutdown.is_cancelled() {
                run.cancel();
            } else {
                run.follow(Arc::clone(shutdown));
            }
        }
        *current_run = Some(Arc::clone(&run));
        *lock(&self.progress) = FetchProgress::default();
        Ok(run)
    }

    /// Publish a progress snapshot unless the run was cancelled
    fn publish_progress(&self, run: &CancelSignal, progress: FetchProgress) {
        // cancel() fires the signal under this lock, so nothing is sent after it returns
        let _current_run = lock(&self.current_run);
        if run.is_cancelled() {
            return;
        }
        *lock(&self.progress) = progress;
        let _ = self.progress_tx.send(progress);
        debug!("{}", progress.format_progress());
    }

    async fn run(&self, run: &SharedCancel) -> Result<FetchOutcome<T>, FetchError> {
        let policy = self.config.retry_policy();
        let first_request =
            PageRequest::first_page(self.kind, self.update_time, self.config.base_page_size);

        info!("Fetching first page");
        let first_page = match fetch_with_retry(&self.source, policy, &first_request, run).await {
            Ok(page) => page,
            Err(FetcherError::Cancelled) => return Err(FetchError::Cancelled),
            Err(e) => {
                warn!(error = %e, "First page failed after retries, completing with no data");
                PageResponse::failed(0, first_request.start_index, 0)
            }
        };

        let total = first_page.total;
        let first_outcome = PageOutcome {
            page_index: first_request.start_index,
            records: first_page.len(),
            success: first_page.success,
        };

        if !first_page.success || total == 0 {
            info!(
                total = total,
                success = first_page.success,
                "Nothing to fetch beyond the first page"
            );
            return Ok(FetchOutcome {
                data: Vec::new(),
                pages: vec![first_outcome],
                total,
            });
        }

        let shards = calculate_shards(first_page.len(), total, self.config.base_page_size);
        info!(
            total = total,
            first_page = first_page.len(),
            shards = shards.len(),
            "First page fetched, planning remaining shards"
        );

        let shard_pages = self
            .fetch_shards(run, policy, shards, total, first_page.len())
            .await?;

        let mut data = first_page.data;
        let mut pages = Vec::with_capacity(shard_pages.len() + 1);
        pages.push(first_outcome);
        for (shard, page) in &shard_pages {
            pages.push(PageOutcome {
                page_index: shard.shard_index,
                records: page.len(),
                success: page.success,
            });
        }
        pages.sort_by_key(|page| page.page_index);

        for (_, page) in shard_pages {
            data.extend(page.data);
        }

        Ok(FetchOutcome { data, pages, total })
    }

    /// Fan the shards out through the concurrency window and fold their results
    async fn fetch_shards(
        &self,
        run: &SharedCancel,
        policy: RetryPolicy,
        shards: Vec<DataShard>,
        total: usize,
        first_page_count: usize,
    ) -> Result<Vec<ShardPage<T>>, FetchError> {
        let total_shards = shards.len();
        let mut completed: Vec<ShardPage<T>> = Vec::with_capacity(total_shards);
        let mut processed = first_page_count;
        let mut failed_shards = 0;

        let mut shard_stream = stream::iter(shards)
            .map(|shard| {
                let task = tokio::spawn(fetch_shard(
                    Arc::clone(&self.source),
                    policy,
                    self.kind,
                    self.update_time,
                    shard,
                    total,
                    Arc::clone(run),
                ));
                async move {
                    task.await.map_err(|e| {
                        FetchError::Pipeline(format!("shard {} task failed: {e}", shard.shard_index))
                    })?
                }
            })
            .buffer_unordered(self.config.concurrency);

        loop {
            let next = tokio::select! {
                biased;
                _ = run.cancelled() => return Err(FetchError::Cancelled),
                next = shard_stream.next() => next,
            };
            let Some(result) = next else { break };
            let (shard, page) = result?;

            processed += page.len();
            if !page.success {
                failed_shards += 1;
            }
            completed.push((shard, page));

            self.publish_progress(
                run,
                FetchProgress::new(
                    processed,
                    total,
                    completed.len(),
                    total_shards,
                    failed_shards,
                ),
            );
        }

        if self.config.result_order == ResultOrder::ShardIndex {
            completed.sort_by_key(|(shard, _)| shard.shard_index);
        }

        info!(
            records = processed,
            shards = total_shards,
            failed = failed_shards,
            order = %self.config.result_order,
            "All shards processed"
        );
        Ok(completed)
    }
}

impl<T> PaginationFetcher<T> {
    /// Release the run's signal so its shutdown watcher and stray shard tasks exit
    fn finish(&self, run: &SharedCancel) {
        let mut current_run = lock(&self.current_run);
        if current_run
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, run))
        {
            *current_run = None;
        }
        run.cancel();
    }
}

/// A claimed run; dropping it before [`RunGuard::finish`] ends the run `Cancelled`
struct RunGuard<'a, T> {
    fetcher: &'a PaginationFetcher<T>,
    run: SharedCancel,
    metrics: FetchMetrics,
    finished: bool,
}

impl<T> RunGuard<'_, T> {
    fn finish(&mut self) {
        self.finished = true;
        self.fetcher.finish(&self.run);
    }
}

impl<T> Drop for RunGuard<'_, T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.fetcher.finish(&self.run);
        if self
            .fetcher
            .status
            .transition(|s| *s == FetchStatus::Fetching, FetchStatus::Cancelled)
            .is_ok()
        {
            warn!(kind = %self.fetcher.kind, "Fetch dropped before completion, marked cancelled");
            self.metrics.record_cancelled();
        }
    }
}

async fn fetch_with_retry<T>(
    source: &Arc<dyn PageSource<T>>,
    policy: RetryPolicy,
    request: &PageRequest,
    run: &CancelSignal,
) -> FetcherResult<PageResponse<T>> {
    policy
        .run(request, Some(run), move || source.fetch_page(request.clone()))
        .await
}

/// One shard task: fetch with retry, substituting a placeholder on exhaustion
async fn fetch_shard<T>(
    source: Arc<dyn PageSource<T>>,
    policy: RetryPolicy,
    kind: RequestKind,
    update_time: i64,
    shard: DataShard,
    total: usize,
    run: SharedCancel,
) -> Result<ShardPage<T>, FetchError> {
    let request = PageRequest::for_shard(kind, update_time, &shard);

    match fetch_with_retry(&source, policy, &request, &run).await {
        Ok(page) => {
            debug!(
                shard = shard.shard_index,
                records = page.len(),
                "Shard fetched"
            );
            Ok((shard, page))
        }
        Err(FetcherError::Cancelled) => Err(FetchError::Cancelled),
        Err(e) => {
            warn!(
                shard = shard.shard_index,
                offset = shard.start_index,
                error = %e,
                "Shard exhausted retries, recording placeholder"
            );
            metrics::record_shard_failure(shard.shard_index);
            Ok((
                shard,
                PageResponse::failed(total, shard.shard_index, total - shard.start_index),
            ))
        }
    }
}
