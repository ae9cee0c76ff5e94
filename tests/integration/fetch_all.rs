//! End-to-end fetch scenarios against instrumented sources

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use paginated_fetcher::fetcher::simulated::SimulatedPageSource;
use paginated_fetcher::fetcher::{FetcherError, FetcherResult};
use paginated_fetcher::pagination::{
    DataFetchConfig, FetchError, FetchStatus, PageOutcome, PaginationFetcher, ResultOrder,
};
use paginated_fetcher::{PageRequest, PageResponse};

use crate::common::{fast_config, fetcher_over, ids};

#[tokio::test]
async fn twenty_five_records_in_three_pages() {
    let source = Arc::new(SimulatedPageSource::instant(25));
    let fetcher = fetcher_over(&source, fast_config());

    let outcome = fetcher.fetch_all_data().await.unwrap();

    assert_eq!(ids(&outcome.data), (0..25).collect::<Vec<_>>());
    assert_eq!(outcome.total, 25);
    assert_eq!(
        outcome.pages,
        vec![
            PageOutcome {
                page_index: 1,
                records: 10,
                success: true
            },
            PageOutcome {
                page_index: 2,
                records: 10,
                success: true
            },
            PageOutcome {
                page_index: 3,
                records: 5,
                success: true
            },
        ]
    );
    assert_eq!(fetcher.status(), FetchStatus::Completed);
    assert_eq!(source.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn permanently_failing_shard_leaves_a_gap() {
    let source = Arc::new(SimulatedPageSource::instant(25).with_failing_pages([3]));
    let fetcher = fetcher_over(&source, DataFetchConfig::default());

    let outcome = fetcher.fetch_all_data().await.unwrap();

    assert_eq!(ids(&outcome.data), (0..20).collect::<Vec<_>>());
    assert_eq!(outcome.failed_pages(), vec![3]);
    assert!(!outcome.is_complete());
    assert_eq!(fetcher.status(), FetchStatus::Completed);

    // page 1 + page 2 + four attempts at page 3
    assert_eq!(source.calls(), 6);

    let progress = fetcher.current_progress();
    assert_eq!(progress.processed, 20);
    assert_eq!(progress.total, 25);
    assert_eq!(progress.completed_shards, 2);
    assert_eq!(progress.failed_shards, 1);
    assert_eq!(progress.percentage, 80.0);
}

#[tokio::test(start_paused = true)]
async fn failing_first_page_completes_with_no_data() {
    let source = Arc::new(SimulatedPageSource::instant(25).with_failing_pages([1]));
    let fetcher = fetcher_over(&source, DataFetchConfig::default());

    let outcome = fetcher.fetch_all_data().await.unwrap();

    assert!(outcome.data.is_empty());
    assert_eq!(outcome.failed_pages(), vec![1]);
    assert_eq!(outcome.total, 0);
    assert_eq!(fetcher.status(), FetchStatus::Completed);
    assert_eq!(source.calls(), 4);
}

#[tokio::test]
async fn empty_source_completes_without_shards() {
    let source = Arc::new(SimulatedPageSource::instant(0));
    let fetcher = fetcher_over(&source, fast_config());

    let outcome = fetcher.fetch_all_data().await.unwrap();

    assert!(outcome.data.is_empty());
    assert!(outcome.is_complete());
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn exact_single_page_needs_no_shards() {
    let source = Arc::new(SimulatedPageSource::instant(10));
    let fetcher = fetcher_over(&source, fast_config());

    let outcome = fetcher.fetch_all_data().await.unwrap();

    assert_eq!(outcome.data.len(), 10);
    assert_eq!(outcome.pages.len(), 1);
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_cap_is_respected() {
    let source = Arc::new(SimulatedPageSource::instant(20).with_failing_pages([2]));
    let config = DataFetchConfig::default().with_retry_attempts(5);
    let fetcher = fetcher_over(&source, config);

    let outcome = fetcher.fetch_all_data().await.unwrap();

    assert_eq!(outcome.failed_pages(), vec![2]);
    // page 1 + six attempts at page 2
    assert_eq!(source.calls(), 7);
}

#[tokio::test(start_paused = true)]
async fn concurrency_window_is_never_exceeded() {
    for concurrency in [1, 3, 5] {
        let source = Arc::new(
            SimulatedPageSource::new(200)
                .with_latency(Duration::from_millis(20), Duration::from_millis(80))
                .with_failure_rate(0.0)
                .with_seed(42),
        );
        let config = fast_config().with_concurrency(concurrency);
        let fetcher = fetcher_over(&source, config);

        let outcome = fetcher.fetch_all_data().await.unwrap();

        assert_eq!(outcome.data.len(), 200);
        assert_eq!(source.max_in_flight(), concurrency);
    }
}

#[tokio::test(start_paused = true)]
async fn shard_index_order_survives_out_of_order_completion() {
    let source = Arc::new(
        SimulatedPageSource::new(95)
            .with_latency(Duration::from_millis(10), Duration::from_millis(500))
            .with_failure_rate(0.0)
            .with_seed(7),
    );
    let config = fast_config()
        .with_concurrency(4)
        .with_result_order(ResultOrder::ShardIndex);
    let fetcher = fetcher_over(&source, config);

    let outcome = fetcher.fetch_all_data().await.unwrap();

    assert_eq!(ids(&outcome.data), (0..95).collect::<Vec<_>>());
}

type PageFuture = Pin<Box<dyn Future<Output = FetcherResult<PageResponse<usize>>> + Send>>;

/// Source whose later pages answer faster, so shards finish in reverse
fn reverse_latency_source(total: usize) -> impl Fn(PageRequest) -> PageFuture + Send + Sync {
    move |request: PageRequest| -> PageFuture {
        Box::pin(async move {
            let delay = Duration::from_millis(100 * (10 - request.start_index as u64));
            tokio::time::sleep(delay).await;
            let end = (request.offset + request.page_size).min(total);
            let data: Vec<usize> = (request.offset..end).collect();
            Ok(PageResponse::new(data, total, request.start_index, total - end))
        })
    }
}

#[tokio::test(start_paused = true)]
async fn completion_order_concatenates_as_shards_finish() {
    let config = fast_config()
        .with_concurrency(3)
        .with_result_order(ResultOrder::Completion);
    let fetcher: PaginationFetcher<usize> =
        PaginationFetcher::new(reverse_latency_source(40), config).unwrap();

    let outcome = fetcher.fetch_all_data().await.unwrap();

    let mut expected: Vec<usize> = (0..10).collect();
    expected.extend(30..40);
    expected.extend(20..30);
    expected.extend(10..20);
    assert_eq!(outcome.data, expected);

    // Page outcomes are always reported by page number
    let pages: Vec<usize> = outcome.pages.iter().map(|p| p.page_index).collect();
    assert_eq!(pages, vec![1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn second_fetch_while_fetching_is_rejected() {
    let source = Arc::new(
        SimulatedPageSource::new(50)
            .with_latency(Duration::from_millis(100), Duration::from_millis(100))
            .with_failure_rate(0.0),
    );
    let fetcher = fetcher_over(&source, fast_config());

    let (first, second) = tokio::join!(fetcher.fetch_all_data(), fetcher.fetch_all_data());

    assert_eq!(first.unwrap().data.len(), 50);
    assert_eq!(second.unwrap_err(), FetchError::AlreadyInProgress);
    // One page 1 plus four shards: no second wave
    assert_eq!(source.calls(), 5);
}

#[tokio::test]
async fn reset_allows_another_fetch() {
    let source = Arc::new(SimulatedPageSource::instant(25));
    let fetcher = fetcher_over(&source, fast_config());

    fetcher.fetch_all_data().await.unwrap();
    assert!(matches!(
        fetcher.fetch_all_data().await,
        Err(FetchError::NotIdle(FetchStatus::Completed))
    ));

    fetcher.reset().unwrap();
    let outcome = fetcher.fetch_all_data().await.unwrap();
    assert_eq!(outcome.data.len(), 25);
    assert_eq!(source.calls(), 6);
}

#[tokio::test]
async fn independent_fetchers_share_nothing() {
    let small = Arc::new(SimulatedPageSource::instant(15));
    let large = Arc::new(SimulatedPageSource::instant(120));
    let a = fetcher_over(&small, fast_config());
    let b = fetcher_over(&large, fast_config().with_concurrency(8));

    let (ra, rb) = tokio::join!(a.fetch_all_data(), b.fetch_all_data());

    assert_eq!(ra.unwrap().data.len(), 15);
    assert_eq!(rb.unwrap().data.len(), 120);
    assert_eq!(small.calls(), 2);
    assert_eq!(large.calls(), 12);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_recover_through_retry() {
    // Page 2 fails twice, then succeeds
    let attempts = Arc::new(AtomicUsize::new(0));
    let source = {
        let attempts = attempts.clone();
        move |request: PageRequest| {
            let attempts = attempts.clone();
            async move {
                if request.start_index == 2 && attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    return Err(FetcherError::HttpError("503 Service Unavailable".to_string()));
                }
                let end = (request.offset + request.page_size).min(15);
                Ok(PageResponse::new(
                    (request.offset..end).collect::<Vec<usize>>(),
                    15,
                    request.start_index,
                    15 - end,
                ))
            }
        }
    };
    let fetcher: PaginationFetcher<usize> =
        PaginationFetcher::new(source, DataFetchConfig::default()).unwrap();

    let outcome = fetcher.fetch_all_data().await.unwrap();

    assert_eq!(outcome.data, (0..15).collect::<Vec<_>>());
    assert!(outcome.is_complete());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}
