//! Cancellation: explicit cancel(), shared shutdown signal and CancelSignal itself

use std::sync::Arc;
use std::time::Duration;

use paginated_fetcher::fetcher::simulated::SimulatedPageSource;
use paginated_fetcher::pagination::{DataFetchConfig, FetchError, FetchStatus};
use paginated_fetcher::shutdown::CancelSignal;
use tokio::sync::broadcast::error::TryRecvError;

use crate::common::{fast_config, fetcher_over};

fn slow_source(total: usize) -> Arc<SimulatedPageSource> {
    Arc::new(
        SimulatedPageSource::new(total)
            .with_latency(Duration::from_millis(100), Duration::from_millis(100))
            .with_failure_rate(0.0),
    )
}

#[tokio::test(start_paused = true)]
async fn cancel_during_fetch_ends_cancelled() {
    let source = slow_source(100);
    let fetcher = fetcher_over(&source, fast_config().with_concurrency(2));

    let (result, _) = tokio::join!(fetcher.fetch_all_data(), async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(fetcher.status(), FetchStatus::Fetching);
        fetcher.cancel();
    });

    assert_eq!(result.unwrap_err(), FetchError::Cancelled);
    assert_eq!(fetcher.status(), FetchStatus::Cancelled);
    assert!(source.calls() < 10);
}

#[tokio::test(start_paused = true)]
async fn no_progress_after_cancel_returns() {
    let source = slow_source(200);
    let fetcher = fetcher_over(&source, fast_config().with_concurrency(3));
    let mut progress = fetcher.subscribe_progress();

    let (result, seen_before_cancel) = tokio::join!(fetcher.fetch_all_data(), async {
        tokio::time::sleep(Duration::from_millis(350)).await;
        fetcher.cancel();
        let mut seen = 0;
        while progress.try_recv().is_ok() {
            seen += 1;
        }
        seen
    });

    assert!(result.is_err());
    assert!(seen_before_cancel > 0);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(matches!(progress.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_retry_delay() {
    let source = Arc::new(SimulatedPageSource::instant(30).with_failing_pages([2]));
    let config = DataFetchConfig::default()
        .with_retry_attempts(10)
        .with_retry_delay(Duration::from_secs(30));
    let fetcher = fetcher_over(&source, config);

    let started = tokio::time::Instant::now();
    let (result, _) = tokio::join!(fetcher.fetch_all_data(), async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        fetcher.cancel();
    });

    assert_eq!(result.unwrap_err(), FetchError::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn shutdown_signal_cancels_fetch() {
    let shutdown = CancelSignal::shared();
    let source = slow_source(100);
    let fetcher = fetcher_over(&source, fast_config()).with_shutdown(shutdown.clone());

    let (result, _) = tokio::join!(fetcher.fetch_all_data(), async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        shutdown.cancel();
    });

    assert_eq!(result.unwrap_err(), FetchError::Cancelled);
    assert_eq!(fetcher.status(), FetchStatus::Cancelled);
}

#[tokio::test]
async fn fired_shutdown_prevents_any_request() {
    let shutdown = CancelSignal::shared();
    shutdown.cancel();
    let source = Arc::new(SimulatedPageSource::instant(50));
    let fetcher = fetcher_over(&source, fast_config()).with_shutdown(shutdown);

    assert_eq!(
        fetcher.fetch_all_data().await.unwrap_err(),
        FetchError::Cancelled
    );
    assert_eq!(source.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_fetcher_can_be_reset_and_rerun() {
    let source = slow_source(40);
    let fetcher = fetcher_over(&source, fast_config());

    let (first, _) = tokio::join!(fetcher.fetch_all_data(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        fetcher.cancel();
    });
    assert!(first.is_err());

    fetcher.reset().unwrap();
    let outcome = fetcher.fetch_all_data().await.unwrap();
    assert_eq!(outcome.data.len(), 40);
    assert_eq!(fetcher.status(), FetchStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn dropped_fetch_future_ends_cancelled() {
    let source = slow_source(100);
    let fetcher = fetcher_over(&source, fast_config());
    let mut status = fetcher.subscribe_status();

    let timed_out =
        tokio::time::timeout(Duration::from_millis(250), fetcher.fetch_all_data()).await;
    assert!(timed_out.is_err());
    assert_eq!(fetcher.status(), FetchStatus::Cancelled);
    assert_eq!(
        status.drain(),
        vec![
            FetchStatus::Idle,
            FetchStatus::Fetching,
            FetchStatus::Cancelled
        ]
    );

    // In-flight shard tasks stop instead of retrying or admitting more shards
    let calls_at_drop = source.calls();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(source.calls(), calls_at_drop);

    fetcher.reset().unwrap();
    let outcome = fetcher.fetch_all_data().await.unwrap();
    assert_eq!(outcome.data.len(), 100);
    assert_eq!(fetcher.status(), FetchStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn reset_while_fetching_is_rejected() {
    let source = slow_source(40);
    let fetcher = fetcher_over(&source, fast_config());

    let (result, reset) = tokio::join!(fetcher.fetch_all_data(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        fetcher.reset()
    });

    assert!(result.is_ok());
    assert_eq!(reset.unwrap_err(), FetchError::AlreadyInProgress);
}

#[tokio::test]
async fn cancel_signal_notifies_waiters() {
    let signal = CancelSignal::shared();
    let waiter = {
        let handle = signal.clone();
        tokio::spawn(async move {
            handle.cancelled().await;
            true
        })
    };

    // Give the task time to start waiting
    tokio::time::sleep(Duration::from_millis(50)).await;
    signal.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn cancel_signal_concurrent_waiters_all_notified() {
    let signal = CancelSignal::shared();

    let mut waiters = Vec::new();
    for _ in 0..10 {
        let handle = signal.clone();
        waiters.push(tokio::spawn(async move {
            handle.cancelled().await;
        }));
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    signal.cancel();

    for waiter in waiters {
        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(result.is_ok(), "A waiter was not notified of cancellation");
    }
}

#[tokio::test]
async fn cancel_signal_already_fired_returns_immediately() {
    let signal = CancelSignal::shared();
    signal.cancel();

    let result = tokio::time::timeout(Duration::from_millis(10), signal.cancelled()).await;
    assert!(result.is_ok(), "cancelled() blocked on an already fired signal");
}
