//! Retry-with-delay decorator for single-page requests
//!
//! Wraps any page operation with a bounded number of retries separated by a fixed
//! delay. Every attempt re-invokes the original operation from scratch, and every
//! error is retried the same way: the decorator never looks at the error kind.

use crate::fetcher::retry_formatter::RetryContext;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::metrics;
use crate::shutdown::CancelSignal;
use crate::PageRequest;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fixed-delay retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Total attempts the policy allows (initial + retries)
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `op` for `request` until it succeeds or the retries run out
    ///
    /// # Arguments
    /// * `request` - Page being fetched, used for log context only
    /// * `cancel` - Optional signal; when it fires the pending attempt or delay is
    ///   abandoned and [`FetcherError::Cancelled`] is returned
    /// * `op` - Operation to (re-)invoke for each attempt
    ///
    /// # Returns
    /// The first successful result, or the error of the last attempt
    pub async fn run<T, F, Fut>(
        &self,
        request: &PageRequest,
        cancel: Option<&CancelSignal>,
        mut op: F,
    ) -> FetcherResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetcherResult<T>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let result = match cancel {
                Some(signal) => {
                    tokio::select! {
                        biased;
                        _ = signal.cancelled() => return Err(FetcherError::Cancelled),
                        result = op() => result,
                    }
                }
                None => op().await,
            };
            metrics::record_page_request(request.kind, result.is_ok());

            let error = match result {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            page = request.start_index,
                            attempt = attempt,
                            "Retry attempt {}/{} for page {} succeeded",
                            attempt,
                            max_attempts,
                            request.start_index
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let context = RetryContext::new(
                attempt,
                max_attempts,
                self.delay,
                request.start_index,
                request.kind,
                &error,
            );

            if attempt >= max_attempts {
                warn!("{}", context.format_failure());
                return Err(error);
            }

            warn!(
                page = request.start_index,
                attempt = attempt,
                error = %error,
                "{}",
                context.format_retry()
            );
            metrics::record_retry(self.delay, attempt);

            match cancel {
                Some(signal) => {
                    tokio::select! {
                        biased;
                        _ = signal.cancelled() => {
                            debug!(page = request.start_index, "Retry delay interrupted by cancellation");
                            return Err(FetcherError::Cancelled);
                        }
                        _ = tokio::time::sleep(self.delay) => {}
                    }
                }
                None => tokio::time::sleep(self.delay).await,
            }
        }
    }
}
