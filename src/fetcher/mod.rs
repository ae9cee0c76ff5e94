//! Page sources and per-request retry
//!
//! A [`PageSource`] is the injected collaborator that knows how to fetch a single
//! page. The orchestrator never looks past this trait; transport, decoding and
//! authentication all live behind it.

use crate::{PageRequest, PageResponse};
use async_trait::async_trait;
use std::future::Future;

pub mod http;
pub mod retry;
pub mod retry_formatter;
pub mod simulated;

pub use retry::RetryPolicy;

/// Fetcher errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetcherError {
    /// HTTP status error
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Response parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// API error response
    #[error("API error: {0}")]
    ApiError(String),

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Network error
    #[error("network error: {0}")]
    NetworkError(String),

    /// Request abandoned because the fetch was cancelled
    #[error("request cancelled")]
    Cancelled,
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Single-page fetch operation injected into the orchestrator
///
/// Implemented for any `Fn(PageRequest) -> impl Future<Output = FetcherResult<PageResponse<T>>>`,
/// so plain async closures can be handed straight to
/// [`PaginationFetcher::new`](crate::pagination::PaginationFetcher::new).
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    /// Fetch one page
    ///
    /// # Arguments
    /// * `request` - Page to fetch
    ///
    /// # Returns
    /// The page envelope. Implementations report transport and decoding problems
    /// as errors; the orchestrator retries them uniformly.
    async fn fetch_page(&self, request: PageRequest) -> FetcherResult<PageResponse<T>>;
}

#[async_trait]
impl<T, F, Fut> PageSource<T> for F
where
    T: Send + 'static,
    F: Fn(PageRequest) -> Fut + Send + Sync,
    Fut: Future<Output = FetcherResult<PageResponse<T>>> + Send + 'static,
{
    async fn fetch_page(&self, request: PageRequest) -> FetcherResult<PageResponse<T>> {
        (self)(request).await
    }
}
