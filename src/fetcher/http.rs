//! HTTP page source
//!
//! Fetches one page with a `GET` request and decodes the JSON page envelope:
//! - Query parameters `type`, `updateTime`, `startIndex`, `pageSize`, `offset`
//! - Transport failures map to [`FetcherError::NetworkError`]
//! - 429 and 5xx map to [`FetcherError::HttpError`], other non-success statuses to
//!   [`FetcherError::ApiError`]
//! - Undecodable bodies map to [`FetcherError::ParseError`]
//!
//! Retrying is left to the orchestrator's retry decorator.

use crate::fetcher::{FetcherError, FetcherResult, PageSource};
use crate::{PageRequest, PageResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Page source backed by a JSON HTTP endpoint
pub struct HttpPageSource<T> {
    client: Arc<Client>,
    base_url: String,
    endpoint: String,
    _record: PhantomData<fn() -> T>,
}

impl<T> HttpPageSource<T> {
    /// Create a source
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client
    /// * `base_url` - Scheme and host (e.g., "https://api.example.com")
    /// * `endpoint` - Path of the paged resource (e.g., "/v1/fixtures")
    pub fn new(client: Arc<Client>, base_url: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            endpoint: endpoint.into(),
            _record: PhantomData,
        }
    }

    /// Create a source with its own client using [`DEFAULT_TIMEOUT`]
    pub fn with_default_client(
        base_url: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> FetcherResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| FetcherError::NetworkError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::new(Arc::new(client), base_url, endpoint))
    }

    /// Full URL of the paged resource
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.endpoint)
    }

    /// Query parameters for `request`
    pub fn query_params(request: &PageRequest) -> Vec<(&'static str, String)> {
        vec![
            ("type", request.kind.to_string()),
            ("updateTime", request.update_time.to_string()),
            ("startIndex", request.start_index.to_string()),
            ("pageSize", request.page_size.to_string()),
            ("offset", request.offset.to_string()),
        ]
    }
}

#[async_trait]
impl<T> PageSource<T> for HttpPageSource<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch_page(&self, request: PageRequest) -> FetcherResult<PageResponse<T>> {
        let url = self.url();
        let params = Self::query_params(&request);

        debug!(
            page = request.start_index,
            updated_after = ?request.updated_after(),
            "Making GET request to: {}",
            url
        );

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| FetcherError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(FetcherError::HttpError(format!(
                "{} returned {}",
                url, status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetcherError::ApiError(format!("{status}: {body}")));
        }

        let page: PageResponse<T> = response
            .json()
            .await
            .map_err(|e| FetcherError::ParseError(e.to_string()))?;

        page.validate().map_err(FetcherError::InvalidResponse)?;

        debug!(
            page = page.current_index,
            records = page.data.len(),
            total = page.total,
            "Page decoded"
        );
        Ok(page)
    }
}
