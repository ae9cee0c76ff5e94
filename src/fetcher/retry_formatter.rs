//! Retry message formatting.
//!
//! Keeps the wording of retry, recovery and give-up log lines in one place so
//! every page request reports the same way regardless of which source failed.

use crate::fetcher::FetcherError;
use crate::RequestKind;
use std::time::Duration;

/// Classification of retry errors for user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Connection failures, timeouts and other transport problems
    Network,
    /// Non-success HTTP status
    Http,
    /// Body could not be decoded into a page
    Parse,
    /// Source answered with something that is not a valid page
    InvalidResponse,
    /// Source reported an application-level error
    Api,
    /// The fetch was cancelled
    Cancelled,
}

impl RetryErrorType {
    /// Classify a fetcher error.
    pub fn classify(error: &FetcherError) -> Self {
        match error {
            FetcherError::NetworkError(_) => Self::Network,
            FetcherError::HttpError(_) => Self::Http,
            FetcherError::ParseError(_) => Self::Parse,
            FetcherError::InvalidResponse(_) => Self::InvalidResponse,
            FetcherError::ApiError(_) => Self::Api,
            FetcherError::Cancelled => Self::Cancelled,
        }
    }

    /// User-friendly description string used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "network error",
            Self::Http => "HTTP error",
            Self::Parse => "malformed page",
            Self::InvalidResponse => "invalid page",
            Self::Api => "API error",
            Self::Cancelled => "cancellation",
        }
    }

    /// Suggested remediation presented after a page is given up on.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Network => "Check network connectivity and the source's base URL",
            Self::Http => "The source may be overloaded, try again later",
            Self::Parse | Self::InvalidResponse => {
                "Check that the source returns the expected page envelope"
            }
            Self::Api => "Review the request kind and update time",
            Self::Cancelled => "The fetch was cancelled; start a new one to continue",
        }
    }
}

/// Context for formatting retry messages about one page.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured (initial + retries)
    pub max_attempts: u32,
    /// Type of error that triggered the retry
    pub error_type: RetryErrorType,
    /// Delay before the next attempt
    pub delay: Duration,
    /// Page number being fetched
    pub page: usize,
    /// Library being queried
    pub kind: RequestKind,
    /// Original error message for details
    pub error_message: String,
}

impl RetryContext {
    /// Build a context for `page` after `error` on `attempt`.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        page: usize,
        kind: RequestKind,
        error: &FetcherError,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type: RetryErrorType::classify(error),
            delay,
            page,
            kind,
            error_message: error.to_string(),
        }
    }

    /// Format standardized retry message with attempt counters and context.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying page {} ({} library) (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.page,
            self.kind,
            self.attempt + 1,
            self.max_attempts,
            self.error_type.description(),
            self.delay.as_secs_f64()
        )
    }

    /// Format final failure summary with a suggestion.
    pub fn format_failure(&self) -> String {
        let lines = [
            format!(
                "[FAILED] Page {} failed after {} attempts",
                self.page, self.max_attempts
            ),
            format!("  Last error: {}", self.error_message),
            format!("  Library: {}", self.kind),
            format!("  Suggestion: {}", self.error_type.suggestion()),
        ];
        lines.join("\n")
    }
}
