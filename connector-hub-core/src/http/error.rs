//! Single-attempt HTTP failures

use crate::providers::error::{MappedError, ProviderError, RawError};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use thiserror::Error;

/// Why one HTTP attempt did not produce a usable response
#[derive(Debug, Error)]
pub enum HttpFailure {
    /// Non-2xx status; the body is kept for the vendor error mapper
    #[error("HTTP {status}")]
    Status {
        status: u16,
        body: String,
        retry_after: Option<u64>,
    },
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    /// The per-request deadline elapsed
    #[error("request timed out")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
    #[error("response size {size} exceeds maximum {limit}")]
    TooLarge { size: usize, limit: usize },
}

impl HttpFailure {
    pub fn status(status: u16, headers: &HeaderMap, body: String) -> Self {
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(crate::providers::error::parse_retry_after_header);
        HttpFailure::Status {
            status,
            body,
            retry_after,
        }
    }

    /// Classify through a vendor error mapper
    pub fn into_provider_error<F>(self, map: F) -> ProviderError
    where
        F: for<'a> FnOnce(RawError<'a>) -> MappedError,
    {
        match self {
            HttpFailure::Status {
                status,
                body,
                retry_after,
            } => map(RawError::Http {
                status,
                body: &body,
                retry_after,
            })
            .into(),
            HttpFailure::Transport(err) => map(RawError::Transport(&err)).into(),
            HttpFailure::Timeout => map(RawError::Timeout).into(),
            HttpFailure::Cancelled => ProviderError::Cancelled,
            HttpFailure::TooLarge { size, limit } => map(RawError::Other(&format!(
                "response size {} exceeds maximum {}",
                size, limit
            )))
            .into(),
        }
    }
}
