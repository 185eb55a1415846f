//! Error taxonomy and vendor error mapping
//!
//! Every failure a caller can observe is normalized into a [`MappedError`]
//! carrying one of six [`ErrorKind`]s. Classification runs in a fixed order:
//!
//! 1. a vendor error body recognized by shape, looked up in that vendor's table
//! 2. the HTTP status code, looked up in the generic table
//! 3. anything else becomes [`ErrorKind::Unknown`]

use crate::config::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Normalized error classification shared by all vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    InvalidRequest,
    RateLimit,
    ServerError,
    Timeout,
    Unknown,
}

impl ErrorKind {
    /// Retryability is a property of the kind, never of the attempt count
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit | ErrorKind::ServerError | ErrorKind::Timeout
        )
    }

    /// Generic HTTP status table
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            401 | 403 => Some(ErrorKind::Authentication),
            404 => Some(ErrorKind::InvalidRequest),
            408 => Some(ErrorKind::Timeout),
            429 => Some(ErrorKind::RateLimit),
            400..=499 => Some(ErrorKind::InvalidRequest),
            500..=599 => Some(ErrorKind::ServerError),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified failure of one call attempt
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error(
    "{} {} error{}: {}{}",
    .provider,
    .kind,
    status_suffix(.status_code),
    .message,
    retry_suffix(.retry_after)
)]
pub struct MappedError {
    pub kind: ErrorKind,
    /// Human-readable message, with a remediation hint where one applies
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Seconds the vendor asked us to wait
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Vendor's own error code or type, for diagnostics only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_code: Option<String>,
    pub provider: String,
}

impl MappedError {
    pub fn new(provider: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            retry_after: None,
            vendor_code: None,
            provider: provider.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    pub fn with_vendor_code(mut self, code: impl Into<String>) -> Self {
        self.vendor_code = Some(code.into());
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

fn retry_suffix(retry_after: &Option<u64>) -> String {
    retry_after
        .map(|s| format!(" [retry after {}s]", s))
        .unwrap_or_default()
}

/// Errors surfaced by provider operations
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// A vendor or transport failure, normalized
    #[error(transparent)]
    Api(#[from] MappedError),

    /// The request was rejected locally before any network call
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Request cancelled")]
    Cancelled,

    /// A successful response that could not be decoded
    #[error("Failed to decode vendor response: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Api(e) => e.kind,
            ProviderError::Validation(_) | ProviderError::Configuration(_) => {
                ErrorKind::InvalidRequest
            }
            ProviderError::Cancelled | ProviderError::Decode(_) => ErrorKind::Unknown,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Api(e) => e.status_code,
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ProviderError::Api(e) => e.retry_after,
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Api(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn as_mapped(&self) -> Option<&MappedError> {
        match self {
            ProviderError::Api(e) => Some(e),
            _ => None,
        }
    }
}

/// A failure as observed, before classification
#[derive(Debug, Clone, Copy)]
pub enum RawError<'a> {
    /// Non-2xx HTTP response
    Http {
        status: u16,
        body: &'a str,
        /// Parsed `Retry-After` header, in seconds
        retry_after: Option<u64>,
    },
    /// Error object delivered inside a stream
    Payload(&'a Value),
    Transport(&'a reqwest::Error),
    /// The request-level deadline elapsed
    Timeout,
    Other(&'a str),
}

/// What a vendor's error table extracted from a recognized error body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VendorErrorInfo {
    /// `None` when the code is not in the vendor table
    pub kind: Option<ErrorKind>,
    pub message: String,
    pub code: Option<String>,
    /// Status embedded in the body, or implied by the code
    pub status: Option<u16>,
    /// Machine-readable retry delay, when the body carries one
    pub retry_after: Option<u64>,
}

/// Per-vendor error mapping: a strict body parser plus remediation hints
#[derive(Clone, Copy)]
pub struct ErrorTable {
    pub provider: &'static str,
    pub parse: fn(&Value) -> Option<VendorErrorInfo>,
    pub hint: fn(ErrorKind) -> Option<&'static str>,
}

const MAX_MESSAGE_LEN: usize = 512;

impl ErrorTable {
    /// Classify `raw`. Total: never panics, never fails.
    pub fn map(&self, raw: RawError<'_>) -> MappedError {
        let mapped = match raw {
            RawError::Http {
                status,
                body,
                retry_after,
            } => {
                let info = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|value| (self.parse)(&value));
                let mut mapped = match info {
                    Some(info) => self.from_info(info, Some(status)),
                    None => MappedError::new(
                        self.provider,
                        ErrorKind::from_status(status).unwrap_or(ErrorKind::Unknown),
                        fallback_message(body, status),
                    )
                    .with_status(status),
                };
                if retry_after.is_some() {
                    mapped.retry_after = retry_after;
                }
                mapped
            }
            RawError::Payload(value) => match (self.parse)(value) {
                Some(info) => self.from_info(info, None),
                None => MappedError::new(
                    self.provider,
                    ErrorKind::Unknown,
                    truncate(&value.to_string()),
                ),
            },
            RawError::Transport(err) if err.is_timeout() => {
                MappedError::new(self.provider, ErrorKind::Timeout, err.to_string())
            }
            RawError::Transport(err) => {
                let mut mapped = MappedError::new(self.provider, ErrorKind::Unknown, err.to_string());
                mapped.status_code = err.status().map(|s| s.as_u16());
                mapped
            }
            RawError::Timeout => {
                MappedError::new(self.provider, ErrorKind::Timeout, "request timed out")
            }
            RawError::Other(text) => MappedError::new(self.provider, ErrorKind::Unknown, text),
        };

        self.finish(mapped)
    }

    fn from_info(&self, info: VendorErrorInfo, http_status: Option<u16>) -> MappedError {
        let status = http_status.or(info.status);
        let kind = info
            .kind
            .or_else(|| status.and_then(ErrorKind::from_status))
            .unwrap_or(ErrorKind::Unknown);
        let message = if info.message.is_empty() {
            status
                .map(|s| format!("HTTP {}", s))
                .unwrap_or_else(|| "unspecified vendor error".to_string())
        } else {
            truncate(&info.message)
        };

        MappedError {
            kind,
            message,
            status_code: status,
            retry_after: info.retry_after,
            vendor_code: info.code,
            provider: self.provider.to_string(),
        }
    }

    fn finish(&self, mut mapped: MappedError) -> MappedError {
        if mapped.retry_after.is_none() {
            mapped.retry_after = extract_retry_after(&mapped.message);
        }
        if let Some(hint) = (self.hint)(mapped.kind) {
            if !mapped.message.contains(hint) {
                mapped.message = format!("{}. {}", mapped.message.trim_end_matches('.'), hint);
            }
        }
        mapped
    }
}

fn fallback_message(body: &str, status: u16) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        truncate(body)
    }
}

fn truncate(text: &str) -> String {
    if text.len() <= MAX_MESSAGE_LEN {
        return text.to_string();
    }
    let mut end = MAX_MESSAGE_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

fn retry_after_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)(?:retry|try again)\D{0,20}?(\d+(?:\.\d+)?)\s*(?:seconds?|secs?|s)\b").ok()
        })
        .as_ref()
}

/// Best-effort seconds extraction from a human-readable message.
///
/// Matches phrasings such as "retry after 30 seconds" or "try again in
/// 6.5s"; fractional values round up.
pub fn extract_retry_after(message: &str) -> Option<u64> {
    let captures = retry_after_pattern()?.captures(message)?;
    let seconds: f64 = captures.get(1)?.as_str().parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(seconds.ceil() as u64)
    } else {
        None
    }
}

/// Parse a `Retry-After` header value in delta-seconds form
pub fn parse_retry_after_header(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }
    // HTTP-date form is not supported
    value
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(|s| s.ceil() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn no_vendor(_: &Value) -> Option<VendorErrorInfo> {
        None
    }

    fn no_hint(_: ErrorKind) -> Option<&'static str> {
        None
    }

    const GENERIC: ErrorTable = ErrorTable {
        provider: "test",
        parse: no_vendor,
        hint: no_hint,
    };

    #[test_case(401, ErrorKind::Authentication, false)]
    #[test_case(403, ErrorKind::Authentication, false)]
    #[test_case(404, ErrorKind::InvalidRequest, false)]
    #[test_case(408, ErrorKind::Timeout, true)]
    #[test_case(429, ErrorKind::RateLimit, true)]
    #[test_case(500, ErrorKind::ServerError, true)]
    #[test_case(503, ErrorKind::ServerError, true)]
    #[test_case(422, ErrorKind::InvalidRequest, false)]
    fn test_status_table(status: u16, kind: ErrorKind, retryable: bool) {
        let mapped = GENERIC.map(RawError::Http {
            status,
            body: "{}",
            retry_after: None,
        });
        assert_eq!(mapped.kind, kind);
        assert_eq!(mapped.is_retryable(), retryable);
        assert_eq!(mapped.status_code, Some(status));
    }

    #[test]
    fn test_unmapped_status_is_unknown() {
        let mapped = GENERIC.map(RawError::Http {
            status: 302,
            body: "",
            retry_after: None,
        });
        assert_eq!(mapped.kind, ErrorKind::Unknown);
        assert!(!mapped.is_retryable());
        assert_eq!(mapped.message, "HTTP 302");
    }

    #[test]
    fn test_other_is_unknown() {
        let mapped = GENERIC.map(RawError::Other("socket closed"));
        assert_eq!(mapped.kind, ErrorKind::Unknown);
        assert_eq!(mapped.status_code, None);
    }

    #[test]
    fn test_timeout_is_retryable() {
        let mapped = GENERIC.map(RawError::Timeout);
        assert_eq!(mapped.kind, ErrorKind::Timeout);
        assert!(mapped.is_retryable());
    }

    #[test]
    fn test_header_wins_over_message() {
        let mapped = GENERIC.map(RawError::Http {
            status: 429,
            body: "retry after 30 seconds",
            retry_after: Some(7),
        });
        assert_eq!(mapped.retry_after, Some(7));
    }

    #[test_case("Rate limited, retry after 30 seconds", Some(30))]
    #[test_case("Please try again in 20s.", Some(20))]
    #[test_case("Please try again in 6.5s", Some(7))]
    #[test_case("retry in 2 secs", Some(2))]
    #[test_case("try again in 500ms", None)]
    #[test_case("Quota exceeded", None)]
    fn test_extract_retry_after(message: &str, expected: Option<u64>) {
        assert_eq!(extract_retry_after(message), expected);
    }

    #[test]
    fn test_parse_retry_after_header() {
        assert_eq!(parse_retry_after_header("30"), Some(30));
        assert_eq!(parse_retry_after_header(" 1.2 "), Some(2));
        assert_eq!(parse_retry_after_header("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        let mapped = GENERIC.map(RawError::Http {
            status: 500,
            body: &body,
            retry_after: None,
        });
        assert!(mapped.message.len() < 600);
        assert!(mapped.message.ends_with("..."));
    }

    #[test]
    fn test_provider_error_accessors() {
        let err = ProviderError::from(
            MappedError::new("openai", ErrorKind::RateLimit, "slow down")
                .with_status(429)
                .with_retry_after(30),
        );
        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(err.retry_after(), Some(30));
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "openai rate_limit error (HTTP 429): slow down [retry after 30s]"
        );
        assert_eq!(
            MappedError::new("google", ErrorKind::Timeout, "deadline").to_string(),
            "google timeout error: deadline"
        );

        assert!(!ProviderError::Cancelled.is_retryable());
        assert_eq!(
            ProviderError::Validation(ValidationError::missing("model")).kind(),
            ErrorKind::InvalidRequest
        );
    }
}
