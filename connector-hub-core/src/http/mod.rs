//! Transport to vendor endpoints
//!
//! One pooled [`HttpClient`] per provider. Non-2xx replies come back as
//! [`HttpFailure`] with the body kept intact for the vendor error tables.

pub mod client;
pub mod error;

pub use client::{HttpClient, HttpRequest};
pub use error::HttpFailure;

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Options for one logical call (all of its retry attempts)
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Unique request ID for correlation, sent as `X-Request-ID`
    pub request_id: Uuid,

    /// Per-attempt deadline; the provider's configured timeout when `None`
    pub timeout: Option<Duration>,

    /// Cancels the in-flight attempt, any backoff sleep, and stream reads
    pub cancellation: CancellationToken,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            timeout: None,
            cancellation: CancellationToken::new(),
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }
}
