//! HTTP client implementation using reqwest

use crate::config::redact_header;
use crate::http::{HttpFailure, RequestOptions};
use crate::providers::error::ProviderError;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::{Client, ClientBuilder, Response};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Maximum buffered response size (10MB)
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

const USER_AGENT: &str = concat!("connector-hub/", env!("CARGO_PKG_VERSION"));

/// One POST to a vendor endpoint
#[derive(Debug, Clone)]
pub struct HttpRequest<'a> {
    /// Provider name, for logs
    pub provider: &'a str,
    pub url: &'a str,
    pub headers: &'a [(String, String)],
    /// Pre-serialized JSON body, cheap to clone across retries
    pub body: Bytes,
}

/// Shared HTTP client with connection pooling
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    max_response_size: usize,
}

impl HttpClient {
    pub fn new(connect_timeout: Duration) -> Result<Self, ProviderError> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(connect_timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_response_size: MAX_RESPONSE_SIZE,
        })
    }

    /// Send one attempt and buffer the successful body
    pub async fn post_json(
        &self,
        request: HttpRequest<'_>,
        options: &RequestOptions,
        timeout: Duration,
    ) -> Result<Bytes, HttpFailure> {
        let request_id = options.request_id;
        let provider = request.provider;

        let read = async {
            let response = self.send(request, options).await?;
            self.check_content_length(&response)?;
            read_capped(response.bytes_stream(), self.max_response_size).await
        };

        let body = guarded(read, options, timeout).await.inspect_err(|failure| {
            warn!(
                "Request to {} failed: {} [request_id: {}]",
                provider, failure, request_id
            );
        })?;

        info!(
            "Request completed successfully for {} [request_id: {}]",
            provider, request_id
        );
        Ok(body)
    }

    /// Send one attempt and hand back the live response for streaming.
    ///
    /// The deadline covers only the wait for response headers; once bytes
    /// flow the caller owns the read loop.
    pub async fn post_stream(
        &self,
        request: HttpRequest<'_>,
        options: &RequestOptions,
        timeout: Duration,
    ) -> Result<Response, HttpFailure> {
        let provider = request.provider;
        guarded(self.send(request, options), options, timeout)
            .await
            .inspect_err(|failure| {
                warn!(
                    "Stream request to {} failed: {} [request_id: {}]",
                    provider, failure, options.request_id
                );
            })
    }

    async fn send(&self, request: HttpRequest<'_>, options: &RequestOptions) -> Result<Response, HttpFailure> {
        let request_id = options.request_id;

        info!(
            "Executing HTTP request to {} [request_id: {}]",
            request.provider, request_id
        );
        debug!("Request URL: {}", request.url);

        let mut builder = self
            .client
            .post(request.url)
            .header("content-type", "application/json")
            .header("X-Request-ID", request_id.to_string())
            .body(request.body);

        for (name, value) in request.headers {
            debug!("Header {}: {}", name, redact_header(name, value));
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!("Request timeout for {} [request_id: {}]", request.provider, request_id);
            } else {
                error!(
                    "Request error for {} [request_id: {}]: {}",
                    request.provider, request_id, e
                );
            }
            HttpFailure::Transport(e)
        })?;

        let status = response.status();
        debug!("Response status: {} [request_id: {}]", status, request_id);

        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(HttpFailure::status(status.as_u16(), &headers, body));
        }

        Ok(response)
    }

    fn check_content_length(&self, response: &Response) -> Result<(), HttpFailure> {
        match response.content_length() {
            Some(length) if length as usize > self.max_response_size => Err(HttpFailure::TooLarge {
                size: length as usize,
                limit: self.max_response_size,
            }),
            _ => Ok(()),
        }
    }
}

/// Buffer a body, giving up as soon as it grows past `limit`
async fn read_capped<S>(body: S, limit: usize) -> Result<Bytes, HttpFailure>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>>,
{
    let mut body = std::pin::pin!(body);
    let mut buffer = BytesMut::new();
    while let Some(piece) = body.next().await {
        let piece = piece.map_err(HttpFailure::Transport)?;
        if buffer.len() + piece.len() > limit {
            return Err(HttpFailure::TooLarge {
                size: buffer.len() + piece.len(),
                limit,
            });
        }
        buffer.extend_from_slice(&piece);
    }
    Ok(buffer.freeze())
}

/// Race `fut` against the deadline and the cancellation token
async fn guarded<T>(
    fut: impl Future<Output = Result<T, HttpFailure>>,
    options: &RequestOptions,
    timeout: Duration,
) -> Result<T, HttpFailure> {
    tokio::select! {
        biased;
        _ = options.cancellation.cancelled() => Err(HttpFailure::Cancelled),
        result = tokio::time::timeout(timeout, fut) => match result {
            Ok(inner) => inner,
            Err(_) => Err(HttpFailure::Timeout),
        },
    }
}
