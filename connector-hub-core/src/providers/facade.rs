//! Provider facade
//!
//! [`ProviderClient`] composes one [`VendorAdapter`] with the shared HTTP
//! client and the retry executor, and exposes the result through the
//! object-safe [`Provider`] trait. Settings live behind an `Arc` snapshot:
//! `configure` swaps the snapshot and in-flight calls finish on the one they
//! started with.

use crate::config::{ProviderSettings, ProviderSettingsPatch, ValidationError, Vendor};
use crate::http::{HttpClient, HttpRequest, RequestOptions};
use crate::protocol::{CompletionRequest, CompletionResponse, Message, MessageRole};
use crate::providers::adapter::{all_headers, ProviderCapabilities, TokenLimit, VendorAdapter};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::retry::{RetryExecutor, RetryPolicy};
use crate::providers::stream::{decode_stream, ChunkStream};
use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info};

/// Result of [`Provider::health_check`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Static description of a configured provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub name: String,
    pub vendor: Vendor,
    /// Version of this library
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    pub capabilities: ProviderCapabilities,
    pub default_model_output_limit: TokenLimit,
}

/// The surface the orchestrator talks to
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Validate settings and accept calls
    async fn initialize(&self) -> ProviderResult<()>;

    /// Stop accepting calls and cancel every in-flight call
    async fn shutdown(&self) -> ProviderResult<()>;

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        self.complete_with_options(request, RequestOptions::default()).await
    }

    async fn complete_with_options(
        &self,
        request: &CompletionRequest,
        options: RequestOptions,
    ) -> ProviderResult<CompletionResponse>;

    async fn stream(&self, request: &CompletionRequest) -> ProviderResult<ChunkStream> {
        self.stream_with_options(request, RequestOptions::default()).await
    }

    /// Open a stream. Retries happen only while waiting for the response
    /// headers; once chunks flow, failures end the stream.
    async fn stream_with_options(
        &self,
        request: &CompletionRequest,
        options: RequestOptions,
    ) -> ProviderResult<ChunkStream>;

    /// One-token real completion against the default model, without retries
    async fn health_check(&self) -> HealthStatus;

    /// Reject a request locally before any network call
    fn validate_request(&self, request: &CompletionRequest) -> ProviderResult<()>;

    /// Apply a partial settings update. An invalid patch leaves the current
    /// settings in place.
    async fn configure(&self, patch: ProviderSettingsPatch) -> ProviderResult<()>;

    fn metadata(&self) -> ProviderMetadata;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Ready,
    Closed,
}

#[derive(Debug)]
struct ClientState {
    settings: ProviderSettings,
    http: HttpClient,
    retry: RetryExecutor,
}

impl ClientState {
    fn new(settings: ProviderSettings, http: HttpClient) -> Self {
        let retry = RetryExecutor::new(RetryPolicy::from(&settings.retry));
        Self {
            settings,
            http,
            retry,
        }
    }

    fn attempt_timeout(&self, options: &RequestOptions) -> Duration {
        options
            .timeout
            .unwrap_or_else(|| Duration::from_millis(self.settings.timeout_ms))
    }
}

/// A [`Provider`] built from a vendor adapter
pub struct ProviderClient<A: VendorAdapter> {
    adapter: A,
    state: RwLock<Arc<ClientState>>,
    phase: RwLock<Phase>,
    shutdown: CancellationToken,
}

impl<A: VendorAdapter> ProviderClient<A> {
    pub fn new(adapter: A, settings: ProviderSettings) -> ProviderResult<Self> {
        if settings.vendor != adapter.vendor() {
            return Err(ProviderError::Configuration(format!(
                "settings for {} cannot drive the {} adapter",
                settings.vendor,
                adapter.name()
            )));
        }
        settings.validate()?;
        let http = HttpClient::new(Duration::from_millis(settings.connect_timeout_ms))?;

        Ok(Self {
            adapter,
            state: RwLock::new(Arc::new(ClientState::new(settings, http))),
            phase: RwLock::new(Phase::Created),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Current settings snapshot
    pub fn settings(&self) -> ProviderSettings {
        self.snapshot().settings.clone()
    }

    fn snapshot(&self) -> Arc<ClientState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn phase(&self) -> Phase {
        *self.phase.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.write().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    fn ready_state(&self) -> ProviderResult<Arc<ClientState>> {
        match self.phase() {
            Phase::Ready => Ok(self.snapshot()),
            Phase::Created => Err(ProviderError::Configuration(format!(
                "{} provider is not initialized",
                self.adapter.name()
            ))),
            Phase::Closed => Err(ProviderError::Configuration(format!(
                "{} provider has been shut down",
                self.adapter.name()
            ))),
        }
    }

    /// Fill the default model and validate
    fn prepare(&self, request: &CompletionRequest, settings: &ProviderSettings) -> ProviderResult<CompletionRequest> {
        let mut request = request.clone();
        if request.model.trim().is_empty() {
            if let Some(model) = &settings.default_model {
                request.model = model.clone();
            }
        }
        self.validate_request(&request)?;
        Ok(request)
    }

    fn encode(&self, request: &CompletionRequest, settings: &ProviderSettings, stream: bool) -> ProviderResult<Bytes> {
        let payload = self.adapter.to_vendor_request(request, settings, stream);
        serde_json::to_vec(&payload)
            .map(Bytes::from)
            .map_err(|e| ProviderError::Decode(format!("failed to encode {} request: {}", self.adapter.name(), e)))
    }

    fn decode_response(&self, body: &[u8], model: &str) -> ProviderResult<CompletionResponse> {
        let payload: A::Response = serde_json::from_slice(body).map_err(|e| {
            ProviderError::Decode(format!("invalid {} response: {}", self.adapter.name(), e))
        })?;
        let mut response = self.adapter.from_vendor_response(payload)?;
        if response.model.is_empty() {
            response.model = model.to_string();
        }
        Ok(response)
    }

    /// Token for one call, cancelled by the caller's token or by shutdown.
    ///
    /// The guard cancels the token when the call is over, which also ends the
    /// task linking the two.
    fn call_token(&self, caller: &CancellationToken) -> (CancellationToken, DropGuard) {
        let token = self.shutdown.child_token();
        let linked = token.clone();
        let caller = caller.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = caller.cancelled() => linked.cancel(),
                _ = linked.cancelled() => {}
            }
        });
        let guard = token.clone().drop_guard();
        (token, guard)
    }

    async fn send_completion(
        &self,
        state: &ClientState,
        retry: &RetryExecutor,
        request: &CompletionRequest,
        options: &RequestOptions,
    ) -> ProviderResult<CompletionResponse> {
        let adapter = &self.adapter;
        let url = adapter.endpoint(&state.settings, &request.model, false);
        let headers = all_headers(adapter, &state.settings);
        let body = self.encode(request, &state.settings, false)?;
        let timeout = state.attempt_timeout(options);

        let outcome = retry
            .execute(
                |attempt| {
                    let body = body.clone();
                    let (url, headers) = (&url, &headers);
                    async move {
                        debug!(
                            "Attempt {} to {} [request_id: {}]",
                            attempt + 1,
                            adapter.name(),
                            options.request_id
                        );
                        let bytes = state
                            .http
                            .post_json(
                                HttpRequest {
                                    provider: adapter.name(),
                                    url,
                                    headers,
                                    body,
                                },
                                options,
                                timeout,
                            )
                            .await
                            .map_err(|failure| failure.into_provider_error(|raw| adapter.map_error(raw)))?;
                        self.decode_response(&bytes, &request.model)
                    }
                },
                &options.cancellation,
            )
            .await;

        if outcome.attempts > 1 {
            info!(
                "{} call finished after {} attempts [request_id: {}]",
                adapter.name(),
                outcome.attempts,
                options.request_id
            );
        }
        outcome.result
    }
}

#[async_trait]
impl<A: VendorAdapter> Provider for ProviderClient<A> {
    fn name(&self) -> &str {
        self.adapter.name()
    }

    async fn initialize(&self) -> ProviderResult<()> {
        match self.phase() {
            Phase::Closed => Err(ProviderError::Configuration(format!(
                "{} provider has been shut down",
                self.adapter.name()
            ))),
            Phase::Ready => Ok(()),
            Phase::Created => {
                self.snapshot().settings.validate()?;
                self.set_phase(Phase::Ready);
                info!("Initialized {} provider", self.adapter.name());
                Ok(())
            }
        }
    }

    async fn shutdown(&self) -> ProviderResult<()> {
        if self.phase() != Phase::Closed {
            self.set_phase(Phase::Closed);
            self.shutdown.cancel();
            info!("Shut down {} provider", self.adapter.name());
        }
        Ok(())
    }

    async fn complete_with_options(
        &self,
        request: &CompletionRequest,
        options: RequestOptions,
    ) -> ProviderResult<CompletionResponse> {
        let state = self.ready_state()?;
        let request = self.prepare(request, &state.settings)?;
        let (token, _guard) = self.call_token(&options.cancellation);
        let options = options.with_cancellation(token);

        info!(
            "Sending completion to {} with model {} [request_id: {}]",
            self.adapter.name(),
            request.model,
            options.request_id
        );

        self.send_completion(&state, &state.retry, &request, &options)
            .await
            .inspect_err(|e| {
                error!(
                    "Completion from {} failed: {} [request_id: {}]",
                    self.adapter.name(),
                    e,
                    options.request_id
                )
            })
    }

    async fn stream_with_options(
        &self,
        request: &CompletionRequest,
        options: RequestOptions,
    ) -> ProviderResult<ChunkStream> {
        let state = self.ready_state()?;
        let request = self.prepare(request, &state.settings)?;
        let (token, guard) = self.call_token(&options.cancellation);
        let options = options.with_cancellation(token.clone());

        let adapter = &self.adapter;
        let url = adapter.endpoint(&state.settings, &request.model, true);
        let headers = all_headers(adapter, &state.settings);
        let body = self.encode(&request, &state.settings, true)?;
        let timeout = state.attempt_timeout(&options);

        info!(
            "Opening stream from {} with model {} [request_id: {}]",
            adapter.name(),
            request.model,
            options.request_id
        );

        let outcome = state
            .retry
            .execute(
                |_| {
                    let body = body.clone();
                    let (url, headers, options) = (&url, &headers, &options);
                    let http = &state.http;
                    async move {
                        http.post_stream(
                            HttpRequest {
                                provider: adapter.name(),
                                url,
                                headers,
                                body,
                            },
                            options,
                            timeout,
                        )
                        .await
                        .map_err(|failure| failure.into_provider_error(|raw| adapter.map_error(raw)))
                    }
                },
                &options.cancellation,
            )
            .await;

        let response = outcome.result.inspect_err(|e| {
            error!(
                "Stream from {} failed to open: {} [request_id: {}]",
                adapter.name(),
                e,
                options.request_id
            )
        })?;

        let mut chunks = decode_stream(
            adapter.clone(),
            response.bytes_stream(),
            token,
            options.request_id,
        );
        Ok(Box::pin(stream! {
            let _guard = guard;
            while let Some(chunk) = chunks.next().await {
                yield chunk;
            }
        }))
    }

    async fn health_check(&self) -> HealthStatus {
        let started = Instant::now();

        let result = async {
            let state = self.ready_state()?;
            let model = state.settings.default_model.clone().ok_or_else(|| {
                ProviderError::Configuration("no default model to run a health check against".to_string())
            })?;
            let request = CompletionRequest::new(model, vec![Message::user("ping")]).with_max_tokens(1);
            self.validate_request(&request)?;

            let options = RequestOptions::new().with_cancellation(self.shutdown.child_token());
            let no_retry = RetryExecutor::new(RetryPolicy::no_retry());
            self.send_completion(&state, &no_retry, &request, &options).await
        }
        .await;

        let latency_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(_) => HealthStatus {
                healthy: true,
                latency_ms,
                error: None,
            },
            Err(e) => {
                debug!("Health check for {} failed: {}", self.adapter.name(), e);
                HealthStatus {
                    healthy: false,
                    latency_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn validate_request(&self, request: &CompletionRequest) -> ProviderResult<()> {
        validate_request(&self.adapter, request).map_err(ProviderError::from)
    }

    async fn configure(&self, patch: ProviderSettingsPatch) -> ProviderResult<()> {
        if self.phase() == Phase::Closed {
            return Err(ProviderError::Configuration(format!(
                "{} provider has been shut down",
                self.adapter.name()
            )));
        }

        let current = self.snapshot();
        let settings = patch.apply(&current.settings)?;
        let http = if patch.touches_transport() {
            HttpClient::new(Duration::from_millis(settings.connect_timeout_ms))?
        } else {
            current.http.clone()
        };

        let key_hint = settings.api_key.hint();
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(ClientState::new(settings, http));
        info!(key = %key_hint, "Reconfigured {} provider", self.adapter.name());
        Ok(())
    }

    fn metadata(&self) -> ProviderMetadata {
        let state = self.snapshot();
        let settings = &state.settings;
        ProviderMetadata {
            name: self.adapter.name().to_string(),
            vendor: self.adapter.vendor(),
            version: crate::version().to_string(),
            api_version: self.adapter.api_version(settings),
            default_model: settings.default_model.clone(),
            capabilities: self.adapter.capabilities(),
            default_model_output_limit: settings
                .default_model
                .as_deref()
                .map(|model| self.adapter.output_token_limit(model))
                .unwrap_or(TokenLimit::Unknown),
        }
    }
}

/// Local request checks shared by every adapter
pub fn validate_request<A: VendorAdapter>(adapter: &A, request: &CompletionRequest) -> Result<(), ValidationError> {
    if request.model.trim().is_empty() {
        return Err(ValidationError::missing("model"));
    }

    if request.messages.is_empty() {
        return Err(ValidationError::missing("messages").with_context("at least one message is needed"));
    }

    if let Some(temperature) = request.temperature {
        let range = adapter.temperature_range();
        if !range.contains(&temperature) {
            return Err(ValidationError::out_of_range(
                "temperature",
                format!(
                    "between {} and {} for {}, got {}",
                    range.start(),
                    range.end(),
                    adapter.name(),
                    temperature
                ),
            ));
        }
    }

    if let Some(top_p) = request.top_p {
        if !(0.0..=1.0).contains(&top_p) {
            return Err(ValidationError::out_of_range(
                "top_p",
                format!("between 0 and 1, got {}", top_p),
            ));
        }
    }

    if let Some(max_tokens) = request.max_tokens {
        if max_tokens == 0 {
            return Err(ValidationError::out_of_range("max_tokens", "greater than 0"));
        }
        if let TokenLimit::Known(limit) = adapter.output_token_limit(&request.model) {
            if max_tokens > limit {
                return Err(ValidationError::out_of_range(
                    "max_tokens",
                    format!("at most {} for {}, got {}", limit, request.model, max_tokens),
                ));
            }
        }
    }

    for (i, message) in request.messages.iter().enumerate() {
        validate_message(i, message)?;
    }

    Ok(())
}

fn validate_message(index: usize, message: &Message) -> Result<(), ValidationError> {
    match message.role {
        MessageRole::Tool if message.tool_call_id.as_deref().is_none_or(str::is_empty) => Err(
            ValidationError::missing(ValidationError::message_field(index, "tool_call_id"))
                .with_context("tool results must reference the call they answer"),
        ),
        MessageRole::Function
            if message.name.as_deref().is_none_or(str::is_empty) && message.tool_call_id.is_none() =>
        {
            Err(ValidationError::missing(ValidationError::message_field(index, "name"))
                .with_context("function results must name the function"))
        }
        _ => Ok(()),
    }
}
