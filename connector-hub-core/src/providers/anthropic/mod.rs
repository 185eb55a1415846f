//! Anthropic Messages API adapter
//!
//! Differences from the chat-completions family that this module absorbs:
//! - system prompt is a top-level field
//! - content is a list of typed blocks, tool results live in user turns
//! - `max_tokens` is mandatory
//! - streaming uses the block-lifecycle grammar

pub mod converter;
pub mod error;
pub mod streaming;
pub mod types;

use crate::config::{ProviderSettings, Vendor};
use crate::protocol::{CompletionRequest, CompletionResponse, StreamChunk};
use crate::providers::adapter::{ProviderCapabilities, StreamGrammar, TokenLimit, VendorAdapter};
use crate::providers::error::{MappedError, ProviderResult, RawError};
use error::ANTHROPIC_ERRORS;
use std::ops::RangeInclusive;
use streaming::AnthropicStreamState;
use types::{AnthropicRequest, AnthropicResponse, AnthropicStreamEvent};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

pub const DEFAULT_API_VERSION: &str = "2023-06-01";

const OUTPUT_LIMITS: &[(&str, u32)] = &[
    ("claude-3-haiku", 4_096),
    ("claude-3-sonnet", 4_096),
    ("claude-3-opus", 4_096),
    ("claude-3-5-haiku", 8_192),
    ("claude-3-5-sonnet", 8_192),
    ("claude-3-7-sonnet", 64_000),
    ("claude-sonnet-4", 64_000),
    ("claude-sonnet-4-5", 64_000),
    ("claude-haiku-4-5", 64_000),
    ("claude-opus-4", 32_000),
    ("claude-opus-4-1", 32_000),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

impl AnthropicAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl VendorAdapter for AnthropicAdapter {
    type Request = AnthropicRequest;
    type Response = AnthropicResponse;
    type StreamEvent = AnthropicStreamEvent;
    type Accumulator = AnthropicStreamState;

    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn vendor(&self) -> Vendor {
        Vendor::Anthropic
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_system_role: false,
            supports_json_mode: false,
            requires_max_tokens: true,
            supports_consecutive_same_role: false,
            max_context_tokens: 200_000,
            ..Default::default()
        }
    }

    fn stream_grammar(&self) -> StreamGrammar {
        StreamGrammar::BlockLifecycle
    }

    fn endpoint(&self, settings: &ProviderSettings, _model: &str, _stream: bool) -> String {
        format!("{}/messages", settings.base_url_or(DEFAULT_BASE_URL))
    }

    fn headers(&self, settings: &ProviderSettings) -> Vec<(String, String)> {
        vec![
            ("x-api-key".to_string(), settings.api_key.expose_secret().to_string()),
            (
                "anthropic-version".to_string(),
                self.api_version(settings).unwrap_or_default(),
            ),
        ]
    }

    fn api_version(&self, settings: &ProviderSettings) -> Option<String> {
        Some(
            settings
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        )
    }

    fn temperature_range(&self) -> RangeInclusive<f32> {
        0.0..=1.0
    }

    fn output_token_limit(&self, model: &str) -> TokenLimit {
        TokenLimit::from_prefix_table(model, OUTPUT_LIMITS)
    }

    fn to_vendor_request(
        &self,
        request: &CompletionRequest,
        settings: &ProviderSettings,
        stream: bool,
    ) -> AnthropicRequest {
        converter::to_anthropic_request(
            request,
            settings,
            self.output_token_limit(&request.model),
            stream,
        )
    }

    fn from_vendor_response(&self, response: AnthropicResponse) -> ProviderResult<CompletionResponse> {
        Ok(converter::from_anthropic_response(response))
    }

    fn transform_stream_event(
        &self,
        event: AnthropicStreamEvent,
        acc: &mut AnthropicStreamState,
    ) -> ProviderResult<Option<StreamChunk>> {
        streaming::transform_event(&ANTHROPIC_ERRORS, event, acc)
    }

    fn map_error(&self, raw: RawError<'_>) -> MappedError {
        ANTHROPIC_ERRORS.map(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecretString;
    use crate::protocol::Message;

    #[test]
    fn test_headers_send_version_unmodified() {
        let settings = ProviderSettings::new(Vendor::Anthropic, SecretString::new("sk-ant"));
        let headers = AnthropicAdapter.headers(&settings);
        assert!(headers.contains(&("x-api-key".to_string(), "sk-ant".to_string())));
        assert!(headers.contains(&("anthropic-version".to_string(), "2023-06-01".to_string())));

        let pinned = settings.with_api_version("2024-10-22");
        assert_eq!(AnthropicAdapter.api_version(&pinned).as_deref(), Some("2024-10-22"));
    }

    #[test]
    fn test_limits_clamp_injected_default() {
        let settings = ProviderSettings::new(Vendor::Anthropic, SecretString::new("sk-ant"))
            .with_default_max_tokens(16_000);
        let request = CompletionRequest::new("claude-3-5-haiku-20241022", vec![Message::user("Hi")]);
        let payload = AnthropicAdapter.to_vendor_request(&request, &settings, false);
        assert_eq!(payload.max_tokens, 8_192);

        let unknown = CompletionRequest::new("claude-next", vec![Message::user("Hi")]);
        let payload = AnthropicAdapter.to_vendor_request(&unknown, &settings, false);
        assert_eq!(payload.max_tokens, 16_000);
    }

    #[test]
    fn test_endpoint() {
        let settings = ProviderSettings::new(Vendor::Anthropic, SecretString::new("k"));
        assert_eq!(
            AnthropicAdapter.endpoint(&settings, "claude-opus-4", true),
            "https://api.anthropic.com/v1/messages"
        );
        assert_eq!(AnthropicAdapter.output_token_limit("claude-opus-4-1-20250805"), TokenLimit::Known(32_000));
    }
}
