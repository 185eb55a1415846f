//! OpenAI chat completions adapter
//!
//! Translates between the unified protocol and the `/chat/completions`
//! endpoint. Azure OpenAI reuses the types, converter and stream handling
//! from this module.

pub mod converter;
pub mod error;
pub mod streaming;
pub mod types;

use crate::config::{ProviderSettings, Vendor};
use crate::protocol::{CompletionRequest, CompletionResponse, StreamChunk};
use crate::providers::adapter::{ProviderCapabilities, StreamGrammar, TokenLimit, VendorAdapter};
use crate::providers::error::{MappedError, ProviderResult, RawError};
use error::OPENAI_ERRORS;
use streaming::OpenAIStreamState;
use types::{OpenAIRequest, OpenAIResponse, OpenAIStreamEvent};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub const DONE_SENTINEL: &str = "[DONE]";

/// Known output limits by model family
const OUTPUT_LIMITS: &[(&str, u32)] = &[
    ("gpt-4o", 16_384),
    ("gpt-4o-mini", 16_384),
    ("gpt-4-turbo", 4_096),
    ("gpt-4", 8_192),
    ("gpt-4.1", 32_768),
    ("gpt-4.1-mini", 32_768),
    ("gpt-3.5-turbo", 4_096),
    ("o1", 100_000),
    ("o1-mini", 65_536),
    ("o3", 100_000),
    ("o3-mini", 100_000),
    ("o4-mini", 100_000),
];

/// OpenAI adapter
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAIAdapter;

impl OpenAIAdapter {
    pub fn new() -> Self {
        Self
    }
}

pub(crate) fn openai_capabilities() -> ProviderCapabilities {
    ProviderCapabilities {
        supports_json_mode: true,
        max_context_tokens: 128_000,
        ..Default::default()
    }
}

impl VendorAdapter for OpenAIAdapter {
    type Request = OpenAIRequest;
    type Response = OpenAIResponse;
    type StreamEvent = OpenAIStreamEvent;
    type Accumulator = OpenAIStreamState;

    fn name(&self) -> &'static str {
        "openai"
    }

    fn vendor(&self) -> Vendor {
        Vendor::OpenAI
    }

    fn capabilities(&self) -> ProviderCapabilities {
        openai_capabilities()
    }

    fn stream_grammar(&self) -> StreamGrammar {
        StreamGrammar::SentinelDelimited {
            sentinel: DONE_SENTINEL,
        }
    }

    fn endpoint(&self, settings: &ProviderSettings, _model: &str, _stream: bool) -> String {
        format!("{}/chat/completions", settings.base_url_or(DEFAULT_BASE_URL))
    }

    fn headers(&self, settings: &ProviderSettings) -> Vec<(String, String)> {
        let mut headers = vec![(
            "Authorization".to_string(),
            format!("Bearer {}", settings.api_key.expose_secret()),
        )];
        if let Some(org) = &settings.organization {
            headers.push(("OpenAI-Organization".to_string(), org.clone()));
        }
        headers
    }

    fn output_token_limit(&self, model: &str) -> TokenLimit {
        TokenLimit::from_prefix_table(model, OUTPUT_LIMITS)
    }

    fn to_vendor_request(
        &self,
        request: &CompletionRequest,
        _settings: &ProviderSettings,
        stream: bool,
    ) -> OpenAIRequest {
        converter::to_openai_request(request, stream)
    }

    fn from_vendor_response(&self, response: OpenAIResponse) -> ProviderResult<CompletionResponse> {
        converter::from_openai_response(response)
    }

    fn transform_stream_event(
        &self,
        event: OpenAIStreamEvent,
        acc: &mut OpenAIStreamState,
    ) -> ProviderResult<Option<StreamChunk>> {
        streaming::transform_event(&OPENAI_ERRORS, event, acc)
    }

    fn map_error(&self, raw: RawError<'_>) -> MappedError {
        OPENAI_ERRORS.map(raw)
    }
}
