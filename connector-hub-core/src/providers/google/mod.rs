//! Google Gemini `generateContent` adapter
//!
//! The model name is part of the URL, the assistant role is called `model`,
//! and streaming uses `alt=sse` where every record is a full response object.

pub mod converter;
pub mod error;
pub mod streaming;
pub mod types;

use crate::config::{ProviderSettings, Vendor};
use crate::protocol::{CompletionRequest, CompletionResponse, StreamChunk};
use crate::providers::adapter::{ProviderCapabilities, StreamGrammar, TokenLimit, VendorAdapter};
use crate::providers::error::{MappedError, ProviderResult, RawError};
use error::GOOGLE_ERRORS;
use streaming::GoogleStreamState;
use types::{GoogleRequest, GoogleResponse, GoogleStreamEvent};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const OUTPUT_LIMITS: &[(&str, u32)] = &[
    ("gemini-1.5-pro", 8_192),
    ("gemini-1.5-flash", 8_192),
    ("gemini-2.0-flash", 8_192),
    ("gemini-2.0-flash-lite", 8_192),
    ("gemini-2.5-pro", 65_536),
    ("gemini-2.5-flash", 65_536),
    ("gemini-2.5-flash-lite", 65_536),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleAdapter;

impl GoogleAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl VendorAdapter for GoogleAdapter {
    type Request = GoogleRequest;
    type Response = GoogleResponse;
    type StreamEvent = GoogleStreamEvent;
    type Accumulator = GoogleStreamState;

    fn name(&self) -> &'static str {
        "google"
    }

    fn vendor(&self) -> Vendor {
        Vendor::Google
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_system_role: false,
            supports_json_mode: true,
            supports_consecutive_same_role: false,
            max_context_tokens: 1_048_576,
            ..Default::default()
        }
    }

    fn stream_grammar(&self) -> StreamGrammar {
        StreamGrammar::LineDelimited
    }

    fn endpoint(&self, settings: &ProviderSettings, model: &str, stream: bool) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        let method = if stream {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        format!("{}/models/{}:{}", settings.base_url_or(DEFAULT_BASE_URL), model, method)
    }

    fn headers(&self, settings: &ProviderSettings) -> Vec<(String, String)> {
        vec![(
            "x-goog-api-key".to_string(),
            settings.api_key.expose_secret().to_string(),
        )]
    }

    fn output_token_limit(&self, model: &str) -> TokenLimit {
        let model = model.strip_prefix("models/").unwrap_or(model);
        TokenLimit::from_prefix_table(model, OUTPUT_LIMITS)
    }

    fn to_vendor_request(
        &self,
        request: &CompletionRequest,
        _settings: &ProviderSettings,
        _stream: bool,
    ) -> GoogleRequest {
        converter::to_google_request(request)
    }

    fn from_vendor_response(&self, response: GoogleResponse) -> ProviderResult<CompletionResponse> {
        converter::from_google_response(response)
    }

    fn transform_stream_event(
        &self,
        event: GoogleStreamEvent,
        acc: &mut GoogleStreamState,
    ) -> ProviderResult<Option<StreamChunk>> {
        streaming::transform_event(&GOOGLE_ERRORS, event, acc)
    }

    fn map_error(&self, raw: RawError<'_>) -> MappedError {
        GOOGLE_ERRORS.map(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecretString;

    fn settings() -> ProviderSettings {
        ProviderSettings::new(Vendor::Google, SecretString::new("AIza-test"))
    }

    #[test]
    fn test_endpoints() {
        let adapter = GoogleAdapter::new();
        assert_eq!(
            adapter.endpoint(&settings(), "gemini-2.0-flash", false),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(
            adapter.endpoint(&settings(), "models/gemini-1.5-pro", true),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn test_key_header() {
        let headers = GoogleAdapter.headers(&settings());
        assert_eq!(headers, vec![("x-goog-api-key".to_string(), "AIza-test".to_string())]);
    }

    #[test]
    fn test_output_limits() {
        assert_eq!(GoogleAdapter.output_token_limit("gemini-2.5-pro"), TokenLimit::Known(65_536));
        assert_eq!(
            GoogleAdapter.output_token_limit("gemini-1.5-flash-002"),
            TokenLimit::Known(8_192)
        );
        assert_eq!(GoogleAdapter.output_token_limit("gemini-exp-1206"), TokenLimit::Unknown);
    }

    #[test]
    fn test_capabilities() {
        let caps = GoogleAdapter.capabilities();
        assert!(!caps.supports_system_role);
        assert!(caps.supports_json_mode);
        assert!(!caps.requires_max_tokens);
        assert_eq!(GoogleAdapter.temperature_range(), 0.0..=2.0);
    }
}
