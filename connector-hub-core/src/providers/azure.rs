//! Azure OpenAI adapter
//!
//! Same payloads as OpenAI, routed by deployment and authenticated with an
//! `api-key` header.

use crate::config::{ProviderSettings, Vendor};
use crate::protocol::{CompletionRequest, CompletionResponse, StreamChunk};
use crate::providers::adapter::{ProviderCapabilities, StreamGrammar, TokenLimit, VendorAdapter};
use crate::providers::error::{ErrorKind, ErrorTable, MappedError, ProviderResult, RawError};
use crate::providers::openai::error::parse_error_body;
use crate::providers::openai::streaming::{self, OpenAIStreamState};
use crate::providers::openai::types::{OpenAIRequest, OpenAIResponse, OpenAIStreamEvent};
use crate::providers::openai::{self, converter, OpenAIAdapter, DONE_SENTINEL};

pub const DEFAULT_API_VERSION: &str = "2024-10-21";

pub const AZURE_ERRORS: ErrorTable = ErrorTable {
    provider: "azure",
    parse: parse_error_body,
    hint: azure_hint,
};

fn azure_hint(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::Authentication => {
            Some("Check the api-key of your Azure OpenAI resource under Keys and Endpoint in the Azure portal")
        }
        ErrorKind::RateLimit => Some("Raise the deployment's tokens-per-minute quota in the Azure portal"),
        _ => None,
    }
}

/// Azure OpenAI adapter
#[derive(Debug, Clone, Copy, Default)]
pub struct AzureOpenAIAdapter;

impl AzureOpenAIAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl VendorAdapter for AzureOpenAIAdapter {
    type Request = OpenAIRequest;
    type Response = OpenAIResponse;
    type StreamEvent = OpenAIStreamEvent;
    type Accumulator = OpenAIStreamState;

    fn name(&self) -> &'static str {
        "azure"
    }

    fn vendor(&self) -> Vendor {
        Vendor::Azure
    }

    fn capabilities(&self) -> ProviderCapabilities {
        openai::openai_capabilities()
    }

    fn stream_grammar(&self) -> StreamGrammar {
        StreamGrammar::SentinelDelimited {
            sentinel: DONE_SENTINEL,
        }
    }

    /// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version=…`
    fn endpoint(&self, settings: &ProviderSettings, model: &str, _stream: bool) -> String {
        let deployment = settings.deployment.as_deref().unwrap_or(model);
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            settings.base_url_or(""),
            deployment,
            self.api_version(settings).unwrap_or_default()
        )
    }

    fn headers(&self, settings: &ProviderSettings) -> Vec<(String, String)> {
        vec![(
            "api-key".to_string(),
            settings.api_key.expose_secret().to_string(),
        )]
    }

    fn api_version(&self, settings: &ProviderSettings) -> Option<String> {
        Some(
            settings
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        )
    }

    /// Deployments front the OpenAI models, so the same table applies
    fn output_token_limit(&self, model: &str) -> TokenLimit {
        OpenAIAdapter.output_token_limit(model)
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
        streaming::transform_event(&AZURE_ERRORS, event, acc)
    }

    fn map_error(&self, raw: RawError<'_>) -> MappedError {
        AZURE_ERRORS.map(raw)
    }
}
