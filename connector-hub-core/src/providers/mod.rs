//! Vendor adapters and the provider facade
//!
//! Each vendor module implements [`VendorAdapter`]: request and response
//! transformation, the streaming grammar and event transform, the error
//! table, endpoints and headers. [`ProviderClient`] wraps any adapter with
//! HTTP, retries and lifecycle handling and exposes it as a [`Provider`].

pub mod adapter;
pub mod anthropic;
pub mod azure;
pub mod error;
pub mod facade;
pub mod google;
pub mod openai;
pub mod retry;
pub mod stream;
pub mod transform;

pub use adapter::{ProviderCapabilities, StreamGrammar, TokenLimit, VendorAdapter};
pub use anthropic::AnthropicAdapter;
pub use azure::AzureOpenAIAdapter;
pub use error::{ErrorKind, MappedError, ProviderError, ProviderResult, RawError};
pub use facade::{HealthStatus, Provider, ProviderClient, ProviderMetadata};
pub use google::GoogleAdapter;
pub use openai::OpenAIAdapter;
pub use retry::{RetryExecutor, RetryPolicy, RetryResult};
pub use stream::{collect_response, collect_stream, ChunkStream};

use crate::config::{ProviderSettings, Vendor};
use std::sync::Arc;

impl Vendor {
    /// Build an uninitialized provider for this vendor
    pub fn create_provider(self, settings: ProviderSettings) -> ProviderResult<Arc<dyn Provider>> {
        if settings.vendor != self {
            return Err(ProviderError::Configuration(format!(
                "settings are for {}, not {}",
                settings.vendor, self
            )));
        }
        Ok(match self {
            Vendor::OpenAI => Arc::new(ProviderClient::new(OpenAIAdapter, settings)?),
            Vendor::Azure => Arc::new(ProviderClient::new(AzureOpenAIAdapter, settings)?),
            Vendor::Anthropic => Arc::new(ProviderClient::new(AnthropicAdapter, settings)?),
            Vendor::Google => Arc::new(ProviderClient::new(GoogleAdapter, settings)?),
        })
    }
}

/// Build a provider for the vendor named in `settings`
pub fn create_provider(settings: ProviderSettings) -> ProviderResult<Arc<dyn Provider>> {
    settings.vendor.create_provider(settings)
}
