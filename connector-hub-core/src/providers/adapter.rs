//! Vendor adapter trait and capabilities
//!
//! One [`VendorAdapter`] per vendor bundles everything that differs between
//! wire protocols: payload shapes, the streaming grammar, the error table,
//! endpoints and auth headers. The facade depends only on this trait.

use crate::config::{ProviderSettings, Vendor};
use crate::protocol::{CompletionRequest, CompletionResponse, StreamChunk};
use crate::providers::error::{MappedError, ProviderResult, RawError};
use crate::providers::stream::RecordSeparator;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Core trait every vendor implements
pub trait VendorAdapter: Clone + Send + Sync + 'static {
    /// Vendor request payload
    type Request: Serialize + Send + Sync;
    /// Vendor non-streaming response payload
    type Response: DeserializeOwned + Send;
    /// One decoded stream record
    type StreamEvent: DeserializeOwned + Send;
    /// Per-stream state, owned by exactly one in-flight stream
    type Accumulator: Default + Send + 'static;

    fn name(&self) -> &'static str;

    fn vendor(&self) -> Vendor;

    fn capabilities(&self) -> ProviderCapabilities;

    fn stream_grammar(&self) -> StreamGrammar;

    /// Full URL for a completion call
    fn endpoint(&self, settings: &ProviderSettings, model: &str, stream: bool) -> String;

    /// Auth and version headers; extra headers from settings are added by the caller
    fn headers(&self, settings: &ProviderSettings) -> Vec<(String, String)>;

    /// API version this adapter speaks, when the vendor versions its API
    fn api_version(&self, _settings: &ProviderSettings) -> Option<String> {
        None
    }

    fn temperature_range(&self) -> RangeInclusive<f32> {
        0.0..=2.0
    }

    fn output_token_limit(&self, model: &str) -> TokenLimit;

    /// Unified to vendor. Pure and total over validated requests.
    fn to_vendor_request(
        &self,
        request: &CompletionRequest,
        settings: &ProviderSettings,
        stream: bool,
    ) -> Self::Request;

    /// Vendor to unified
    fn from_vendor_response(&self, response: Self::Response) -> ProviderResult<CompletionResponse>;

    /// Feed one stream event through the accumulator. Events that only
    /// update state return `Ok(None)`; vendor error events return `Err`.
    fn transform_stream_event(
        &self,
        event: Self::StreamEvent,
        acc: &mut Self::Accumulator,
    ) -> ProviderResult<Option<StreamChunk>>;

    fn map_error(&self, raw: RawError<'_>) -> MappedError;
}

/// How a vendor frames its streaming response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamGrammar {
    /// One JSON delta per `data:` line, ended by a literal sentinel record
    SentinelDelimited { sentinel: &'static str },
    /// One JSON object per `data:` line, ended by EOF
    LineDelimited,
    /// Typed start/delta/stop events per content block, records split on blank lines
    BlockLifecycle,
}

impl StreamGrammar {
    pub fn separator(&self) -> RecordSeparator {
        match self {
            StreamGrammar::SentinelDelimited { .. } | StreamGrammar::LineDelimited => {
                RecordSeparator::Newline
            }
            StreamGrammar::BlockLifecycle => RecordSeparator::BlankLine,
        }
    }

    pub fn is_sentinel(&self, data: &str) -> bool {
        matches!(self, StreamGrammar::SentinelDelimited { sentinel } if data.trim() == *sentinel)
    }
}

/// Output token limit for a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TokenLimit {
    /// Validated limit from the adapter's model table
    Known(u32),
    /// Model not in the table; no limit is assumed
    Unknown,
}

impl TokenLimit {
    /// Clamp `value` to the limit when one is known
    pub fn clamp(&self, value: u32) -> u32 {
        match self {
            TokenLimit::Known(limit) => value.min(*limit),
            TokenLimit::Unknown => value,
        }
    }

    pub fn allows(&self, value: u32) -> bool {
        match self {
            TokenLimit::Known(limit) => value <= *limit,
            TokenLimit::Unknown => true,
        }
    }

    /// Look up `model` in a family table.
    ///
    /// An entry matches the exact name or the name followed by a `-` suffix
    /// (dated snapshots, variants); the longest match wins. Anything else
    /// is `Unknown`.
    pub fn from_prefix_table(model: &str, table: &[(&str, u32)]) -> Self {
        table
            .iter()
            .filter(|(prefix, _)| {
                model == *prefix
                    || model
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('-'))
            })
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, limit)| TokenLimit::Known(*limit))
            .unwrap_or(TokenLimit::Unknown)
    }
}

/// Static capability description for a vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Accepts system messages in the turn list
    pub supports_system_role: bool,

    pub supports_json_mode: bool,

    pub supports_tools: bool,

    pub supports_streaming: bool,

    pub supports_vision: bool,

    /// Every request must carry a token limit
    pub requires_max_tokens: bool,

    /// Accepts consecutive messages with the same role
    pub supports_consecutive_same_role: bool,

    /// Largest context window across the vendor's current models
    pub max_context_tokens: u32,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            supports_system_role: true,
            supports_json_mode: false,
            supports_tools: true,
            supports_streaming: true,
            supports_vision: true,
            requires_max_tokens: false,
            supports_consecutive_same_role: true,
            max_context_tokens: 128_000,
        }
    }
}

/// Adapter headers followed by the settings' extra headers
pub(crate) fn all_headers<A: VendorAdapter>(adapter: &A, settings: &ProviderSettings) -> Vec<(String, String)> {
    let mut headers = adapter.headers(settings);
    let mut extra: Vec<_> = settings
        .extra_headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    extra.sort();
    headers.extend(extra);
    headers
}
