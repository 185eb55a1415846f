//! Provider settings with serde support

use super::error::ValidationError;
use super::secrets::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Supported vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    OpenAI,
    #[serde(alias = "azure_openai")]
    Azure,
    Anthropic,
    #[serde(alias = "gemini")]
    Google,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::OpenAI => "openai",
            Vendor::Azure => "azure",
            Vendor::Anthropic => "anthropic",
            Vendor::Google => "google",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Vendor::OpenAI),
            "azure" | "azure_openai" => Ok(Vendor::Azure),
            "anthropic" => Ok(Vendor::Anthropic),
            "google" | "gemini" => Ok(Vendor::Google),
            other => Err(ValidationError::not_allowed(
                "vendor",
                other,
                "openai, azure, anthropic, google",
            )),
        }
    }
}

/// Backoff configuration for the retrying executor
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    /// Retries after the initial attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Upper bound (exclusive) of the multiplicative jitter
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetrySettings {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.base_delay_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.base_delay_ms", path),
                "greater than 0",
            ));
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(ValidationError::conflict(
                format!("{}.max_delay_ms", path),
                "base_delay_ms",
            )
            .with_context("the delay cap must not be below the base delay"));
        }

        if !(0.0..=0.25).contains(&self.jitter_factor) {
            return Err(ValidationError::out_of_range(
                format!("{}.jitter_factor", path),
                format!("within [0, 0.25], got {}", self.jitter_factor),
            ));
        }

        Ok(())
    }
}

/// Settings for one provider instance
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    pub vendor: Vendor,

    pub api_key: SecretString,

    /// Overrides the vendor's public endpoint; required for Azure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Used when a request leaves `model` empty, and by health checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Injected for vendors that require a token limit on every request
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub retry: RetrySettings,

    /// OpenAI organization header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    /// Vendor API version (Anthropic version header, Azure api-version)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Azure deployment name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra_headers: HashMap<String, String>,
}

fn default_max_retries() -> u32 { 3 }
fn default_base_delay() -> u64 { 1000 }
fn default_max_delay() -> u64 { 60_000 }
fn default_jitter_factor() -> f64 { 0.25 }
fn default_max_tokens() -> u32 { 4096 }
fn default_timeout() -> u64 { 60_000 }
fn default_connect_timeout() -> u64 { 10_000 }

impl ProviderSettings {
    pub fn new(vendor: Vendor, api_key: impl Into<SecretString>) -> Self {
        Self {
            vendor,
            api_key: api_key.into(),
            base_url: None,
            default_model: None,
            default_max_tokens: default_max_tokens(),
            timeout_ms: default_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            retry: RetrySettings::default(),
            organization: None,
            api_version: None,
            deployment: None,
            extra_headers: HashMap::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_default_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn with_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = Some(deployment.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    /// Base URL with any trailing slash removed
    pub fn base_url_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.api_key.is_empty() {
            return Err(ValidationError::missing("api_key"));
        }

        if let Some(base_url) = &self.base_url {
            match url::Url::parse(base_url) {
                Ok(url) => {
                    if url.scheme() != "http" && url.scheme() != "https" {
                        return Err(ValidationError::malformed(
                            "base_url",
                            format!("scheme must be http or https, got {}", url.scheme()),
                        ));
                    }
                }
                Err(e) => return Err(ValidationError::malformed("base_url", e.to_string())),
            }
        }

        if matches!(&self.default_model, Some(m) if m.trim().is_empty()) {
            return Err(ValidationError::malformed("default_model", "blank model name"));
        }

        if self.default_max_tokens == 0 {
            return Err(ValidationError::out_of_range(
                "default_max_tokens",
                "greater than 0",
            ));
        }

        if self.timeout_ms == 0 {
            return Err(ValidationError::out_of_range("timeout_ms", "greater than 0"));
        }

        if self.connect_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                "connect_timeout_ms",
                "greater than 0",
            ));
        }

        self.retry.validate("retry")?;

        if self.vendor == Vendor::Azure {
            if self.base_url.is_none() {
                return Err(ValidationError::missing("base_url")
                    .with_context("Azure OpenAI needs the resource endpoint"));
            }
            if self.deployment.as_deref().is_none_or(|d| d.trim().is_empty()) {
                return Err(ValidationError::missing("deployment")
                    .with_context("Azure OpenAI routes requests by deployment name"));
            }
        }

        Ok(())
    }
}

/// Partial settings accepted by `Provider::configure`.
///
/// Every field is optional; `extra_headers` entries are merged into the
/// existing map. The vendor cannot be changed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra_headers: HashMap<String, String>,
}

impl ProviderSettingsPatch {
    /// Apply onto `current`, returning validated settings. `current` is untouched.
    pub fn apply(&self, current: &ProviderSettings) -> Result<ProviderSettings, ValidationError> {
        let mut next = current.clone();

        if let Some(api_key) = &self.api_key {
            next.api_key = api_key.clone();
        }
        if let Some(base_url) = &self.base_url {
            next.base_url = Some(base_url.clone());
        }
        if let Some(model) = &self.default_model {
            next.default_model = Some(model.clone());
        }
        if let Some(max_tokens) = self.default_max_tokens {
            next.default_max_tokens = max_tokens;
        }
        if let Some(timeout) = self.timeout_ms {
            next.timeout_ms = timeout;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            next.connect_timeout_ms = timeout;
        }
        if let Some(retry) = &self.retry {
            next.retry = retry.clone();
        }
        if let Some(organization) = &self.organization {
            next.organization = Some(organization.clone());
        }
        if let Some(version) = &self.api_version {
            next.api_version = Some(version.clone());
        }
        if let Some(deployment) = &self.deployment {
            next.deployment = Some(deployment.clone());
        }
        next.extra_headers
            .extend(self.extra_headers.iter().map(|(k, v)| (k.clone(), v.clone())));

        next.validate()?;
        Ok(next)
    }

    /// True when the patch changes anything the HTTP client is built from
    pub fn touches_transport(&self) -> bool {
        self.connect_timeout_ms.is_some()
    }
}
