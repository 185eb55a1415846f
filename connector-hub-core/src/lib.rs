//! Connector Hub Core
//!
//! A provider adapter layer: callers speak one unified request, response and
//! stream-chunk model, and each vendor adapter translates to and from that
//! vendor's wire protocol.
//!
//! ```no_run
//! use connector_hub_core::config::{ProviderSettings, SecretString, Vendor};
//! use connector_hub_core::protocol::{CompletionRequest, Message};
//! use connector_hub_core::providers::Provider;
//!
//! # async fn run() -> Result<(), connector_hub_core::providers::ProviderError> {
//! let settings = ProviderSettings::new(Vendor::Anthropic, SecretString::new("sk-ant-..."))
//!     .with_default_model("claude-3-5-sonnet-20241022");
//! let provider = Vendor::Anthropic.create_provider(settings)?;
//! provider.initialize().await?;
//!
//! let request = CompletionRequest::new("", vec![Message::user("Hello!")]);
//! let response = provider.complete(&request).await?;
//! println!("{}", response.content());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod http;
pub mod protocol;
pub mod providers;

/// Returns the version of this library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
