//! Configuration module
//!
//! Provider settings arrive as values (or deserialized documents) from the
//! orchestrator; this module defines their schema, defaults and validation.

mod error;
mod schema;
mod secrets;

pub use error::{ValidationError, ValidationErrorKind};
pub use schema::{ProviderSettings, ProviderSettingsPatch, RetrySettings, Vendor};
pub use secrets::{is_sensitive_header, redact_header, SecretString};
