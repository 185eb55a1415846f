//! Anthropic error table

use super::types::AnthropicErrorEnvelope;
use crate::providers::error::{ErrorKind, ErrorTable, VendorErrorInfo};
use serde::Deserialize;
use serde_json::Value;

/// Status Anthropic uses for `overloaded_error`
pub const OVERLOADED_STATUS: u16 = 529;

pub const ANTHROPIC_ERRORS: ErrorTable = ErrorTable {
    provider: "anthropic",
    parse: parse_error_body,
    hint: anthropic_hint,
};

fn parse_error_body(value: &Value) -> Option<VendorErrorInfo> {
    let envelope = AnthropicErrorEnvelope::deserialize(value).ok()?;
    let detail = envelope.error;

    let (kind, status) = match detail.error_type.as_str() {
        "authentication_error" | "permission_error" => (Some(ErrorKind::Authentication), None),
        "invalid_request_error" | "not_found_error" | "request_too_large" => {
            (Some(ErrorKind::InvalidRequest), None)
        }
        "rate_limit_error" => (Some(ErrorKind::RateLimit), None),
        "api_error" => (Some(ErrorKind::ServerError), None),
        "overloaded_error" => (Some(ErrorKind::ServerError), Some(OVERLOADED_STATUS)),
        _ => (None, None),
    };

    Some(VendorErrorInfo {
        kind,
        message: detail.message,
        code: Some(detail.error_type),
        status,
        retry_after: None,
    })
}

fn anthropic_hint(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::Authentication => {
            Some("Check your API key at https://console.anthropic.com/settings/keys")
        }
        ErrorKind::RateLimit => Some("See https://docs.anthropic.com/en/api/rate-limits"),
        _ => None,
    }
}
