//! OpenAI error table, shared with Azure OpenAI

use super::types::OpenAIErrorEnvelope;
use crate::providers::error::{ErrorKind, ErrorTable, VendorErrorInfo};
use serde::Deserialize;
use serde_json::Value;

pub const OPENAI_ERRORS: ErrorTable = ErrorTable {
    provider: "openai",
    parse: parse_error_body,
    hint: openai_hint,
};

/// Recognize `{"error": {"message", "type", "code", "param"}}`
pub fn parse_error_body(value: &Value) -> Option<VendorErrorInfo> {
    let envelope = OpenAIErrorEnvelope::deserialize(value).ok()?;
    let body = envelope.error;
    let code = body.code_str();

    let kind = code
        .as_deref()
        .and_then(kind_for_code)
        .or_else(|| body.error_type.as_deref().and_then(kind_for_code));

    Some(VendorErrorInfo {
        kind,
        message: body.message,
        code: code.or(body.error_type),
        status: None,
        retry_after: None,
    })
}

/// Codes and types seen in the `error` object
fn kind_for_code(code: &str) -> Option<ErrorKind> {
    match code {
        "invalid_api_key" | "invalid_organization" | "authentication_error" | "permission_error" => {
            Some(ErrorKind::Authentication)
        }
        "insufficient_quota" | "rate_limit_exceeded" | "rate_limit_error" | "requests" | "tokens" => {
            Some(ErrorKind::RateLimit)
        }
        "invalid_request_error"
        | "context_length_exceeded"
        | "model_not_found"
        | "DeploymentNotFound"
        | "content_filter" => Some(ErrorKind::InvalidRequest),
        "server_error" | "service_unavailable" | "api_error" => Some(ErrorKind::ServerError),
        "timeout" => Some(ErrorKind::Timeout),
        _ => None,
    }
}

fn openai_hint(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::Authentication => Some("Check your API key at https://platform.openai.com/api-keys"),
        ErrorKind::RateLimit => {
            Some("See https://platform.openai.com/account/limits for your rate limits")
        }
        _ => None,
    }
}
