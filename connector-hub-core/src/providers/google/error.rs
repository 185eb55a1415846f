//! Gemini error table
//!
//! Errors follow the `google.rpc.Status` shape, sometimes wrapped in a
//! one-element array. `details` may carry a `RetryInfo` with a machine
//! readable delay and an `ErrorInfo` reason.

use super::types::GoogleErrorEnvelope;
use crate::providers::error::{ErrorKind, ErrorTable, VendorErrorInfo};
use serde::Deserialize;
use serde_json::Value;

pub const GOOGLE_ERRORS: ErrorTable = ErrorTable {
    provider: "google",
    parse: parse_error_body,
    hint: google_hint,
};

fn parse_error_body(value: &Value) -> Option<VendorErrorInfo> {
    let value = match value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    let detail = GoogleErrorEnvelope::deserialize(value).ok()?.error;

    let kind = if has_reason(&detail.details, "API_KEY_INVALID") {
        Some(ErrorKind::Authentication)
    } else {
        kind_for_status(&detail.status)
    };

    Some(VendorErrorInfo {
        kind,
        retry_after: retry_delay(&detail.details),
        message: detail.message,
        code: Some(detail.status),
        status: detail.code,
    })
}

fn kind_for_status(status: &str) -> Option<ErrorKind> {
    match status {
        "UNAUTHENTICATED" | "PERMISSION_DENIED" => Some(ErrorKind::Authentication),
        "INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "NOT_FOUND" | "OUT_OF_RANGE" => {
            Some(ErrorKind::InvalidRequest)
        }
        "RESOURCE_EXHAUSTED" => Some(ErrorKind::RateLimit),
        "INTERNAL" | "UNAVAILABLE" | "UNKNOWN" => Some(ErrorKind::ServerError),
        "DEADLINE_EXCEEDED" => Some(ErrorKind::Timeout),
        _ => None,
    }
}

fn detail_type(detail: &Value) -> &str {
    detail.get("@type").and_then(Value::as_str).unwrap_or_default()
}

fn has_reason(details: &[Value], reason: &str) -> bool {
    details.iter().any(|d| {
        detail_type(d).ends_with("ErrorInfo") && d.get("reason").and_then(Value::as_str) == Some(reason)
    })
}

/// `RetryInfo.retryDelay` is a protobuf duration string such as `"30s"`
fn retry_delay(details: &[Value]) -> Option<u64> {
    details
        .iter()
        .filter(|d| detail_type(d).ends_with("RetryInfo"))
        .find_map(|d| d.get("retryDelay")?.as_str()?.strip_suffix('s')?.parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(|s| s.ceil() as u64)
}

fn google_hint(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::Authentication => Some("Check your API key at https://aistudio.google.com/app/apikey"),
        ErrorKind::RateLimit => Some("See https://ai.google.dev/gemini-api/docs/rate-limits"),
        _ => None,
    }
}
