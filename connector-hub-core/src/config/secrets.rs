//! Credential wrapper and header redaction
//!
//! Keys live in [`SecretString`], whose `Debug` and `Display` never print
//! the value. Headers headed for the log pass through [`redact_header`].

use serde::{Deserialize, Serialize};
use std::fmt;

const MASK: &str = "[REDACTED]";

/// An API key
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SecretString(Box<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().into_boxed_str())
    }

    /// The raw key, for building auth headers only
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Blank or whitespace-only keys count as empty
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Last four characters, enough to tell keys apart in a log line.
    /// Keys of eight characters or fewer reveal nothing.
    pub fn hint(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        match chars.len() {
            0 => "<empty>".to_string(),
            n if n <= 8 => MASK.to_string(),
            n => format!("...{}", chars[n - 4..].iter().collect::<String>()),
        }
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Header names that carry credentials for any supported vendor
pub fn is_sensitive_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name == "authorization"
        || name.ends_with("api-key")
        || name.contains("secret")
        || name.contains("token")
}

/// Value safe to log for the given header
pub fn redact_header<'a>(name: &str, value: &'a str) -> &'a str {
    if is_sensitive_header(name) {
        MASK
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatting_never_shows_the_key() {
        let key = SecretString::new("sk-1234567890abcdef");
        assert_eq!(key.to_string(), "[REDACTED]");
        assert_eq!(format!("{:?}", key), "[REDACTED]");
        assert_eq!(key.hint(), "...cdef");
        assert_eq!(key.expose_secret(), "sk-1234567890abcdef");
    }

    #[test]
    fn test_hint_for_short_keys() {
        assert_eq!(SecretString::new("abc").hint(), "[REDACTED]");
        assert_eq!(SecretString::new("").hint(), "<empty>");
        assert!(SecretString::new("   ").is_empty());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let key: SecretString = serde_json::from_str("\"k-1\"").unwrap();
        assert_eq!(key, SecretString::from("k-1"));
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"k-1\"");
    }

    #[test]
    fn test_vendor_auth_headers_are_masked() {
        for name in ["Authorization", "x-api-key", "x-goog-api-key", "api-key"] {
            assert_eq!(redact_header(name, "abc"), "[REDACTED]", "{}", name);
        }
        assert_eq!(redact_header("anthropic-version", "2023-06-01"), "2023-06-01");
        assert_eq!(redact_header("content-type", "application/json"), "application/json");
    }
}
