//! Errors raised while checking settings and requests locally

use std::fmt;
use thiserror::Error;

/// A rejected field, addressed by its path (`retry.max_delay_ms`,
/// `messages[2].tool_call_id`)
#[derive(Debug, Clone, PartialEq, Error)]
pub struct ValidationError {
    pub field_path: String,
    pub kind: ValidationErrorKind,
    /// Extra guidance for the caller
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationErrorKind {
    #[error("is required")]
    Missing,

    #[error("must be {bound}")]
    OutOfRange { bound: String },

    #[error("`{value}` is not one of {allowed}")]
    NotAllowed { value: String, allowed: &'static str },

    #[error("conflicts with `{other}`")]
    Conflict { other: &'static str },

    #[error("is malformed: {reason}")]
    Malformed { reason: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` {}", self.field_path, self.kind)?;
        match &self.context {
            Some(context) => write!(f, "; {}", context),
            None => Ok(()),
        }
    }
}

impl ValidationError {
    fn at(field_path: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            field_path: field_path.into(),
            kind,
            context: None,
        }
    }

    pub fn missing(field_path: impl Into<String>) -> Self {
        Self::at(field_path, ValidationErrorKind::Missing)
    }

    /// `bound` completes "must be ...", e.g. "greater than 0"
    pub fn out_of_range(field_path: impl Into<String>, bound: impl Into<String>) -> Self {
        Self::at(field_path, ValidationErrorKind::OutOfRange { bound: bound.into() })
    }

    pub fn not_allowed(field_path: impl Into<String>, value: impl Into<String>, allowed: &'static str) -> Self {
        Self::at(
            field_path,
            ValidationErrorKind::NotAllowed {
                value: value.into(),
                allowed,
            },
        )
    }

    pub fn conflict(field_path: impl Into<String>, other: &'static str) -> Self {
        Self::at(field_path, ValidationErrorKind::Conflict { other })
    }

    pub fn malformed(field_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::at(field_path, ValidationErrorKind::Malformed { reason: reason.into() })
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Path of a field inside the request's message list
    pub fn message_field(index: usize, field: &str) -> String {
        format!("messages[{}].{}", index, field)
    }
}
