//! Error types for tool input validation.

use serde::Serialize;
use std::fmt;

/// Validation error with location information.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    /// Error message describing what went wrong
    pub message: String,
    /// Dotted path to the offending field (e.g., "messages.0.role")
    pub path: Option<String>,
    /// The invalid value that caused the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl ValidationError {
    pub fn new(
        message: impl Into<String>,
        path: Option<String>,
        value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            message: message.into(),
            path,
            value,
        }
    }

    /// Create an error at `path`; an empty path means the input root.
    pub fn at(message: impl Into<String>, path: &[String]) -> Self {
        let path = if path.is_empty() {
            None
        } else {
            Some(path.join("."))
        };
        Self {
            message: message.into(),
            path,
            value: None,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}", path, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result of validation operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// Whether validation passed
    pub valid: bool,
    /// List of validation errors (empty if valid)
    pub errors: Vec<ValidationError>,
    /// Input with schema defaults applied (None if invalid)
    pub data: Option<serde_json::Value>,
}

impl ValidationResult {
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            data: Some(data),
        }
    }

    pub fn failure(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: false,
            errors,
            data: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }

    /// Get errors as formatted strings.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}
