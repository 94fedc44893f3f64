//! Error types local to the extraction engine.

use thiserror::Error;

/// Errors raised while pulling a field out of a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// No selector matched and the field declares no default text.
    #[error("field '{field}' not found")]
    FieldNotFound {
        /// Field key from the site definition.
        field: String,
    },

    /// A cross-step assertion did not hold.
    #[error("assertion failed for field '{field}': expected '{expected}', got '{actual}'")]
    AssertionFailed {
        /// Field extracted in the current step.
        field: String,
        /// Value captured by an earlier step.
        expected: String,
        /// Value extracted in the current step.
        actual: String,
    },

    /// A filter could not transform the extracted value.
    #[error("filter '{filter}' failed on field '{field}' (value '{value}'): {reason}")]
    FilterFailed {
        /// Field key from the site definition.
        field: String,
        /// Filter name.
        filter: &'static str,
        /// Input value handed to the filter.
        value: String,
        /// Why the filter rejected it.
        reason: String,
    },
}

impl ExtractError {
    /// Creates a `FieldNotFound` error.
    #[must_use]
    pub fn not_found(field: &str) -> Self {
        Self::FieldNotFound {
            field: field.to_string(),
        }
    }
}
