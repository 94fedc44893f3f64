//! Errors raised while loading and compiling site definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading a [`SiteDefinition`](super::SiteDefinition).
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// Definition file could not be read.
    #[error("IO error reading definition {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Definition JSON is malformed.
    #[error("invalid definition JSON in {origin}: {source}")]
    Json {
        /// File path or builtin name.
        origin: String,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// A CSS selector failed to parse.
    #[error("invalid selector '{selector}' for field '{field}': {reason}")]
    InvalidSelector {
        /// Field key.
        field: String,
        /// Offending selector text.
        selector: String,
        /// Parser message.
        reason: String,
    },

    /// A filter name is not part of the registry.
    #[error("unknown filter '{name}' for field '{field}'")]
    UnknownFilter {
        /// Field key.
        field: String,
        /// Filter name as written.
        name: String,
    },

    /// A filter received missing or mistyped arguments.
    #[error("bad arguments for filter '{name}' on field '{field}': {reason}")]
    FilterArgs {
        /// Field key.
        field: String,
        /// Filter name.
        name: String,
        /// What is wrong.
        reason: String,
    },

    /// A regex in the definition failed to compile.
    #[error("invalid regex '{pattern}' for '{field}': {source}")]
    InvalidRegex {
        /// Field or config key.
        field: String,
        /// Pattern text.
        pattern: String,
        /// Compiler error.
        #[source]
        source: regex::Error,
    },

    /// Timezone string could not be parsed.
    #[error("invalid timezone '{value}' in definition '{id}'")]
    InvalidTimezone {
        /// Definition id.
        id: String,
        /// Timezone text.
        value: String,
    },

    /// A fetch step lists a field with no selector.
    #[error("field '{field}' has no selector in definition '{id}'")]
    MissingSelector {
        /// Definition id.
        id: String,
        /// Field key.
        field: String,
    },

    /// Two definitions share an id.
    #[error("duplicate definition id '{id}'")]
    Duplicate {
        /// Repeated id.
        id: String,
    },
}
