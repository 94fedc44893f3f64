//! Error types for site operations.
//!
//! [`SiteError`] is the single error surfaced by every public driver
//! operation. Extraction-engine failures are wrapped rather than flattened so
//! callers can still match on [`ExtractError`] when they need to.

use thiserror::Error;

use crate::extract::ExtractError;

/// Maximum number of characters of a raw payload kept in a parse error.
const SNIPPET_LIMIT: usize = 256;

/// Errors that can occur while talking to a tracker site.
#[derive(Debug, Error)]
pub enum SiteError {
    /// Authentication was rejected by the site (HTTP 401/403).
    #[error(
        "[AUTH] invalid credentials for site '{site}' (HTTP {status})\n  \
         Suggestion: refresh the cookie or API key in the site options"
    )]
    InvalidCredentials {
        /// Site identifier.
        site: String,
        /// HTTP status that triggered the rejection.
        status: u16,
    },

    /// Field extraction or assertion failure.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Response body could not be decoded into the expected shape.
    #[error("parse error on site '{site}' ({context}): {reason}\n  payload: {snippet}")]
    Parse {
        /// Site identifier.
        site: String,
        /// Which response was being parsed.
        context: String,
        /// Decoder message.
        reason: String,
        /// Leading part of the raw payload.
        snippet: String,
    },

    /// Remote reported a non-success application code.
    #[error("site '{site}' returned error code {code}: {message}")]
    UpstreamApi {
        /// Site identifier.
        site: String,
        /// Application code reported by the remote.
        code: String,
        /// Message text reported by the remote.
        message: String,
    },

    /// Non-success HTTP status other than an authentication failure.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Network-level error (DNS, connection refused, TLS, ...).
    #[error("network error requesting {url}: {source}")]
    Network {
        /// Requested URL.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Request exceeded the context deadline.
    #[error("timeout requesting {url}")]
    Timeout {
        /// Requested URL (empty when the deadline fired outside a request).
        url: String,
    },

    /// The shared request context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The driver does not offer this operation.
    #[error("site '{site}' does not support {operation}")]
    Unsupported {
        /// Site identifier.
        site: String,
        /// Operation name.
        operation: &'static str,
    },

    /// Site configuration is unusable.
    #[error("configuration error for site '{site}': {message}")]
    Config {
        /// Site identifier.
        site: String,
        /// What is wrong.
        message: String,
    },
}

impl SiteError {
    /// Creates a parse error carrying a truncated snippet of the raw payload.
    #[must_use]
    pub fn parse(
        site: &str,
        context: &str,
        reason: impl std::fmt::Display,
        payload: &[u8],
    ) -> Self {
        Self::Parse {
            site: site.to_string(),
            context: context.to_string(),
            reason: reason.to_string(),
            snippet: snippet(payload),
        }
    }

    /// Creates an upstream API error preserving the remote message.
    #[must_use]
    pub fn upstream(site: &str, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamApi {
            site: site.to_string(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(site: &str, message: impl Into<String>) -> Self {
        Self::Config {
            site: site.to_string(),
            message: message.into(),
        }
    }

    /// Creates an unsupported-operation error.
    #[must_use]
    pub fn unsupported(site: &str, operation: &'static str) -> Self {
        Self::Unsupported {
            site: site.to_string(),
            operation,
        }
    }

    /// Returns true for errors that must not be retried against another URL.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::InvalidCredentials { .. } | Self::Cancelled)
    }
}

fn snippet(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    let mut out: String = text.chars().take(SNIPPET_LIMIT).collect();
    if text.chars().count() > SNIPPET_LIMIT {
        out.push_str("...");
    }
    out
}
