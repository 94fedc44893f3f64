//! Parsed response documents handed to field extractors.

use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a fetch step's response body is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// HTML page queried with CSS selectors.
    #[default]
    Html,
    /// JSON payload queried with dotted paths.
    Json,
}

/// A parsed response body.
///
/// `scraper::Html` is not `Send`, so documents are built and consumed inside
/// synchronous parse steps and never held across an `.await`.
#[derive(Debug)]
pub enum Document {
    /// Parsed HTML tree.
    Html(Html),
    /// Parsed JSON value.
    Json(Value),
}

impl Document {
    /// Parses `body` according to `kind`.
    ///
    /// # Errors
    ///
    /// Returns the JSON decoder error when a JSON body is malformed. HTML
    /// parsing is error-tolerant and never fails.
    pub fn parse(body: &[u8], kind: ResponseType) -> Result<Self, serde_json::Error> {
        match kind {
            ResponseType::Html => Ok(Self::Html(Html::parse_document(&String::from_utf8_lossy(
                body,
            )))),
            ResponseType::Json => serde_json::from_slice(body).map(Self::Json),
        }
    }

    /// Response type this document was parsed as.
    #[must_use]
    pub fn kind(&self) -> ResponseType {
        match self {
            Self::Html(_) => ResponseType::Html,
            Self::Json(_) => ResponseType::Json,
        }
    }
}
