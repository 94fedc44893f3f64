//! Field selectors: declarative description and compiled form.

use chrono::FixedOffset;
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::trace;

use super::document::{Document, ResponseType};
use super::error::ExtractError;
use super::filter::{Filter, FilterSpec};
use crate::definition::DefinitionError;

/// Declarative field selector as written in a site definition.
///
/// `selector` is a list of candidates tried in order: CSS selectors for HTML
/// documents, dotted paths (`data.memberCount.uploaded`) for JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSelector {
    /// Candidate selectors; a single string is accepted too.
    #[serde(default, deserialize_with = "one_or_many")]
    pub selector: Vec<String>,
    /// Attribute to read instead of the element text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
    /// Read the element's inner HTML instead of its text.
    #[serde(default)]
    pub html: bool,
    /// Filters applied left to right.
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    /// Value used when no selector matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl FieldSelector {
    /// Convenience constructor for a single-candidate selector.
    #[must_use]
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: vec![selector.into()],
            ..Self::default()
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(selector) => vec![selector],
        OneOrMany::Many(selectors) => selectors,
    })
}

#[derive(Debug, Clone)]
enum Candidate {
    Css(Selector),
    Json(Vec<String>),
}

/// A compiled [`FieldSelector`], bound to one document kind.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    name: String,
    kind: ResponseType,
    candidates: Vec<Candidate>,
    attr: Option<String>,
    html: bool,
    filters: Vec<Filter>,
    default_text: Option<String>,
}

impl FieldExtractor {
    /// Compiles `spec` for documents of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] for unparsable CSS selectors or bad filters.
    pub fn compile(
        name: &str,
        spec: &FieldSelector,
        kind: ResponseType,
        offset: FixedOffset,
    ) -> Result<Self, DefinitionError> {
        let candidates = spec
            .selector
            .iter()
            .map(|raw| compile_candidate(name, raw, kind))
            .collect::<Result<Vec<_>, _>>()?;
        let filters = spec
            .filters
            .iter()
            .map(|filter| Filter::compile(name, filter, offset))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            kind,
            candidates,
            attr: spec.attr.clone(),
            html: spec.html,
            filters,
            default_text: spec.text.clone(),
        })
    }

    /// Field key this extractor fills.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extracts the field from a whole document.
    ///
    /// # Errors
    ///
    /// Returns `FieldNotFound` when nothing matches and no default is set,
    /// or `FilterFailed` when a filter rejects the value. A document of the
    /// wrong kind never matches.
    pub fn extract(&self, document: &Document) -> Result<String, ExtractError> {
        match (document, self.kind) {
            (Document::Html(html), ResponseType::Html) => self.extract_html(html.root_element()),
            (Document::Json(value), ResponseType::Json) => self.extract_json(value),
            _ => self.fallback(),
        }
    }

    /// Extracts the field from an HTML element scope (e.g. a search-result row).
    ///
    /// # Errors
    ///
    /// Same as [`extract`](Self::extract).
    pub fn extract_html(&self, scope: ElementRef<'_>) -> Result<String, ExtractError> {
        for candidate in &self.candidates {
            let Candidate::Css(selector) = candidate else {
                continue;
            };
            if let Some(raw) = scope
                .select(selector)
                .find_map(|element| self.node_value(element))
            {
                trace!(field = %self.name, raw = %raw, "selector matched");
                return self.apply_filters(&raw);
            }
        }
        self.fallback()
    }

    /// Extracts every matching value from the first candidate that matches at least once.
    ///
    /// Values rejected by a filter are skipped. Returns an empty list when nothing matches.
    #[must_use]
    pub fn extract_all(&self, scope: ElementRef<'_>) -> Vec<String> {
        for candidate in &self.candidates {
            let Candidate::Css(selector) = candidate else {
                continue;
            };
            let raw: Vec<String> = scope
                .select(selector)
                .filter_map(|element| self.node_value(element))
                .collect();
            if !raw.is_empty() {
                return raw
                    .iter()
                    .filter_map(|value| self.apply_filters(value).ok())
                    .filter(|value| !value.is_empty())
                    .collect();
            }
        }
        Vec::new()
    }

    /// Extracts the field from a JSON value.
    ///
    /// # Errors
    ///
    /// Same as [`extract`](Self::extract). `null` counts as no match.
    pub fn extract_json(&self, root: &Value) -> Result<String, ExtractError> {
        for candidate in &self.candidates {
            let Candidate::Json(path) = candidate else {
                continue;
            };
            if let Some(raw) = lookup(root, path).and_then(json_to_string) {
                return self.apply_filters(&raw);
            }
        }
        self.fallback()
    }

    fn node_value(&self, element: ElementRef<'_>) -> Option<String> {
        if let Some(attr) = &self.attr {
            return element.value().attr(attr).map(|v| v.trim().to_string());
        }
        if self.html {
            return Some(element.inner_html());
        }
        Some(
            element
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" "),
        )
    }

    fn apply_filters(&self, raw: &str) -> Result<String, ExtractError> {
        let mut value = raw.to_string();
        for filter in &self.filters {
            value = filter
                .apply(&value)
                .map_err(|reason| ExtractError::FilterFailed {
                    field: self.name.clone(),
                    filter: filter.name(),
                    value: value.clone(),
                    reason,
                })?;
        }
        Ok(value)
    }

    fn fallback(&self) -> Result<String, ExtractError> {
        self.default_text
            .clone()
            .ok_or_else(|| ExtractError::not_found(&self.name))
    }
}

fn compile_candidate(
    field: &str,
    raw: &str,
    kind: ResponseType,
) -> Result<Candidate, DefinitionError> {
    match kind {
        ResponseType::Html => Selector::parse(raw)
            .map(Candidate::Css)
            .map_err(|e| DefinitionError::InvalidSelector {
                field: field.to_string(),
                selector: raw.to_string(),
                reason: e.to_string(),
            }),
        ResponseType::Json => Ok(Candidate::Json(
            raw.trim_start_matches('$')
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )),
    }
}

fn lookup<'v>(root: &'v Value, path: &[String]) -> Option<&'v Value> {
    path.iter().try_fold(root, |node, segment| match node {
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

fn json_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use scraper::Html;
    use serde_json::json;

    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn html_field(spec: Value) -> FieldExtractor {
        let spec: FieldSelector = serde_json::from_value(spec).unwrap();
        FieldExtractor::compile("field", &spec, ResponseType::Html, utc()).unwrap()
    }

    fn json_field(spec: Value) -> FieldExtractor {
        let spec: FieldSelector = serde_json::from_value(spec).unwrap();
        FieldExtractor::compile("field", &spec, ResponseType::Json, utc()).unwrap()
    }

    const PAGE: &str = r#"
        <html><body>
          <div id="info">
            <a class="user" href="userdetails.php?id=42">alice</a>
            <span class="up">Uploaded:  1.5
               GB</span>
            <span class="tag">4K</span><span class="tag">HDR</span>
          </div>
        </body></html>
    "#;

    #[test]
    fn test_first_matching_selector_wins() {
        let doc = Document::Html(Html::parse_document(PAGE));
        let field = html_field(json!({"selector": ["a.missing", "a.user", "span.up"]}));
        assert_eq!(field.extract(&doc).unwrap(), "alice");
    }

    #[test]
    fn test_attribute_and_filter_chain() {
        let doc = Document::Html(Html::parse_document(PAGE));
        let field = html_field(json!({
            "selector": "a.user",
            "attr": "href",
            "filters": [{"name": "querystring", "args": ["id"]}]
        }));
        assert_eq!(field.extract(&doc).unwrap(), "42");
    }

    #[test]
    fn test_text_is_whitespace_collapsed_before_filters() {
        let doc = Document::Html(Html::parse_document(PAGE));
        let field = html_field(json!({
            "selector": "span.up",
            "filters": [{"name": "split", "args": [":", 1]}, "parseSize"]
        }));
        assert_eq!(field.extract(&doc).unwrap(), "1610612736");
    }

    #[test]
    fn test_default_text_when_nothing_matches() {
        let doc = Document::Html(Html::parse_document(PAGE));
        let with_default = html_field(json!({"selector": "span.unread", "text": "0"}));
        assert_eq!(with_default.extract(&doc).unwrap(), "0");

        let without = html_field(json!({"selector": "span.unread"}));
        assert_eq!(
            without.extract(&doc).unwrap_err(),
            ExtractError::not_found("field")
        );
    }

    #[test]
    fn test_filter_failure_is_reported() {
        let doc = Document::Html(Html::parse_document(PAGE));
        let field = html_field(json!({"selector": "a.user", "filters": ["parseSize"]}));
        assert!(matches!(
            field.extract(&doc),
            Err(ExtractError::FilterFailed { filter: "parseSize", .. })
        ));
    }

    #[test]
    fn test_extract_all_collects_first_matching_selector() {
        let html = Html::parse_document(PAGE);
        let field = html_field(json!({"selector": ["span.none", "span.tag"]}));
        assert_eq!(field.extract_all(html.root_element()), vec!["4K", "HDR"]);
    }

    #[test]
    fn test_inner_html_mode() {
        let html = Html::parse_document(r#"<div class="d"><b>bold</b></div>"#);
        let field = html_field(json!({"selector": "div.d", "html": true}));
        assert_eq!(field.extract_html(html.root_element()).unwrap(), "<b>bold</b>");
    }

    #[test]
    fn test_json_paths_and_scalars() {
        let doc = Document::Json(json!({
            "data": {
                "id": 7,
                "name": " bob ",
                "list": [{"v": "a"}, {"v": "b"}],
                "gone": null
            }
        }));
        assert_eq!(json_field(json!({"selector": "data.id"})).extract(&doc).unwrap(), "7");
        assert_eq!(json_field(json!({"selector": "$.data.name"})).extract(&doc).unwrap(), "bob");
        assert_eq!(json_field(json!({"selector": "data.list.1.v"})).extract(&doc).unwrap(), "b");
        assert!(json_field(json!({"selector": "data.gone"})).extract(&doc).is_err());
        assert_eq!(
            json_field(json!({"selector": ["data.gone", "data.id"]})).extract(&doc).unwrap(),
            "7"
        );
    }

    #[test]
    fn test_wrong_document_kind_uses_fallback() {
        let doc = Document::Json(json!({"a": 1}));
        let field = html_field(json!({"selector": "a", "text": "x"}));
        assert_eq!(field.extract(&doc).unwrap(), "x");
    }

    #[test]
    fn test_invalid_css_rejected_at_compile_time() {
        let spec = FieldSelector::new("a[");
        let err = FieldExtractor::compile("title", &spec, ResponseType::Html, utc()).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidSelector { .. }));
    }
}
