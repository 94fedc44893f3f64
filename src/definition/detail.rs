//! Detail-page configuration.

use std::collections::{BTreeMap, HashMap};

use chrono::FixedOffset;
use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};

use super::DefinitionError;
use super::search::apply_torrent_field;
use crate::discount::DiscountLevel;
use crate::extract::{FieldExtractor, FieldSelector, ResponseType};
use crate::model::TorrentItem;
use crate::units::{parse_size, parse_time};

fn default_detail_path() -> String {
    "details.php?id={id}".to_string()
}

/// How a selector-driven site renders one torrent's detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailParserConfig {
    /// Page path; `{id}` is replaced with the torrent id.
    #[serde(default = "default_detail_path")]
    pub path: String,
    /// Field key to selector, evaluated against the whole page.
    #[serde(default)]
    pub fields: HashMap<String, FieldSelector>,
    /// Discount icon class (or other token) to level.
    #[serde(default)]
    pub discount_mapping: BTreeMap<String, DiscountLevel>,
    /// Regex over the page text whose first group is the size, used when no `size` field resolves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_regex: Option<String>,
    /// Regex over the page text whose first group is the upload time, used
    /// when no `time` field resolves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_regex: Option<String>,
}

impl Default for DetailParserConfig {
    fn default() -> Self {
        Self {
            path: default_detail_path(),
            fields: HashMap::new(),
            discount_mapping: BTreeMap::new(),
            size_regex: None,
            time_regex: None,
        }
    }
}

/// A compiled [`DetailParserConfig`].
#[derive(Debug, Clone)]
pub struct DetailPlan {
    path: String,
    fields: HashMap<String, FieldExtractor>,
    discount_mapping: BTreeMap<String, DiscountLevel>,
    size_regex: Option<Regex>,
    time_regex: Option<Regex>,
    offset: FixedOffset,
}

impl DetailPlan {
    pub(crate) fn compile(
        config: &DetailParserConfig,
        offset: FixedOffset,
    ) -> Result<Self, DefinitionError> {
        let fields = config
            .fields
            .iter()
            .map(|(key, spec)| {
                FieldExtractor::compile(key, spec, ResponseType::Html, offset)
                    .map(|extractor| (key.clone(), extractor))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;
        let discount_mapping = config
            .discount_mapping
            .iter()
            .map(|(token, level)| (token.to_ascii_lowercase(), *level))
            .collect();

        Ok(Self {
            path: config.path.clone(),
            fields,
            discount_mapping,
            size_regex: compile_regex("size_regex", config.size_regex.as_deref())?,
            time_regex: compile_regex("time_regex", config.time_regex.as_deref())?,
            offset,
        })
    }

    /// Detail page path for torrent `id`.
    #[must_use]
    pub fn path_for(&self, id: &str) -> String {
        self.path.replace("{id}", &urlencoding::encode(id))
    }

    /// Maps a discount token to a level.
    ///
    /// `raw` may hold several whitespace-separated classes; the first one the
    /// mapping or the built-in token heuristics recognise wins.
    #[must_use]
    pub fn discount_for(&self, raw: &str) -> DiscountLevel {
        raw.split_whitespace()
            .find_map(|token| {
                self.discount_mapping
                    .get(&token.to_ascii_lowercase())
                    .copied()
                    .or_else(|| DiscountLevel::from_site_token(token))
            })
            .unwrap_or_default()
    }

    /// Parses a detail page into `item`, keeping values the page does not provide.
    pub fn parse_into(&self, document: &Html, item: &mut TorrentItem) {
        let root = document.root_element();
        for (key, extractor) in &self.fields {
            match key.as_str() {
                "tags" => {
                    for tag in extractor.extract_all(root) {
                        item.add_tag(tag);
                    }
                }
                "discount" => {
                    if let Ok(token) = extractor.extract_html(root) {
                        item.discount_level = self.discount_for(&token);
                    }
                }
                _ => {
                    if let Ok(value) = extractor.extract_html(root) {
                        apply_torrent_field(item, key, &value);
                    }
                }
            }
        }

        if item.size_bytes == 0 || item.uploaded_at == 0 {
            let text = root.text().collect::<Vec<_>>().join(" ");
            if item.size_bytes == 0
                && let Some(size) =
                    first_group(self.size_regex.as_ref(), &text).and_then(parse_size)
            {
                item.size_bytes = size;
            }
            if item.uploaded_at == 0
                && let Some(time) = first_group(self.time_regex.as_ref(), &text)
                    .and_then(|raw| parse_time(raw, self.offset))
            {
                item.uploaded_at = time;
            }
        }
    }
}

fn first_group<'t>(regex: Option<&Regex>, text: &'t str) -> Option<&'t str> {
    let caps = regex?.captures(text)?;
    caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str())
}

fn compile_regex(field: &str, pattern: Option<&str>) -> Result<Option<Regex>, DefinitionError> {
    pattern
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| DefinitionError::InvalidRegex {
                field: field.to_string(),
                pattern: pattern.to_string(),
                source,
            })
        })
        .transpose()
}
