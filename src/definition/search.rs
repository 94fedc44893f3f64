//! Search-page configuration and row parsing.

use std::collections::{BTreeMap, HashMap};

use chrono::FixedOffset;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::DefinitionError;
use crate::discount::DiscountLevel;
use crate::extract::{FieldExtractor, FieldSelector, ResponseType};
use crate::model::TorrentItem;
use crate::units::{parse_number, parse_size};

fn default_search_path() -> String {
    "torrents.php".to_string()
}

fn default_keyword_param() -> String {
    "search".to_string()
}

/// How a selector-driven site lists search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search page path relative to the base URL.
    #[serde(default = "default_search_path")]
    pub path: String,
    /// Query parameter carrying the keyword.
    #[serde(default = "default_keyword_param")]
    pub keyword_param: String,
    /// Query parameter carrying the zero-based page number, if paging is supported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_param: Option<String>,
    /// Fixed extra query parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// CSS selector matching one element per result row.
    pub rows: String,
    /// Field key to selector, evaluated relative to each row.
    pub fields: HashMap<String, FieldSelector>,
}

/// A compiled [`SearchConfig`].
#[derive(Debug, Clone)]
pub struct SearchPlan {
    config: SearchConfig,
    rows: Selector,
    fields: HashMap<String, FieldExtractor>,
}

impl SearchPlan {
    pub(crate) fn compile(
        config: &SearchConfig,
        offset: FixedOffset,
    ) -> Result<Self, DefinitionError> {
        let rows = Selector::parse(&config.rows).map_err(|e| DefinitionError::InvalidSelector {
            field: "rows".to_string(),
            selector: config.rows.clone(),
            reason: e.to_string(),
        })?;
        let fields = config
            .fields
            .iter()
            .map(|(key, spec)| {
                FieldExtractor::compile(key, spec, ResponseType::Html, offset)
                    .map(|extractor| (key.clone(), extractor))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(Self {
            config: config.clone(),
            rows,
            fields,
        })
    }

    /// Declarative configuration this plan was compiled from.
    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Parses every result row into a [`TorrentItem`].
    ///
    /// Rows without an id or title are skipped. `discount` maps the raw
    /// discount token (usually an icon class) to a level.
    pub fn parse_rows(
        &self,
        document: &Html,
        site: &str,
        discount: impl Fn(&str) -> DiscountLevel,
    ) -> Vec<TorrentItem> {
        let mut items = Vec::new();
        for (index, row) in document.select(&self.rows).enumerate() {
            let mut item = TorrentItem {
                source_site: site.to_string(),
                ..TorrentItem::default()
            };
            for (key, extractor) in &self.fields {
                match key.as_str() {
                    "tags" => {
                        for tag in extractor.extract_all(row) {
                            item.add_tag(tag);
                        }
                    }
                    "discount" => {
                        if let Ok(token) = extractor.extract_html(row) {
                            item.discount_level = discount(&token);
                        }
                    }
                    _ => {
                        if let Ok(value) = extractor.extract_html(row) {
                            apply_torrent_field(&mut item, key, &value);
                        }
                    }
                }
            }
            if item.id.is_empty() || item.title.is_empty() {
                debug!(site, row = index, "skipping row without id or title");
                continue;
            }
            items.push(item);
        }
        items
    }
}

/// Writes one extracted value into the matching [`TorrentItem`] slot.
///
/// Returns false when `key` is not a known torrent field.
#[allow(clippy::cast_possible_truncation)]
pub fn apply_torrent_field(item: &mut TorrentItem, key: &str, value: &str) -> bool {
    let integer = || parse_number(value).map_or(0, |n| n.round() as i64);
    match key {
        "id" => item.id = value.trim().to_string(),
        "title" => item.title = value.trim().to_string(),
        "subtitle" => item.subtitle = value.trim().to_string(),
        "size" => item.size_bytes = parse_size(value).unwrap_or(0),
        "seeders" => item.seeders = integer(),
        "leechers" => item.leechers = integer(),
        "snatched" => item.snatched = integer(),
        "time" => item.uploaded_at = integer(),
        "category" => item.category = value.trim().to_string(),
        "discountEndTime" => item.discount_end_time = integer(),
        "download" => item.download_url = Some(value.trim().to_string()).filter(|v| !v.is_empty()),
        "magnet" => item.magnet = Some(value.trim().to_string()).filter(|v| !v.is_empty()),
        "hash" => item.set_info_hash(value),
        _ => return false,
    }
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    const PAGE: &str = r#"
        <table class="torrents">
          <tr><th>header</th></tr>
          <tr class="row">
            <td><a class="t" href="details.php?id=11&hit=1" title="Big.Movie.2160p">Big.Movie...</a>
                <span class="sub">Director's cut</span>
                <img class="pro_free" src="pic/trans.gif">
                <span class="tag">4K</span><span class="tag">HDR</span>
                <span class="tag">4K</span></td>
            <td class="size">21.5 GB</td><td class="s">1,024</td>
            <td class="l">3</td><td class="c">77</td>
          </tr>
          <tr class="row">
            <td><a class="t" href="details.php?id=12" title="Small.Show">Small.Show</a></td>
            <td class="size">700 MB</td><td class="s">5</td>
            <td class="l">0</td><td class="c">1</td>
          </tr>
          <tr class="row"><td>broken row</td></tr>
        </table>
    "#;

    fn plan() -> SearchPlan {
        let config: SearchConfig = serde_json::from_value(json!({
            "rows": "tr.row",
            "fields": {
                "id": {
                    "selector": "a.t",
                    "attr": "href",
                    "filters": [{"name": "querystring", "args": ["id"]}]
                },
                "title": {"selector": "a.t", "attr": "title"},
                "subtitle": {"selector": "span.sub"},
                "discount": {"selector": "img[class^=pro_]", "attr": "class"},
                "size": {"selector": "td.size", "filters": ["parseSize"]},
                "seeders": {"selector": "td.s"},
                "leechers": {"selector": "td.l"},
                "snatched": {"selector": "td.c"},
                "tags": {"selector": "span.tag"}
            }
        }))
        .unwrap();
        SearchPlan::compile(&config, FixedOffset::east_opt(8 * 3600).unwrap()).unwrap()
    }

    #[test]
    fn test_parse_rows_maps_fields() {
        let html = Html::parse_document(PAGE);
        let items = plan().parse_rows(&html, "demo", |token| {
            DiscountLevel::from_site_token(token).unwrap_or_default()
        });

        assert_eq!(items.len(), 2, "the row without id or title is skipped");
        let first = &items[0];
        assert_eq!(first.id, "11");
        assert_eq!(first.title, "Big.Movie.2160p");
        assert_eq!(first.subtitle, "Director's cut");
        assert_eq!(first.discount_level, DiscountLevel::Free);
        assert_eq!(first.size_bytes, 23_085_449_216);
        assert_eq!(first.seeders, 1024);
        assert_eq!(first.snatched, 77);
        assert_eq!(first.tags, vec!["4K", "HDR"]);
        assert_eq!(first.source_site, "demo");
    }

    #[test]
    fn test_rows_without_discount_icon_stay_none() {
        let html = Html::parse_document(PAGE);
        let items = plan().parse_rows(&html, "demo", |_| DiscountLevel::Free);
        assert_eq!(items[1].id, "12");
        assert_eq!(items[1].discount_level, DiscountLevel::None);
        assert_eq!(items[1].size_bytes, 700 * 1024 * 1024);
        assert!(items[1].tags.is_empty());
    }

    #[test]
    fn test_apply_torrent_field_unknown_key() {
        let mut item = TorrentItem::default();
        assert!(!apply_torrent_field(&mut item, "colour", "blue"));
        assert!(apply_torrent_field(&mut item, "hash", " ABCDEF "));
        assert_eq!(item.info_hash.as_deref(), Some("abcdef"));
        assert!(apply_torrent_field(&mut item, "download", "  "));
        assert_eq!(item.download_url, None);
    }
}
