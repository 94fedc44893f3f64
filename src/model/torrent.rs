use serde::{Deserialize, Serialize};

use crate::discount::DiscountLevel;

/// One torrent listing normalized from any site schema.
///
/// `info_hash`, when present, identifies the same release across sites;
/// otherwise a normalized title is the fallback identity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TorrentItem {
    /// Site-local identifier.
    pub id: String,
    /// Content hash (lowercase hex), when the site exposes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<String>,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    pub size_bytes: i64,
    pub seeders: i64,
    pub leechers: i64,
    /// Completed-download count.
    pub snatched: i64,
    /// Unix epoch of the upload.
    pub uploaded_at: i64,
    /// Identifier of the site this listing came from.
    pub source_site: String,
    #[serde(default)]
    pub category: String,
    pub discount_level: DiscountLevel,
    /// Unix epoch at which the discount ends; 0 means permanent or no discount.
    pub discount_end_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnet: Option<String>,
    /// Ordered, duplicate-free tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TorrentItem {
    /// Creates an item with the identity fields set and everything else zeroed.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        source_site: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source_site: source_site.into(),
            ..Self::default()
        }
    }

    /// Returns true when the download is not counted against the quota.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.discount_level.is_free()
    }

    /// Appends a tag unless it is empty or already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        let tag = tag.trim();
        if !tag.is_empty() && !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }

    /// Sets the info hash, normalizing to lowercase and dropping blanks.
    pub fn set_info_hash(&mut self, hash: &str) {
        let hash = hash.trim();
        self.info_hash = (!hash.is_empty()).then(|| hash.to_ascii_lowercase());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_add_tag_keeps_order_and_uniqueness() {
        let mut item = TorrentItem::new("1", "Title", "site");
        item.add_tag("4K");
        item.add_tag("HDR");
        item.add_tag("4K");
        item.add_tag("  ");
        assert_eq!(item.tags, vec!["4K", "HDR"]);
    }

    #[test]
    fn test_set_info_hash_normalizes() {
        let mut item = TorrentItem::default();
        item.set_info_hash(" ABCDEF ");
        assert_eq!(item.info_hash.as_deref(), Some("abcdef"));
        item.set_info_hash("");
        assert!(item.info_hash.is_none());
    }

    #[test]
    fn test_is_free_follows_discount() {
        let mut item = TorrentItem::default();
        assert!(!item.is_free());
        item.discount_level = DiscountLevel::TwoXFree;
        assert!(item.is_free());
    }
}
