//! Multi-factor scoring of search results.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::TorrentItem;

const DEFAULT_SEEDER_WEIGHT: f64 = 1.0;
const DEFAULT_LEECHER_WEIGHT: f64 = 0.5;
const DEFAULT_FREE_BONUS: f64 = 100.0;
const DEFAULT_SITE_RELIABILITY: f64 = 0.5;

/// Ranking weights, as read from the `[ranking]` config table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    pub seeder_weight: f64,
    pub leecher_weight: f64,
    pub free_bonus: f64,
    /// Site id to trust in `0..=1`. Unlisted sites get 0.5.
    pub site_reliability: BTreeMap<String, f64>,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            seeder_weight: DEFAULT_SEEDER_WEIGHT,
            leecher_weight: DEFAULT_LEECHER_WEIGHT,
            free_bonus: DEFAULT_FREE_BONUS,
            site_reliability: BTreeMap::new(),
        }
    }
}

/// Scores and orders torrent listings.
#[derive(Debug, Clone)]
pub struct Ranker {
    seeder_weight: f64,
    leecher_weight: f64,
    free_bonus: f64,
    reliability: HashMap<String, f64>,
}

impl Default for Ranker {
    fn default() -> Self {
        Self::from_config(&RankerConfig::default())
    }
}

impl Ranker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_config(config: &RankerConfig) -> Self {
        let mut ranker = Self {
            seeder_weight: config.seeder_weight,
            leecher_weight: config.leecher_weight,
            free_bonus: config.free_bonus,
            reliability: HashMap::new(),
        };
        for (site, value) in &config.site_reliability {
            ranker.set_site_reliability(site, *value);
        }
        ranker
    }

    /// Sets a site's trust, clamped to `0..=1`. Non-finite values store 0.
    pub fn set_site_reliability(&mut self, site: &str, value: f64) {
        let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        self.reliability.insert(site.to_string(), value);
    }

    #[must_use]
    pub fn site_reliability(&self, site: &str) -> f64 {
        self.reliability
            .get(site)
            .copied()
            .unwrap_or(DEFAULT_SITE_RELIABILITY)
    }

    /// Score of one item; higher is better.
    #[must_use]
    pub fn score(&self, item: &TorrentItem) -> f64 {
        let mut score = self.seeder_weight * peer_score(item.seeders)
            + self.leecher_weight * peer_score(item.leechers);
        if item.is_free() {
            score += self.free_bonus;
        }
        score += self.free_bonus * (1.0 - item.discount_level.download_ratio());
        score * (1.0 + self.site_reliability(&item.source_site))
    }

    /// Returns clones of `items` sorted by descending score.
    ///
    /// Equal scores keep no particular order.
    #[must_use]
    pub fn rank(&self, items: &[TorrentItem]) -> Vec<TorrentItem> {
        let mut scored: Vec<(f64, &TorrentItem)> = items
            .iter()
            .map(|item| (self.score(item), item))
            .collect();
        scored.sort_unstable_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().map(|(_, item)| item.clone()).collect()
    }
}

/// `1 + x/10` for positive counts, 0 otherwise.
#[allow(clippy::cast_precision_loss)]
fn peer_score(count: i64) -> f64 {
    if count > 0 { 1.0 + count as f64 / 10.0 } else { 0.0 }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::discount::DiscountLevel;

    fn item(id: &str, seeders: i64, level: DiscountLevel) -> TorrentItem {
        let mut item = TorrentItem::new(id, id, "site");
        item.seeders = seeders;
        item.discount_level = level;
        item
    }

    #[test]
    fn test_free_item_outranks_popular_one() {
        let ranker = Ranker::new();
        let ranked = ranker.rank(&[
            item("popular", 100, DiscountLevel::None),
            item("free", 10, DiscountLevel::Free),
        ]);
        assert_eq!(ranked[0].id, "free");
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_score_formula() {
        let ranker = Ranker::new();
        let mut half = item("half", 20, DiscountLevel::Percent50);
        half.leechers = 10;
        // (1*(1+2) + 0.5*(1+1) + 100*0.5) * 1.5
        assert!((ranker.score(&half) - 81.0).abs() < 1e-9);
        assert!(ranker.score(&item("dead", 0, DiscountLevel::None)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rank_is_descending() {
        let ranker = Ranker::new();
        let items: Vec<TorrentItem> = [
            (3, DiscountLevel::None),
            (50, DiscountLevel::TwoXUp),
            (0, DiscountLevel::Percent30),
            (7, DiscountLevel::TwoXFree),
            (7, DiscountLevel::TwoX50),
            (500, DiscountLevel::None),
        ]
        .iter()
        .enumerate()
        .map(|(i, (seeders, level))| item(&i.to_string(), *seeders, *level))
        .collect();

        let ranked = ranker.rank(&items);
        assert_eq!(ranked.len(), items.len());
        for pair in ranked.windows(2) {
            assert!(ranker.score(&pair[0]) >= ranker.score(&pair[1]));
        }
    }

    #[test]
    fn test_reliability_clamped_and_defaulted() {
        let mut ranker = Ranker::new();
        ranker.set_site_reliability("trusted", 4.0);
        ranker.set_site_reliability("shady", -1.0);
        ranker.set_site_reliability("broken", f64::NAN);
        assert!((ranker.site_reliability("trusted") - 1.0).abs() < f64::EPSILON);
        assert!(ranker.site_reliability("shady").abs() < f64::EPSILON);
        assert!(ranker.site_reliability("broken").abs() < f64::EPSILON);
        assert!((ranker.site_reliability("unknown") - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_config_from_toml() {
        let config: RankerConfig = toml::from_str(
            r#"
            free_bonus = 10.0
            [site_reliability]
            mteam = 0.9
            "#,
        )
        .unwrap();
        assert!((config.seeder_weight - 1.0).abs() < f64::EPSILON);
        let ranker = Ranker::from_config(&config);
        assert!((ranker.site_reliability("mteam") - 0.9).abs() < f64::EPSILON);
    }
}
