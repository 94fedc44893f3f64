use serde::{Deserialize, Serialize};

/// One account snapshot for a site.
///
/// Identity and cumulative transfer fields come from the critical fetch.
/// Extended stats (bonus rate, messages, peers) stay at zero when their
/// source fetch fails.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserInfo {
    pub site: String,
    pub user_id: String,
    pub username: String,
    /// Total uploaded bytes.
    pub uploaded: i64,
    /// Total downloaded bytes.
    pub downloaded: i64,
    pub ratio: f64,
    /// Bonus points balance.
    pub bonus: f64,
    /// Class/rank label shown by the site.
    pub rank: String,
    pub level_id: i64,
    /// Unix epochs.
    pub join_date: i64,
    pub last_access: i64,
    /// When this snapshot was taken.
    pub last_update: i64,

    pub bonus_per_hour: f64,
    pub unread_messages: i64,
    pub total_messages: i64,
    pub seeder_count: i64,
    pub seeder_size: i64,
    pub leecher_count: i64,
    pub leecher_size: i64,
}

impl UserInfo {
    /// Fills `ratio` from the transfer totals when the site did not report one.
    #[allow(clippy::cast_precision_loss)]
    pub fn fill_ratio(&mut self) {
        if self.ratio == 0.0 && self.downloaded > 0 {
            self.ratio = self.uploaded as f64 / self.downloaded as f64;
        }
    }

    /// Returns true once the primary identity fields are populated.
    #[must_use]
    pub fn has_identity(&self) -> bool {
        !self.user_id.is_empty() || !self.username.is_empty()
    }
}
