//! Shared User-Agent string for site HTTP clients.
//!
//! Single source for the UA format so every site sees the same client
//! identity; per-site overrides go through the site's `user_agent` option.

/// Default User-Agent for site requests.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("ptharvest/{version} (torrent-aggregator)")
}
