//! Configured sites and the public per-site operations.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::driver::{Driver, SearchQuery};
use crate::error::SiteError;
use crate::model::{TorrentItem, UserInfo};
use crate::request::RequestContext;

/// One configured site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Driver schema (`nexusphp`, `mtorrent`).
    #[serde(rename = "type")]
    pub schema: String,
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub base_url: String,
    /// Alternate base URLs tried when the primary fails.
    #[serde(default)]
    pub urls: Vec<String>,
    /// Schema-specific settings (`cookie`, `api_key`, `user_agent`, ...).
    #[serde(default)]
    pub options: Value,
    /// Requests per second; 0 disables limiting. Falls back to the definition's value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_burst: Option<u32>,
}

impl SiteConfig {
    /// Creates a config with no alternates, options or limits.
    #[must_use]
    pub fn new(schema: &str, id: &str, base_url: &str) -> Self {
        Self {
            schema: schema.to_string(),
            id: id.to_string(),
            name: id.to_string(),
            base_url: base_url.to_string(),
            urls: Vec::new(),
            options: Value::Null,
            rate_limit: None,
            rate_burst: None,
        }
    }

    /// Sets a string option.
    #[must_use]
    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        if !self.options.is_object() {
            self.options = Value::Object(serde_json::Map::new());
        }
        if let Value::Object(map) = &mut self.options {
            map.insert(key.to_string(), Value::String(value.to_string()));
        }
        self
    }

    /// Non-blank string option.
    #[must_use]
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Primary base URL followed by the alternates.
    #[must_use]
    pub fn all_urls(&self) -> Vec<String> {
        std::iter::once(&self.base_url)
            .chain(&self.urls)
            .cloned()
            .collect()
    }

    /// Display name, the id when no name is configured.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }
}

/// A configured site bound to its driver.
#[derive(Clone)]
pub struct Site {
    config: SiteConfig,
    driver: Arc<dyn Driver>,
}

impl Site {
    #[must_use]
    pub fn new(config: SiteConfig, driver: Arc<dyn Driver>) -> Self {
        Self { config, driver }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.config.id
    }

    #[must_use]
    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    #[must_use]
    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    /// Searches the site.
    ///
    /// # Errors
    ///
    /// Returns the driver's [`SiteError`].
    #[tracing::instrument(skip(self, ctx), fields(site = %self.config.id))]
    pub async fn search(
        &self,
        ctx: &RequestContext,
        query: &SearchQuery,
    ) -> Result<Vec<TorrentItem>, SiteError> {
        let items = self.driver.search(ctx, query).await?;
        info!(count = items.len(), "search completed");
        Ok(items)
    }

    /// Fetches the account snapshot.
    ///
    /// # Errors
    ///
    /// Returns the critical fetch's [`SiteError`]; optional stats never fail the call.
    #[tracing::instrument(skip(self, ctx), fields(site = %self.config.id))]
    pub async fn get_user_info(&self, ctx: &RequestContext) -> Result<UserInfo, SiteError> {
        self.driver.get_user_info(ctx).await
    }

    /// Downloads the `.torrent` file for `id`.
    ///
    /// # Errors
    ///
    /// Returns the driver's [`SiteError`].
    #[tracing::instrument(skip(self, ctx), fields(site = %self.config.id))]
    pub async fn download(&self, ctx: &RequestContext, id: &str) -> Result<Vec<u8>, SiteError> {
        self.driver.download(ctx, id).await
    }

    /// Fetches one torrent's details.
    ///
    /// # Errors
    ///
    /// Returns the driver's [`SiteError`].
    #[tracing::instrument(skip(self, ctx), fields(site = %self.config.id))]
    pub async fn get_torrent_detail(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<TorrentItem, SiteError> {
        self.driver.get_torrent_detail(ctx, id).await
    }
}

impl std::fmt::Debug for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Site")
            .field("id", &self.config.id)
            .field("schema", &self.config.schema)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_site_config_from_toml() {
        let config: SiteConfig = toml::from_str(
            r#"
            type = "mtorrent"
            id = "mteam"
            base_url = "https://api.m-team.example"
            urls = ["https://api2.m-team.example"]
            rate_limit = 0.5
            [options]
            api_key = "  secret  "
            "#,
        )
        .unwrap();
        assert_eq!(config.schema, "mtorrent");
        assert_eq!(config.option_str("api_key"), Some("secret"));
        assert_eq!(config.option_str("cookie"), None);
        assert_eq!(config.all_urls().len(), 2);
        assert_eq!(config.display_name(), "mteam");
        assert_eq!(config.rate_burst, None);
    }

    #[test]
    fn test_with_option_creates_object() {
        let config =
            SiteConfig::new("nexusphp", "demo", "https://demo.test").with_option("cookie", "a=b");
        assert_eq!(config.option_str("cookie"), Some("a=b"));
    }
}
