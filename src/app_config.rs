//! Process configuration loaded from a TOML file.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use ptharvest_core::{HttpTimeouts, RankerConfig, SiteConfig};
use serde::Deserialize;

/// Contents of `ptharvest.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// HTTP client timeouts.
    #[serde(default)]
    pub http: HttpTimeouts,
    /// Extra site definition files, loaded on top of the built-ins.
    #[serde(default)]
    pub definitions_dir: Option<PathBuf>,
    #[serde(default)]
    pub ranking: RankerConfig,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

impl AppConfig {
    /// Reads, parses and validates `path`.
    ///
    /// A relative `definitions_dir` is resolved against the config file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::parse(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        if let Some(dir) = &config.definitions_dir
            && dir.is_relative()
            && let Some(parent) = path.parent()
        {
            config.definitions_dir = Some(parent.join(dir));
        }
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates values the types alone cannot constrain.
    pub fn validate(&self) -> Result<()> {
        validate_timeout_secs("http.connect_timeout_secs", self.http.connect_timeout_secs)?;
        validate_timeout_secs("http.read_timeout_secs", self.http.read_timeout_secs)?;

        for (field, value) in [
            ("ranking.seeder_weight", self.ranking.seeder_weight),
            ("ranking.leecher_weight", self.ranking.leecher_weight),
            ("ranking.free_bonus", self.ranking.free_bonus),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("Invalid config value for `{field}`: {value}. Expected a finite value >= 0");
            }
        }

        let mut seen = HashSet::new();
        for site in &self.sites {
            if site.id.trim().is_empty() {
                bail!("Invalid config value for `sites.id`: empty. Every site needs an id");
            }
            if !seen.insert(site.id.as_str()) {
                bail!("Duplicate site id `{}` in `[[sites]]`", site.id);
            }
            if url::Url::parse(&site.base_url).is_err() {
                bail!(
                    "Invalid config value for `sites.base_url` of `{}`: '{}'. \
                     Expected an absolute URL",
                    site.id,
                    site.base_url
                );
            }
            if let Some(rate) = site.rate_limit
                && (!rate.is_finite() || rate < 0.0)
            {
                bail!(
                    "Invalid config value for `sites.rate_limit` of `{}`: {rate}. \
                     Expected a finite value >= 0",
                    site.id
                );
            }
            if site.rate_burst == Some(0) {
                bail!(
                    "Invalid config value for `sites.rate_burst` of `{}`: 0. Expected range: 1..",
                    site.id
                );
            }
        }
        Ok(())
    }

    /// Sites named by `ids`, or every site when `ids` is empty.
    pub fn select_sites(&self, ids: &[String]) -> Result<Vec<&SiteConfig>> {
        if ids.is_empty() {
            return Ok(self.sites.iter().collect());
        }
        ids.iter()
            .map(|id| {
                self.sites
                    .iter()
                    .find(|site| site.id == *id)
                    .with_context(|| format!("No site with id `{id}` in config"))
            })
            .collect()
    }
}

fn validate_timeout_secs(field: &str, value: u64) -> Result<()> {
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}
