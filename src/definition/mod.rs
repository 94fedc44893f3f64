//! Declarative site definitions.
//!
//! A [`SiteDefinition`] describes one site (or one schema family) purely as
//! data: URLs, timezone, search rows, user-info fetch steps, detail-page
//! fields and the level table. Definitions are compiled once into a
//! [`CompiledDefinition`] and are read-only afterwards.

mod builtin;
mod detail;
mod error;
mod registry;
mod search;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

pub use detail::{DetailParserConfig, DetailPlan};
pub use error::DefinitionError;
pub use registry::DefinitionRegistry;
pub use search::{SearchConfig, SearchPlan, apply_torrent_field};

use crate::extract::{UserInfoConfig, UserInfoPlan};
use crate::model::UserInfo;
use crate::units::{parse_size, parse_timezone};

const SECONDS_PER_WEEK: i64 = 7 * 24 * 3600;

fn default_timezone() -> String {
    "+08:00".to_string()
}

/// Declarative description of a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteDefinition {
    pub id: String,
    pub name: String,
    /// Alternative ids this definition answers to.
    #[serde(default)]
    pub aka: Vec<String>,
    /// Driver schema family (`nexusphp`, `mtorrent`).
    pub schema: String,
    /// Known base URLs, first is primary.
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    /// Requests per second the site tolerates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_burst: Option<u32>,
    /// UTC offset of timestamps rendered by the site.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfoConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<DetailParserConfig>,
    /// Promotion ladder, lowest level first.
    #[serde(default)]
    pub levels: Vec<LevelRequirement>,
}

/// Requirements to reach one user class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelRequirement {
    pub id: i64,
    pub name: String,
    /// Minimum account age.
    #[serde(default)]
    pub interval_weeks: i64,
    /// Minimum downloaded volume as a human size (`"200GB"`).
    #[serde(default)]
    pub downloaded: String,
    #[serde(default)]
    pub ratio: f64,
    #[serde(default)]
    pub bonus: f64,
    /// What the level unlocks.
    #[serde(default)]
    pub privilege: String,
}

impl LevelRequirement {
    /// Returns true when `user` satisfies every requirement at `now`.
    #[must_use]
    pub fn is_met_by(&self, user: &UserInfo, now: i64) -> bool {
        let weeks = if user.join_date > 0 {
            (now - user.join_date) / SECONDS_PER_WEEK
        } else {
            0
        };
        let downloaded = parse_size(&self.downloaded).unwrap_or(0);
        weeks >= self.interval_weeks
            && user.downloaded >= downloaded
            && user.ratio >= self.ratio
            && user.bonus >= self.bonus
    }
}

impl SiteDefinition {
    /// First level, in ladder order, whose requirements `user` does not meet yet.
    ///
    /// Returns `None` once the user meets every level.
    #[must_use]
    pub fn next_level(&self, user: &UserInfo, now: i64) -> Option<&LevelRequirement> {
        self.levels.iter().find(|level| !level.is_met_by(user, now))
    }

    /// Parses a definition from JSON text. `origin` names the source in errors.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::Json`] when the text is not a valid definition.
    pub fn from_json(origin: &str, text: &str) -> Result<Self, DefinitionError> {
        serde_json::from_str(text).map_err(|source| DefinitionError::Json {
            origin: origin.to_string(),
            source,
        })
    }
}

/// A [`SiteDefinition`] with its selectors, filters and regexes compiled.
#[derive(Debug, Clone)]
pub struct CompiledDefinition {
    definition: SiteDefinition,
    offset: FixedOffset,
    search: Option<SearchPlan>,
    user_info: Option<UserInfoPlan>,
    detail: DetailPlan,
}

impl CompiledDefinition {
    /// Compiles every declarative part of `definition`.
    ///
    /// # Errors
    ///
    /// Returns the first [`DefinitionError`] found.
    pub fn compile(definition: SiteDefinition) -> Result<Self, DefinitionError> {
        let offset =
            parse_timezone(&definition.timezone).ok_or_else(|| DefinitionError::InvalidTimezone {
                id: definition.id.clone(),
                value: definition.timezone.clone(),
            })?;
        let search = definition
            .search
            .as_ref()
            .map(|config| SearchPlan::compile(config, offset))
            .transpose()?;
        let user_info = definition
            .user_info
            .as_ref()
            .map(|config| UserInfoPlan::compile(&definition.id, config, offset))
            .transpose()?;
        let detail = DetailPlan::compile(&definition.detail.clone().unwrap_or_default(), offset)?;

        Ok(Self {
            definition,
            offset,
            search,
            user_info,
            detail,
        })
    }

    #[must_use]
    pub fn definition(&self) -> &SiteDefinition {
        &self.definition
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    /// Site-local UTC offset.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    #[must_use]
    pub fn search(&self) -> Option<&SearchPlan> {
        self.search.as_ref()
    }

    #[must_use]
    pub fn user_info(&self) -> Option<&UserInfoPlan> {
        self.user_info.as_ref()
    }

    /// Detail plan; a default one when the definition declares none.
    #[must_use]
    pub fn detail(&self) -> &DetailPlan {
        &self.detail
    }
}
