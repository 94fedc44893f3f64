use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Promotional multiplier applied by a site to a torrent's transfer accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DiscountLevel {
    /// No promotion.
    #[default]
    #[serde(rename = "none")]
    None,
    /// Download not counted.
    #[serde(rename = "free")]
    Free,
    /// Download not counted, upload counted double.
    #[serde(rename = "2xfree")]
    TwoXFree,
    /// 30% of the download counted.
    #[serde(rename = "percent_30")]
    Percent30,
    /// 50% of the download counted.
    #[serde(rename = "percent_50")]
    Percent50,
    /// 70% of the download counted.
    #[serde(rename = "percent_70")]
    Percent70,
    /// Upload counted double.
    #[serde(rename = "2xup")]
    TwoXUp,
    /// Half download, double upload.
    #[serde(rename = "2x50")]
    TwoX50,
}

impl DiscountLevel {
    /// All levels, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::None,
        Self::Free,
        Self::TwoXFree,
        Self::Percent30,
        Self::Percent50,
        Self::Percent70,
        Self::TwoXUp,
        Self::TwoX50,
    ];

    /// Returns `(download_ratio, upload_ratio)` for this level.
    #[must_use]
    pub fn ratios(self) -> (f64, f64) {
        match self {
            Self::None => (1.0, 1.0),
            Self::Free => (0.0, 1.0),
            Self::TwoXFree => (0.0, 2.0),
            Self::Percent30 => (0.3, 1.0),
            Self::Percent50 => (0.5, 1.0),
            Self::Percent70 => (0.7, 1.0),
            Self::TwoXUp => (1.0, 2.0),
            Self::TwoX50 => (0.5, 2.0),
        }
    }

    /// Fraction of the transferred bytes counted against the download quota.
    #[must_use]
    pub fn download_ratio(self) -> f64 {
        self.ratios().0
    }

    /// Multiplier applied to uploaded bytes.
    #[must_use]
    pub fn upload_ratio(self) -> f64 {
        self.ratios().1
    }

    /// Goodness ranking; higher is better.
    ///
    /// Lower download cost beats upload bonus, so `Percent30` outranks
    /// `Percent50`, and `TwoXUp` only beats `None`.
    #[must_use]
    pub fn priority(self) -> u8 {
        match self {
            Self::TwoXFree => 100,
            Self::Free => 90,
            Self::TwoX50 => 80,
            Self::Percent30 => 60,
            Self::Percent50 => 50,
            Self::Percent70 => 40,
            Self::TwoXUp => 20,
            Self::None => 0,
        }
    }

    /// Returns true when the download is not counted at all.
    #[must_use]
    pub fn is_free(self) -> bool {
        self.download_ratio() == 0.0
    }

    /// Stable lowercase label, matching the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Free => "free",
            Self::TwoXFree => "2xfree",
            Self::Percent30 => "percent_30",
            Self::Percent50 => "percent_50",
            Self::Percent70 => "percent_70",
            Self::TwoXUp => "2xup",
            Self::TwoX50 => "2x50",
        }
    }

    /// Recognises the spellings sites use for promotions.
    ///
    /// Covers API enums (`FREE`, `_2X_FREE`, `PERCENT_50`, `_2X_PERCENT_50`),
    /// NexusPHP icon classes (`pro_free2up`, `pro_50pctdown`, `pro_2up`) and
    /// free-form words (`twoupfree`, `halfdown`). Unrecognised tokens yield `None`.
    #[must_use]
    pub fn from_site_token(token: &str) -> Option<Self> {
        let key: String = token
            .to_ascii_lowercase()
            .trim_start_matches("pro_")
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect();

        let level = match key.as_str() {
            "" | "none" | "normal" => Self::None,
            "free" => Self::Free,
            "2xfree" | "free2up" | "twoupfree" | "free2x" => Self::TwoXFree,
            "percent30" | "30pctdown" | "thirtypercent" | "30" => Self::Percent30,
            "percent50" | "50pctdown" | "halfdown" | "half" | "50" => Self::Percent50,
            "percent70" | "70pctdown" | "seventypercent" | "70" => Self::Percent70,
            "2x" | "2xup" | "2up" | "twoup" => Self::TwoXUp,
            "2x50" | "2xpercent50" | "50pctdown2up" | "2uphalfdown" | "twouphalfdown" => {
                Self::TwoX50
            }
            _ => return None,
        };
        Some(level)
    }
}

impl fmt::Display for DiscountLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscountLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .or_else(|| Self::from_site_token(s))
            .ok_or_else(|| format!("unknown discount level '{s}'"))
    }
}
