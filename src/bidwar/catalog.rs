//! Bid war catalog: contests, their options, and the aliases donors use to
//! name them. Loaded once at startup and never mutated afterwards.

use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("malformed bid war data: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate option short code {0:?}")]
    DuplicateShortCode(String),
}

/// How a contest's totals are summarized in chat. Tallying is unaffected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SummaryStyle {
    /// Every option, in stored order, with the gap to the leader.
    #[default]
    All,
    FirstPlace,
    LastPlace,
    /// The top `number_of_winners` options.
    Winners,
}

/// A case-insensitive, whole-word pattern naming an option.
#[derive(Debug, Clone)]
pub struct Alias(Regex);

impl Alias {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!(r"(?i)\b(?:{})\b", pattern)).map(Alias)
    }

    /// Byte offset of the leftmost match in `text`.
    pub fn find_in(&self, text: &str) -> Option<usize> {
        self.0.find(text).map(|m| m.start())
    }
}

impl PartialEq for Alias {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_str() == other.0.as_str()
    }
}

impl<'de> Deserialize<'de> for Alias {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Alias::new(&raw).map_err(|e| {
            serde::de::Error::custom(format!("alias {:?} not suitable for regexp: {}", raw, e))
        })
    }
}

/// A contestant in a bid war. The zero value (empty short code) means
/// "no option".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidOption {
    pub display_name: String,
    /// Stable identity key, unique within a catalog.
    pub short_code: String,
    #[serde(default)]
    pub aliases: Vec<Alias>,
    #[serde(default)]
    pub closed: bool,
}

impl BidOption {
    pub fn new(display_name: impl Into<String>, short_code: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            short_code: short_code.into(),
            aliases: Vec::new(),
            closed: false,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.short_code.is_empty()
    }
}

fn default_winners() -> usize {
    1
}

/// A single bid war between several options. The option with the most money wins.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contest {
    pub name: String,
    #[serde(default)]
    pub summary_style: SummaryStyle,
    /// Only consulted by [`SummaryStyle::Winners`].
    #[serde(default = "default_winners")]
    pub number_of_winners: usize,
    #[serde(default)]
    pub options: Vec<BidOption>,
    #[serde(default)]
    pub closed: bool,
}

impl Contest {
    pub fn contains(&self, option: &BidOption) -> bool {
        self.options.iter().any(|o| o.short_code == option.short_code)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    #[serde(default)]
    pub contests: Vec<Contest>,
    /// Only accept bids made through an explicit bid command; never infer
    /// them from sub or donation messages.
    #[serde(default)]
    pub require_explicit_bid: bool,
}

impl Catalog {
    pub fn parse(raw: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_json::from_str(raw)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for option in self.contests.iter().flat_map(|c| c.options.iter()) {
            if !seen.insert(option.short_code.as_str()) {
                return Err(CatalogError::DuplicateShortCode(option.short_code.clone()));
            }
        }
        Ok(())
    }

    /// All open options in all open contests, in catalog order.
    pub fn all_open_options(&self) -> Vec<&BidOption> {
        self.contests
            .iter()
            .filter(|c| !c.closed)
            .flat_map(|c| c.options.iter())
            .filter(|o| !o.closed)
            .collect()
    }

    /// The open contest containing `option`, if any.
    pub fn find_contest(&self, option: &BidOption) -> Option<&Contest> {
        self.contests
            .iter()
            .filter(|c| !c.closed)
            .find(|c| c.contains(option))
    }

    pub fn option_by_short_code(&self, code: &str) -> Option<&BidOption> {
        self.contests
            .iter()
            .flat_map(|c| c.options.iter())
            .find(|o| o.short_code == code)
    }
}
