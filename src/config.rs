//! Bot configuration
//!
//! Loaded from an optional JSON file, then overridden from the environment
//! (`.env` files included). Every field has a default, so an empty file or no
//! file at all is a valid configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chat::ReplyLimitConfig;
use crate::models::CentsValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    #[serde(default)]
    pub spreadsheet: SpreadsheetConfig,

    /// Catalog JSON describing the current bid wars.
    #[serde(default)]
    pub bidwar_data_path: Option<PathBuf>,

    #[serde(default)]
    pub chat: ChatConfig,

    /// How long a `!bid` with nothing to assign is remembered.
    #[serde(default = "default_preference_ttl_secs")]
    pub preference_ttl_secs: u64,

    /// How long individual gift subs are ignored after a community gift.
    #[serde(default = "default_mass_gift_window_secs")]
    pub mass_gift_window_secs: u64,

    /// Donations below this are still recorded, but never attributed or
    /// replied to.
    #[serde(default = "default_minimum_donation_cents")]
    pub minimum_donation_cents: i64,

    #[serde(default = "default_ledger_timeout_secs")]
    pub ledger_timeout_secs: u64,

    #[serde(default)]
    pub tip_file: TipFileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadsheetConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    /// Bearer token for the Sheets API. Only ever read from the environment.
    #[serde(skip)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    #[serde(default)]
    pub channel: String,
    #[serde(default = "default_true")]
    pub replies_enabled: bool,
    /// Minimum time between outgoing replies once the burst is spent.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipFileConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_sheet_name() -> String {
    "Bid war tracker".to_string()
}
fn default_true() -> bool {
    true
}
fn default_cooldown_ms() -> u64 {
    2000
}
fn default_burst() -> u32 {
    1
}
fn default_preference_ttl_secs() -> u64 {
    180
}
fn default_mass_gift_window_secs() -> u64 {
    5
}
fn default_minimum_donation_cents() -> i64 {
    100
}
fn default_ledger_timeout_secs() -> u64 {
    10
}
fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for SpreadsheetConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            sheet_name: default_sheet_name(),
            access_token: None,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            channel: String::new(),
            replies_enabled: true,
            cooldown_ms: default_cooldown_ms(),
            burst: default_burst(),
        }
    }
}

impl Default for TipFileConfig {
    fn default() -> Self {
        Self {
            path: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            spreadsheet: SpreadsheetConfig::default(),
            bidwar_data_path: None,
            chat: ChatConfig::default(),
            preference_ttl_secs: default_preference_ttl_secs(),
            mass_gift_window_secs: default_mass_gift_window_secs(),
            minimum_donation_cents: default_minimum_donation_cents(),
            ledger_timeout_secs: default_ledger_timeout_secs(),
            tip_file: TipFileConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("malformed config file {}", path.display()))?;
        Ok(config)
    }

    /// File (if any) first, then environment overrides.
    pub fn from_env(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, which maps a variable name to its
    /// value.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("BIDWAR_SPREADSHEET_ID") {
            self.spreadsheet.id = id;
        }
        if let Some(name) = lookup("BIDWAR_SHEET_NAME") {
            self.spreadsheet.sheet_name = name;
        }
        if let Some(token) = lookup("SHEETS_ACCESS_TOKEN") {
            self.spreadsheet.access_token = Some(token);
        }
        if let Some(path) = lookup("BIDWAR_DATA") {
            self.bidwar_data_path = Some(PathBuf::from(path));
        }
        if let Some(channel) = lookup("BIDWAR_CHANNEL") {
            self.chat.channel = channel;
        }
        if let Some(raw) = lookup("BIDWAR_REPLIES_ENABLED") {
            self.chat.replies_enabled = raw.parse().with_context(|| {
                format!("BIDWAR_REPLIES_ENABLED must be true or false, got {:?}", raw)
            })?;
        }
        if let Some(path) = lookup("BIDWAR_TIP_FILE") {
            self.tip_file.path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn preference_ttl(&self) -> Duration {
        Duration::from_secs(self.preference_ttl_secs)
    }

    pub fn mass_gift_window(&self) -> Duration {
        Duration::from_secs(self.mass_gift_window_secs)
    }

    pub fn minimum_donation(&self) -> CentsValue {
        CentsValue(self.minimum_donation_cents)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_timeout_secs)
    }

    pub fn reply_limit(&self) -> ReplyLimitConfig {
        ReplyLimitConfig {
            refill_interval: Duration::from_millis(self.chat.cooldown_ms),
            burst: self.chat.burst,
        }
    }

    pub fn tip_poll_interval(&self) -> Duration {
        Duration::from_millis(self.tip_file.poll_interval_ms)
    }
}
