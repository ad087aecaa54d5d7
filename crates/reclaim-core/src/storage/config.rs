//! TOML-based application configuration.
//!
//! Stores the campaign policy knobs (ping limits, sweep intervals,
//! staleness threshold), transport timeouts, and the credentials for
//! the external capabilities. Environment variables win over the
//! file for secrets so deployments never need tokens on disk.
//!
//! Configuration is stored at `~/.config/reclaim/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;

/// Campaign policy knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CampaignPolicy {
    /// Maximum reminder pings per member (initial send included).
    #[serde(default = "default_max_pings")]
    pub max_pings: u32,
    /// Minimum hours between pings to the same member; also the sweep
    /// period of the recurring scheduler.
    #[serde(default = "default_reminder_interval_hours")]
    pub reminder_interval_hours: u32,
    /// Days an ongoing campaign may run before the manager gets a
    /// staleness advisory.
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: u32,
}

impl Default for CampaignPolicy {
    fn default() -> Self {
        Self {
            max_pings: default_max_pings(),
            reminder_interval_hours: default_reminder_interval_hours(),
            stale_after_days: default_stale_after_days(),
        }
    }
}

impl CampaignPolicy {
    pub fn reminder_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.reminder_interval_hours))
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.stale_after_days))
    }
}

/// Bounded timeouts for outbound calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Outbound messenger/ledger calls.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Classifier/crafter LLM calls.
    #[serde(default = "default_classify_timeout_secs")]
    pub classify_timeout_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            send_timeout_secs: default_send_timeout_secs(),
            classify_timeout_secs: default_classify_timeout_secs(),
        }
    }
}

impl TimeoutsConfig {
    pub fn send(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn classify(&self) -> Duration {
        Duration::from_secs(self.classify_timeout_secs)
    }
}

/// Slack transport settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot token; RECLAIM_SLACK_TOKEN overrides.
    #[serde(default)]
    pub bot_token: Option<String>,
}

/// Google Sheets ledger settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SheetsConfig {
    /// API bearer token; RECLAIM_SHEETS_TOKEN overrides.
    #[serde(default)]
    pub api_token: Option<String>,
}

/// LLM settings for classification and message crafting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key; RECLAIM_LLM_API_KEY overrides. Without a key the
    /// classifier runs heuristics-only and the crafter uses the
    /// fallback template.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_llm_model(),
        }
    }
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/reclaim/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub campaign: CampaignPolicy,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

// Default functions
fn default_max_pings() -> u32 {
    3
}
fn default_reminder_interval_hours() -> u32 {
    24
}
fn default_stale_after_days() -> u32 {
    7
}
fn default_send_timeout_secs() -> u64 {
    10
}
fn default_classify_timeout_secs() -> u64 {
    10
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/reclaim"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load the configuration, falling back to defaults when the file
    /// does not exist yet.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::LoadFailed {
            path,
            message: e.to_string(),
        })
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let raw = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, raw).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Slack bot token with environment override.
    pub fn slack_token(&self) -> Result<String, ConfigError> {
        std::env::var("RECLAIM_SLACK_TOKEN")
            .ok()
            .or_else(|| self.slack.bot_token.clone())
            .ok_or_else(|| ConfigError::MissingKey("slack.bot_token".to_string()))
    }

    /// Sheets API token with environment override.
    pub fn sheets_token(&self) -> Result<String, ConfigError> {
        std::env::var("RECLAIM_SHEETS_TOKEN")
            .ok()
            .or_else(|| self.sheets.api_token.clone())
            .ok_or_else(|| ConfigError::MissingKey("sheets.api_token".to_string()))
    }

    /// LLM API key with environment override; None means degrade to
    /// heuristics/templates rather than fail.
    pub fn llm_api_key(&self) -> Option<String> {
        std::env::var("RECLAIM_LLM_API_KEY")
            .ok()
            .or_else(|| self.llm.api_key.clone())
    }
}
