//! Runtime configuration
//!
//! Loaded from a YAML file. Every field has a default, so a missing file or a
//! partial one is valid.

use crate::duration::{MAX_RESTRICTION_DAYS, MINUTES_PER_DAY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Default configuration file location
pub const CONFIG_FILE: &str = "config/modsched.yaml";
/// Environment variable overriding [`CONFIG_FILE`]
pub const CONFIG_ENV: &str = "MODSCHED_CONFIG";
/// Default directory for store snapshots
pub const DATA_DIR: &str = "data";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub limits: CommandLimits,
    pub communities: Vec<CommunityConfig>,
    /// Where store snapshots are written
    pub data_dir: PathBuf,
    /// Use the in-memory platform instead of Discord
    pub dry_run: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            limits: CommandLimits::default(),
            communities: Vec::new(),
            data_dir: PathBuf::from(DATA_DIR),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_secs: u64,
    /// Delay before the ban backing a kick is lifted
    pub kick_reversal_delay_secs: u64,
    /// Issuer recorded for automatic actions
    pub system_identity: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            kick_reversal_delay_secs: crate::duration::DEFAULT_KICK_REVERSAL_DELAY_SECS,
            system_identity: crate::BOT_NAME.to_string(),
        }
    }
}

/// Bounds enforced on command input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandLimits {
    pub max_ban_days: u32,
    pub ban_requires_reason: bool,
    pub max_mute_days: u32,
    pub max_timeout_minutes: u32,
    pub max_warning_level: u8,
}

impl Default for CommandLimits {
    fn default() -> Self {
        Self {
            max_ban_days: 365,
            ban_requires_reason: true,
            max_mute_days: 30,
            max_timeout_minutes: 7 * 24 * 60,
            max_warning_level: 5,
        }
    }
}

impl CommandLimits {
    fn validate(&self) -> ConfigResult<()> {
        let day_limits = [
            ("limits.max_ban_days", self.max_ban_days),
            ("limits.max_mute_days", self.max_mute_days),
        ];
        for (name, value) in day_limits {
            if value == 0 || value > MAX_RESTRICTION_DAYS {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be between 1 and {MAX_RESTRICTION_DAYS}"
                )));
            }
        }

        let max_minutes = MAX_RESTRICTION_DAYS * MINUTES_PER_DAY;
        if self.max_timeout_minutes == 0 || self.max_timeout_minutes > max_minutes {
            return Err(ConfigError::Invalid(format!(
                "limits.max_timeout_minutes must be between 1 and {max_minutes}"
            )));
        }
        if self.max_warning_level == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_warning_level must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-community settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityConfig {
    pub community: String,
    #[serde(default)]
    pub auto_moderation: AutoModerationConfig,
}

/// Thresholds for automatic escalation on warning count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoModerationConfig {
    pub enabled: bool,
    pub ban_threshold: u32,
    pub mute_threshold: u32,
}

impl Default for AutoModerationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ban_threshold: 5,
            mute_threshold: 3,
        }
    }
}

impl AppConfig {
    /// Load from `MODSCHED_CONFIG` or the default location
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub async fn load_default() -> ConfigResult<Self> {
        let path = std::env::var(CONFIG_ENV).map_or_else(|_| PathBuf::from(CONFIG_FILE), PathBuf::from);
        Self::load(&path).await
    }

    /// Load from `path`; a missing file yields the defaults
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let config = Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        info!(
            path = %path.display(),
            communities = config.communities.len(),
            dry_run = config.dry_run,
            "Loaded config"
        );
        Ok(config)
    }

    /// Parse and validate a YAML document
    ///
    /// # Errors
    /// Returns an error on malformed YAML or out-of-range values
    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: PathBuf::new(),
                source,
            })?
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.scheduler.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.poll_interval_secs must be positive".to_string(),
            ));
        }
        if self.scheduler.system_identity.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "scheduler.system_identity must not be empty".to_string(),
            ));
        }
        self.limits.validate()?;
        for community in &self.communities {
            let auto = &community.auto_moderation;
            if auto.ban_threshold == 0 || auto.mute_threshold == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{}: escalation thresholds must be positive",
                    community.community
                )));
            }
        }
        Ok(())
    }

    /// Auto-moderation settings for `community`, defaults if unconfigured
    #[must_use]
    pub fn auto_moderation(&self, community: &str) -> AutoModerationConfig {
        self.communities
            .iter()
            .find(|c| c.community == community)
            .map(|c| c.auto_moderation)
            .unwrap_or_default()
    }
}
