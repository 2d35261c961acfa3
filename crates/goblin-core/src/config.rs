//! Goblin configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GoblinError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoblinConfig {
    /// Root for every durable file. Empty means the working directory at startup.
    #[serde(default)]
    pub data_dir: String,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
}

impl Default for GoblinConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            sweep: SweepConfig::default(),
            session: SessionConfig::default(),
            discord: DiscordConfig::default(),
        }
    }
}

impl GoblinConfig {
    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GoblinError::Config(format!("Failed to read config: {e}")))?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| GoblinError::Config(format!("Failed to parse config: {e}")))?;
        config.apply_env();
        Ok(config)
    }

    /// Load config if the file exists, otherwise defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            let mut config = Self::default();
            config.apply_env();
            Ok(config)
        }
    }

    /// Default config path (`./goblin.toml`).
    pub fn default_path() -> PathBuf {
        PathBuf::from("goblin.toml")
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("GOBLIN_DISCORD_TOKEN")
            && !token.trim().is_empty()
        {
            self.discord.token = token;
        }
    }

    /// Resolved data directory (tilde-expanded, relative to the working directory).
    pub fn data_root(&self) -> PathBuf {
        if self.data_dir.trim().is_empty() {
            return std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        }
        let expanded = PathBuf::from(shellexpand::tilde(&self.data_dir).to_string());
        if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(expanded)
        }
    }

    /// Guild settings document.
    pub fn recruit_config_path(&self) -> PathBuf {
        self.data_root().join("recruit-config.json")
    }

    /// Open applicant thread registry document.
    pub fn registry_path(&self) -> PathBuf {
        self.data_root().join("tmp").join("open-recruit-applicants.json")
    }

    /// Root of the CWL war cache tree.
    pub fn cwl_dir(&self) -> PathBuf {
        self.data_root().join("cwl")
    }
}

/// Stale-thread sweeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
    #[serde(default = "default_close_message")]
    pub close_message: String,
}

fn default_sweep_interval() -> u64 { 60 * 60 }
fn default_stale_after() -> u64 { 7 * 24 * 60 * 60 }
fn default_close_message() -> String { "Auto-closing this recruit thread after 7 days.".into() }

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
            stale_after_secs: default_stale_after(),
            close_message: default_close_message(),
        }
    }
}

/// DM session cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
}

fn default_session_ttl() -> u64 { 60 * 60 }

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
        }
    }
}

/// Discord REST credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String { "https://discord.com/api/v10".into() }

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: default_api_base(),
        }
    }
}
