//! Cronflow configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CronflowError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronflowConfig {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl CronflowConfig {
    /// Load config from the default path (~/.cronflow/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default().with_env_overrides())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CronflowError::Config(format!("Failed to read config: {e}")))?;
        let config = Self::parse(&content)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config.with_env_overrides())
    }

    /// Parse config from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| CronflowError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| CronflowError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `GITHUB_TOKEN` beats whatever the file says.
    fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.trim().is_empty() {
                self.github.token = token;
            }
        }
        self
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Cronflow home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cronflow")
    }
}

/// Remote CI API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub token: String,
    /// Per-call timeout; a stalled upstream never holds a request longer than this.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_base() -> String { "https://api.github.com".into() }
fn default_timeout_secs() -> u64 { 30 }
fn default_user_agent() -> String { format!("cronflow/{}", env!("CARGO_PKG_VERSION")) }

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token: String::new(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Task store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String { "~/.cronflow/tasks.db".into() }

impl StorageConfig {
    /// The database path with `~` expanded.
    pub fn resolved_db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.db_path).to_string())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// How often live timers are reconciled against the store.
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
}

fn bool_true() -> bool { true }
fn default_resync_interval_secs() -> u64 { 60 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resync_interval_secs: default_resync_interval_secs(),
        }
    }
}
