//! Reachly configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ReachlyError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReachlyConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppApiConfig,
}

impl ReachlyConfig {
    /// Load config from the default path (~/.reachly/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReachlyError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ReachlyError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| ReachlyError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.engine.concurrency_limit == 0 {
            return Err(ReachlyError::Config(
                "engine.concurrency_limit must be at least 1".into(),
            ));
        }
        if self.engine.reconcile_batch_size == 0 {
            return Err(ReachlyError::Config(
                "engine.reconcile_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Reachly home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".reachly")
    }
}

/// Scheduling and execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Jobs allowed to execute at the same time in this process.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// Retries after the first attempt of a side effect.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Page size used when re-arming jobs at boot.
    #[serde(default = "default_reconcile_batch_size")]
    pub reconcile_batch_size: usize,
}

fn default_concurrency_limit() -> usize { 10 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_base_delay_ms() -> u64 { 1000 }
fn default_reconcile_batch_size() -> usize { 500 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            reconcile_batch_size: default_reconcile_batch_size(),
        }
    }
}

impl EngineConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.reachly/reachly.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

impl DatabaseConfig {
    /// Database path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

/// WhatsApp Business Cloud API settings. Credentials live on each sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppApiConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String { "https://graph.facebook.com/v21.0".into() }
fn default_request_timeout_secs() -> u64 { 30 }

impl Default for WhatsAppApiConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReachlyConfig::default();
        assert_eq!(config.engine.concurrency_limit, 10);
        assert_eq!(config.engine.max_retries, 3);
        assert_eq!(config.engine.retry_base_delay(), Duration::from_millis(1000));
        assert_eq!(config.engine.reconcile_batch_size, 500);
        assert!(config.whatsapp.api_base.starts_with("https://graph.facebook.com"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ReachlyConfig = toml::from_str(
            r#"
            [engine]
            concurrency_limit = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.concurrency_limit, 4);
        assert_eq!(config.engine.max_retries, 3);
        assert_eq!(config.database.path, "~/.reachly/reachly.db");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = ReachlyConfig::default();
        config.engine.max_retries = 7;
        config.save_to(&path).unwrap();

        let loaded = ReachlyConfig::load_from(&path).unwrap();
        assert_eq!(loaded.engine.max_retries, 7);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine]\nconcurrency_limit = 0\n").unwrap();
        assert!(matches!(
            ReachlyConfig::load_from(&path),
            Err(ReachlyError::Config(_))
        ));
    }
}
