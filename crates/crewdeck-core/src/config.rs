//! Application configuration management.
//!
//! Configuration is stored at `~/.config/crewdeck/config.json` and can be
//! overridden per process with `CREWDECK_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::inactivity::InactivityConfig;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "crewdeck";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 15 * 60;
const DEFAULT_WARNING_LEAD_SECS: u64 = 60;

pub const ENV_API_URL: &str = "CREWDECK_API_URL";
pub const ENV_IDLE_TIMEOUT: &str = "CREWDECK_IDLE_TIMEOUT_SECS";
pub const ENV_WARNING_LEAD: &str = "CREWDECK_WARNING_SECS";
pub const ENV_EMAIL: &str = "CREWDECK_EMAIL";

/// Where the session is persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub idle_timeout_secs: u64,
    pub warning_lead_secs: u64,
    pub storage: StorageBackend,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            warning_lead_secs: DEFAULT_WARNING_LEAD_SECS,
            storage: StorageBackend::default(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults when absent), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Overlay values from `lookup` (normally the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = present(ENV_API_URL) {
            self.api_base_url = Some(url.trim().to_string());
        }
        if let Some(secs) = present(ENV_IDLE_TIMEOUT) {
            self.idle_timeout_secs = parse_secs(ENV_IDLE_TIMEOUT, &secs)?;
        }
        if let Some(secs) = present(ENV_WARNING_LEAD) {
            self.warning_lead_secs = parse_secs(ENV_WARNING_LEAD, &secs)?;
        }
        if let Some(email) = present(ENV_EMAIL) {
            self.last_email = Some(email.trim().to_string());
        }
        Ok(())
    }

    pub fn api_base_url(&self) -> Result<&str> {
        self.api_base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("No API URL configured; set {} or api_base_url", ENV_API_URL)
            })
    }

    /// Inactivity window for the session monitor.
    pub fn inactivity(&self) -> Result<InactivityConfig> {
        InactivityConfig::new(
            Duration::from_secs(self.idle_timeout_secs),
            Duration::from_secs(self.warning_lead_secs),
        )
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a whole number of seconds, got {:?}", key, value))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.idle_timeout_secs, 900);
        assert_eq!(config.warning_lead_secs, 60);
        assert_eq!(config.storage, StorageBackend::File);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            api_base_url: Some("https://api.example.com".to_string()),
            storage: StorageBackend::Keyring,
            last_email: Some("a@x.com".to_string()),
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"storage": "keyring", "idle_timeout_secs": 300}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.storage, StorageBackend::Keyring);
        assert_eq!(config.idle_timeout_secs, 300);
        assert_eq!(config.warning_lead_secs, 60);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                (ENV_API_URL, " https://api.example.com "),
                (ENV_IDLE_TIMEOUT, "120"),
                (ENV_WARNING_LEAD, "30"),
                (ENV_EMAIL, "b@x.com"),
            ]))
            .unwrap();

        assert_eq!(config.api_base_url().unwrap(), "https://api.example.com");
        assert_eq!(config.idle_timeout_secs, 120);
        assert_eq!(config.warning_lead_secs, 30);
        assert_eq!(config.last_email.as_deref(), Some("b@x.com"));
    }

    #[test]
    fn test_blank_env_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(env(&[(ENV_IDLE_TIMEOUT, "  ")])).unwrap();
        assert_eq!(config.idle_timeout_secs, 900);
    }

    #[test]
    fn test_bad_env_number() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(env(&[(ENV_WARNING_LEAD, "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_WARNING_LEAD));
    }

    #[test]
    fn test_missing_api_url() {
        let err = Config::default().api_base_url().unwrap_err();
        assert!(err.to_string().contains(ENV_API_URL));
    }

    #[test]
    fn test_inactivity_config() {
        let inactivity = Config::default().inactivity().unwrap();
        assert_eq!(inactivity.idle_timeout, Duration::from_secs(900));
        assert_eq!(inactivity.warning_lead, Duration::from_secs(60));

        let lead_too_long = Config {
            idle_timeout_secs: 60,
            warning_lead_secs: 60,
            ..Config::default()
        };
        assert!(lead_too_long.inactivity().is_err());

        let zero = Config {
            idle_timeout_secs: 0,
            ..Config::default()
        };
        assert!(zero.inactivity().is_err());
    }
}
