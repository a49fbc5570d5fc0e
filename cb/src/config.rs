//! ComponentBridge configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::protocol::Permission;

/// Main ComponentBridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Protocol session settings
    pub bridge: BridgeConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .componentbridge.yml
        let local_config = PathBuf::from(".componentbridge.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/componentbridge/componentbridge.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("componentbridge").join("componentbridge.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed: a broken config file is reported later by `load`.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = [
            config_path.cloned(),
            Some(PathBuf::from(".componentbridge.yml")),
            dirs::config_dir().map(|d| d.join("componentbridge").join("componentbridge.yml")),
        ];

        candidates
            .into_iter()
            .flatten()
            .find(|p| p.exists())
            .and_then(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Protocol session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Debounce save requests instead of sending one write per request
    #[serde(rename = "coalesced-saving")]
    pub coalesced_saving: bool,

    /// Quiescence window for coalesced saves in milliseconds
    #[serde(rename = "saving-delay-ms")]
    pub saving_delay_ms: u64,

    /// Apply theme pushes from the host
    #[serde(rename = "accepts-themes")]
    pub accepts_themes: bool,

    /// Permissions requested right after registration
    pub permissions: Vec<Permission>,

    /// Attach the initial permission set to every envelope (older hosts)
    #[serde(rename = "embed-permissions")]
    pub embed_permissions: bool,

    /// Give up on one-shot calls unanswered after this many milliseconds
    #[serde(rename = "reply-timeout-ms", skip_serializing_if = "Option::is_none")]
    pub reply_timeout_ms: Option<u64>,

    /// How many answered message ids to remember for duplicate replies
    #[serde(rename = "answered-history")]
    pub answered_history: usize,

    /// How many ids of calls sent without a callback to remember
    #[serde(rename = "untracked-history")]
    pub untracked_history: usize,
}

fn default_saving_delay_ms() -> u64 {
    debug!("default_saving_delay_ms: called");
    250
}

fn default_answered_history() -> usize {
    debug!("default_answered_history: called");
    256
}

fn default_untracked_history() -> usize {
    debug!("default_untracked_history: called");
    4096
}

impl Default for BridgeConfig {
    fn default() -> Self {
        debug!("BridgeConfig::default: called");
        Self {
            coalesced_saving: true,
            saving_delay_ms: default_saving_delay_ms(),
            accepts_themes: true,
            permissions: Vec::new(),
            embed_permissions: false,
            reply_timeout_ms: None,
            answered_history: default_answered_history(),
            untracked_history: default_untracked_history(),
        }
    }
}

impl BridgeConfig {
    /// Get the debounce window as a Duration
    pub fn saving_delay(&self) -> Duration {
        debug!(saving_delay_ms = %self.saving_delay_ms, "BridgeConfig::saving_delay: called");
        Duration::from_millis(self.saving_delay_ms)
    }

    /// Get the reply timeout as a Duration, if one is configured
    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert!(config.coalesced_saving);
        assert_eq!(config.saving_delay_ms, 250);
        assert!(config.accepts_themes);
        assert!(config.permissions.is_empty());
        assert!(!config.embed_permissions);
        assert_eq!(config.reply_timeout_ms, None);
        assert_eq!(config.answered_history, 256);
        assert_eq!(config.untracked_history, 4096);
    }

    #[test]
    fn test_durations() {
        let config = BridgeConfig {
            saving_delay_ms: 100,
            reply_timeout_ms: Some(30_000),
            ..Default::default()
        };
        assert_eq!(config.saving_delay(), Duration::from_millis(100));
        assert_eq!(config.reply_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_load_explicit_file_with_partial_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bridge.yml");
        fs::write(
            &path,
            r#"
log-level: debug
bridge:
  saving-delay-ms: 500
  accepts-themes: false
  permissions:
    - name: stream-context-item
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.bridge.saving_delay_ms, 500);
        assert!(!config.bridge.accepts_themes);
        assert!(config.bridge.coalesced_saving);
        assert_eq!(config.bridge.permissions.len(), 1);
        assert_eq!(config.bridge.permissions[0].name, "stream-context-item");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nope.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_log_level_only() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bridge.yml");
        fs::write(&path, "log-level: TRACE\n").unwrap();
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("TRACE"));
    }

    #[test]
    fn test_save_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("saved.yml");
        let mut config = Config::default();
        config.bridge.reply_timeout_ms = Some(5000);
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.bridge.reply_timeout_ms, Some(5000));
    }
}
