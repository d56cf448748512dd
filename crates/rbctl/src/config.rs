use anyhow::{Context, Result};
use relaybridge::BridgeConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::{to_pretty_json, Report};

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Timeouts and limits handed to the bridge
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Log filter used when RUST_LOG is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Path to the config file
    #[serde(skip)]
    pub path: PathBuf,
}

fn default_log_filter() -> String {
    "relaybridge=info,rbctl=info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            log_filter: default_log_filter(),
            path: PathBuf::new(),
        }
    }
}

impl Report for Config {
    fn human(&self) -> String {
        format!("# {}\n{}", self.path.display(), to_pretty_json(self))
    }
}

impl Config {
    pub fn path_in(data_dir: &Path) -> PathBuf {
        data_dir.join("config.json")
    }

    /// Load config from the data directory
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_path = Self::path_in(data_dir);

        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                serde_json::from_str(&content).context("Failed to parse config file")?;
            config.path = config_path;
            Ok(config)
        } else {
            Ok(Config {
                path: config_path,
                ..Default::default()
            })
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&self.path, content).context("Failed to write config file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.bridge, BridgeConfig::default());
        assert!(config.log_filter.contains("relaybridge"));
    }

    #[test]
    fn test_config_load_nonexistent() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.path, temp.path().join("config.json"));
        assert_eq!(config.bridge.lock_timeout_ms, 30_000);
    }

    #[test]
    fn test_config_save_and_load() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::load(temp.path()).unwrap();
        config.bridge.echo_ttl_ms = 5_000;
        config.log_filter = "debug".to_string();
        config.save().unwrap();

        let loaded = Config::load(temp.path()).unwrap();
        assert_eq!(loaded.bridge.echo_ttl_ms, 5_000);
        assert_eq!(loaded.bridge.lock_timeout_ms, 30_000);
        assert_eq!(loaded.log_filter, "debug");
    }

    #[test]
    fn test_config_partial_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("config.json"),
            r#"{ "bridge": { "maxUploadBytes": 100 } }"#,
        )
        .unwrap();

        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.bridge.max_upload_bytes, 100);
        assert_eq!(config.bridge.edit_prefix, "**EDIT:** ");
        assert_eq!(config.log_filter, default_log_filter());
    }

    #[test]
    fn test_config_invalid_json() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.json"), "{ nope").unwrap();
        let err = Config::load(temp.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
