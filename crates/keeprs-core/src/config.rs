//! Configuration file handling.
//!
//! Reads from `~/.config/keeprs/core.toml`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Behaviour switches for the vault core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Whether searches start out case-sensitive.
    #[serde(default)]
    pub search_case_sensitive: bool,
    /// Expanding or collapsing a group does not count as a modification.
    #[serde(default)]
    pub ignore_group_expansion: bool,
    /// Maximum number of history snapshots kept per entry.
    #[serde(default = "default_history_max_items")]
    pub history_max_items: usize,
}

fn default_history_max_items() -> usize {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_case_sensitive: false,
            ignore_group_expansion: false,
            history_max_items: default_history_max_items(),
        }
    }
}

impl Config {
    /// Load configuration from the config file.
    ///
    /// If `custom_path` is provided, load from that path.
    /// Otherwise, load from the default XDG config location.
    /// Creates a default config file if it doesn't exist (only for default path).
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self> {
        let is_custom = custom_path.is_some();
        let config_path = match custom_path {
            Some(path) => path,
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            if is_custom {
                anyhow::bail!("Config file not found: {}", config_path.display());
            }
            let config = Config::default();
            config.save_to(&config_path)?;
            tracing::info!("Created default config: {:?}", config);
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::info!("Loaded config from {}: {:?}", config_path.display(), config);
        Ok(config)
    }

    /// Parse configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid configuration")
    }

    /// Save configuration to the default config file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Get the path to the config file.
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("keeprs").join("core.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config = Config::from_toml_str("search_case_sensitive = true").unwrap();
        assert!(config.search_case_sensitive);
        assert!(!config.ignore_group_expansion);
        assert_eq!(config.history_max_items, 10);
    }

    #[test]
    fn custom_path_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("core.toml");
        let config = Config {
            search_case_sensitive: true,
            ignore_group_expansion: true,
            history_max_items: 3,
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load(Some(path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_custom_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.toml");
        std::fs::write(&path, "history_max_items = \"many\"").unwrap();
        let err = Config::load(Some(path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
