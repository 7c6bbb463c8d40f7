//! Valet Configuration Module
//!
//! Global configuration lives in `~/.config/valet/global.yaml` (or the file
//! named by `$VALET_CONFIG`). Its `env:` map provides default values for
//! environment variables used by `env:` value expressions, secret entries
//! and helm `set` overrides.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Process environment variables (non-empty)
//! 2. Global config `env:` map
//!
//! The process environment is never modified: [`EnvConfig`] is an immutable
//! snapshot built once at startup and threaded through the run context.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValetError};

/// Environment variable that overrides the global config path
pub const CONFIG_PATH_ENV: &str = "VALET_CONFIG";

/// Global configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default environment variable values
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl GlobalConfig {
    /// Get the config directory path
    ///
    /// Returns `~/.config/valet/` on Unix, `%APPDATA%/valet/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("valet")
    }

    /// Get the config file path, honoring `$VALET_CONFIG`
    pub fn config_path() -> PathBuf {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => Self::config_dir().join("global.yaml"),
        }
    }

    /// Load configuration from the default path
    ///
    /// Returns default config if file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file
    ///
    /// Returns default config if file doesn't exist.
    /// Returns error if file exists but is malformed.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ValetError::ConfigError {
            reason: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        serde_yaml::from_str(&content).map_err(|e| ValetError::ConfigError {
            reason: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }
}

/// Immutable view of the environment for a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    vars: BTreeMap<String, String>,
}

impl EnvConfig {
    /// Snapshot the process environment layered over the global defaults
    pub fn from_process(global: &GlobalConfig) -> Self {
        Self::layered(global, std::env::vars())
    }

    /// Build from explicit variables layered over the global defaults
    pub fn layered<I>(global: &GlobalConfig, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut merged = global.env.clone();
        for (key, value) in vars {
            if !value.is_empty() {
                merged.insert(key, value);
            }
        }
        Self { vars: merged }
    }

    /// Build from exactly these variables
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Non-empty value for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Like [`EnvConfig::get`] but fails with `MissingEnvVar`
    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name).ok_or_else(|| ValetError::MissingEnvVar {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_dir_contains_valet() {
        let dir = GlobalConfig::config_dir();
        assert!(dir.to_string_lossy().contains("valet"));
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let temp = TempDir::new().unwrap();
        let config = GlobalConfig::load_from(&temp.path().join("nope.yaml")).unwrap();
        assert_eq!(config, GlobalConfig::default());
    }

    #[test]
    fn test_load_env_map() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("global.yaml");
        fs::write(&path, "env:\n  LICENSE_KEY: abc\n  GCLOUD_PROJECT: proj\n").unwrap();

        let config = GlobalConfig::load_from(&path).unwrap();
        assert_eq!(config.env.get("LICENSE_KEY").map(String::as_str), Some("abc"));
        assert_eq!(config.env.len(), 2);
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("global.yaml");
        fs::write(&path, "unknown: [").unwrap();

        let err = GlobalConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ValetError::ConfigError { .. }));
    }

    #[test]
    fn test_process_env_wins_over_global() {
        let global = GlobalConfig {
            env: BTreeMap::from([
                ("LICENSE_KEY".to_string(), "from-config".to_string()),
                ("ONLY_CONFIG".to_string(), "config".to_string()),
            ]),
        };
        let env = EnvConfig::layered(
            &global,
            vec![
                ("LICENSE_KEY".to_string(), "from-env".to_string()),
                ("ONLY_CONFIG".to_string(), String::new()),
            ],
        );
        assert_eq!(env.get("LICENSE_KEY"), Some("from-env"));
        // empty process values do not shadow config defaults
        assert_eq!(env.get("ONLY_CONFIG"), Some("config"));
    }

    #[test]
    fn test_require_missing() {
        let env = EnvConfig::from_vars([("A", "")]);
        let err = env.require("A").unwrap_err();
        assert!(matches!(err, ValetError::MissingEnvVar { name } if name == "A"));
    }
}
