//! Configuration management for guidelink

mod equipment;
mod guider;
pub mod serde_utils;

pub use equipment::EquipmentConfig;
pub use guider::{GuiderConfig, ProfileConfig, RetryConfig};

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Guider connection settings
    pub guider: GuiderConfig,
    /// Profile file settings
    pub profile: ProfileConfig,
    /// Local equipment lists
    pub equipment: EquipmentConfig,
}

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("guidelink")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Load configuration, falling back to defaults when the file is absent
pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
    match load_config(path) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(_)) => {
            tracing::debug!("No config at {:?}, using defaults", path);
            Ok(Config::default())
        }
        Err(e) => Err(e),
    }
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result: Result<Config, _> = load_config(&dir.path().join("none.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = TempDir::new().unwrap();
        let config = load_or_default(&dir.path().join("none.toml")).unwrap();
        assert_eq!(config.guider.base_port, 4400);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.guider.host = "observatory.local".to_string();
        config.guider.instance = 2;
        config.guider.retry.delay = Duration::from_millis(250);
        save_config(&path, &config).unwrap();

        let loaded: Config = load_config(&path).unwrap();
        assert_eq!(loaded.guider.host, "observatory.local");
        assert_eq!(loaded.guider.port(), 4401);
        assert_eq!(loaded.guider.retry.delay, Duration::from_millis(250));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[guider]\nhost = \"scope-pi\"\n").unwrap();

        let loaded: Config = load_config(&path).unwrap();
        assert_eq!(loaded.guider.host, "scope-pi");
        assert_eq!(loaded.guider.retry.max_attempts, 3);
    }
}
