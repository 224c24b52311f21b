//! Configuration management for the display offload service
//!
//! Settings live in a TOML file. The user copy under [`USER_CONFIG_DIR`]
//! takes precedence over the system copy under [`CONFIG_DIR`]; when neither
//! exists the built-in defaults apply.

mod ids;
mod lock;

pub use ids::{IdConfig, ReservedRange};
pub use lock::LockConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Standard configuration paths
pub const CONFIG_DIR: &str = "/etc/offload";
pub const USER_CONFIG_DIR: &str = "/data/offload";

/// Main offload configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OffloadConfig {
    #[serde(default)]
    pub ids: IdConfig,

    #[serde(default)]
    pub lock: LockConfig,
}

impl OffloadConfig {
    /// Load and validate configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        tracing::debug!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        let user_config = Path::new(USER_CONFIG_DIR).join("config.toml");
        if user_config.exists() {
            return Self::load(&user_config);
        }

        let system_config = Path::new(CONFIG_DIR).join("config.toml");
        if system_config.exists() {
            return Self::load(&system_config);
        }

        tracing::warn!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check value constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ids.validate()?;
        self.lock.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = OffloadConfig::default();
        assert!(config.ids.reserved.is_empty());
        assert_eq!(config.lock.poll_interval_ms, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let config_content = r#"
[ids]
reserved = [
    { start = 1000, end = 1099 },
    { start = 2147418112, end = 2147483647 },
]

[lock]
poll_interval_ms = 250
"#;
        write!(temp_file, "{}", config_content).unwrap();

        let config = OffloadConfig::load(temp_file.path()).unwrap();
        assert_eq!(config.ids.reserved.len(), 2);
        assert!(config.ids.is_reserved(1050));
        assert!(config.ids.is_reserved(i32::MAX));
        assert!(!config.ids.is_reserved(999));
        assert_eq!(config.lock.poll_interval_ms, 250);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "[lock]\npoll_interval_ms = 100\n").unwrap();

        let config = OffloadConfig::load(temp_file.path()).unwrap();
        assert!(config.ids.reserved.is_empty());
        assert_eq!(config.lock.poll_interval_ms, 100);
    }

    #[test]
    fn test_load_missing_file() {
        let err = OffloadConfig::load(Path::new("/nonexistent/offload.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
        assert!(format!("{}", err).contains("not found"));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "[ids]\nreserved = [{{ start = 10, end = 5 }}]\n").unwrap();

        let err = OffloadConfig::load(temp_file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "[ids\nreserved = ").unwrap();

        let err = OffloadConfig::load(temp_file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = OffloadConfig::default();
        config.ids.reserved.push(ReservedRange::new(-10, -1));
        config.lock.poll_interval_ms = 1000;
        config.save(&path).unwrap();

        let loaded = OffloadConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_save_refuses_invalid_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = OffloadConfig::default();
        config.lock.poll_interval_ms = 0;
        assert!(config.save(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Invalid("bad range".to_string());
        assert_eq!(format!("{}", err), "Invalid configuration: bad range");
    }
}
