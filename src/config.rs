//! Session configuration, read from a TOML file.
//!
//! ```toml
//! data_dir = "/var/lib/teamboard"
//! display_name = "Priya"
//!
//! [remote]
//! base_url = "https://db.example.com/v1"
//! token = "..."
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::RemoteError;

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "TEAMBOARD_DATA_DIR";
/// Environment variable overriding the remote base URL
pub const REMOTE_URL_ENV: &str = "TEAMBOARD_REMOTE_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Data directory not found")]
    DataDirNotFound,
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Where local snapshots live; defaults to the platform data dir
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Creator name used until one is set with `user set`
    #[serde(default)]
    pub display_name: Option<String>,
    /// Without a remote section the board works from local snapshots only
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl DashboardConfig {
    /// Read a config file. A missing file yields the default config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("Config: {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(DATA_DIR_ENV).ok(),
            std::env::var(REMOTE_URL_ENV).ok(),
        );
    }

    /// Replace the data dir and remote URL when values are given. A remote
    /// URL without a `[remote]` section creates one with no token.
    pub fn apply_overrides(&mut self, data_dir: Option<String>, remote_url: Option<String>) {
        if let Some(dir) = data_dir.filter(|d| !d.trim().is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = remote_url.filter(|u| !u.trim().is_empty()) {
            match &mut self.remote {
                Some(remote) => remote.base_url = url,
                None => {
                    self.remote = Some(RemoteConfig {
                        base_url: url,
                        token: None,
                    })
                }
            }
        }
    }

    /// Resolved data directory
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }

    /// `<config dir>/teamboard/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join("teamboard").join("config.toml"))
            .ok_or(ConfigError::DataDirNotFound)
    }
}

/// Get the default data directory
pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::data_local_dir()
        .map(|p| p.join("teamboard"))
        .ok_or(ConfigError::DataDirNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let config = DashboardConfig::from_toml_str(
            r#"
            data_dir = "/tmp/board"
            display_name = "Sam"

            [remote]
            base_url = "https://db.example.com/v1"
            token = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/board"));
        assert_eq!(config.display_name.as_deref(), Some("Sam"));
        let remote = config.remote.unwrap();
        assert_eq!(remote.base_url, "https://db.example.com/v1");
        assert_eq!(remote.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_empty_config_is_local_only() {
        let config = DashboardConfig::from_toml_str("").unwrap();
        assert_eq!(config, DashboardConfig::default());
        assert!(config.remote.is_none());
    }

    #[test]
    fn test_invalid_toml() {
        let result = DashboardConfig::from_toml_str("[remote]\nbase_url = 5");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_missing_file_yields_default() {
        let temp = TempDir::new().unwrap();
        let config = DashboardConfig::load(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config, DashboardConfig::default());
    }

    #[test]
    fn test_overrides() {
        let mut config = DashboardConfig::default();
        config.apply_overrides(Some("/srv/board".to_string()), Some("http://localhost:8080".to_string()));
        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/board")));
        assert_eq!(config.remote.as_ref().unwrap().base_url, "http://localhost:8080");

        config.apply_overrides(None, Some(String::new()));
        assert_eq!(config.remote.unwrap().base_url, "http://localhost:8080");
    }
}
