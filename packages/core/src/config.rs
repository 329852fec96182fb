//! Store configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Environment variable overriding [`TreeConfig::database_path`]
pub const ENV_DB_PATH: &str = "TREEPERM_DB_PATH";
/// Environment variable overriding [`TreeConfig::busy_timeout_ms`]
pub const ENV_BUSY_TIMEOUT_MS: &str = "TREEPERM_BUSY_TIMEOUT_MS";
/// Environment variable overriding [`TreeConfig::wal`]
pub const ENV_WAL: &str = "TREEPERM_WAL";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Database path must not be empty")]
    EmptyDatabasePath,

    #[error("Busy timeout must be greater than zero")]
    ZeroBusyTimeout,

    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnvValue { var: &'static str, value: String },
}

/// Configuration for opening the tree store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// How long a writer waits for the store's write lock before failing
    pub busy_timeout_ms: u64,

    /// Enable write-ahead logging
    pub wal: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        let database_path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".treeperm")
            .join("database")
            .join("treeperm.db");

        Self {
            database_path,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            wal: true,
        }
    }
}

impl TreeConfig {
    /// Configuration for a database file, other settings at their defaults
    pub fn for_path(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Self::default()
        }
    }

    /// Build from defaults overridden by `TREEPERM_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DB_PATH) {
            config.database_path = PathBuf::from(path);
        }

        if let Some(value) = lookup(ENV_BUSY_TIMEOUT_MS) {
            config.busy_timeout_ms =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnvValue {
                        var: ENV_BUSY_TIMEOUT_MS,
                        value: value.clone(),
                    })?;
        }

        if let Some(value) = lookup(ENV_WAL) {
            config.wal = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnvValue {
                        var: ENV_WAL,
                        value,
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::ZeroBusyTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = TreeConfig::default();
        assert!(config.database_path.ends_with(".treeperm/database/treeperm.db"));
        assert_eq!(config.busy_timeout_ms, 5000);
        assert!(config.wal);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = TreeConfig::from_lookup(lookup_from(&[
            (ENV_DB_PATH, "/tmp/tree.db"),
            (ENV_BUSY_TIMEOUT_MS, "250"),
            (ENV_WAL, "off"),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/tree.db"));
        assert_eq!(config.busy_timeout_ms, 250);
        assert!(!config.wal);
    }

    #[test]
    fn test_invalid_env_values() {
        let err = TreeConfig::from_lookup(lookup_from(&[(ENV_BUSY_TIMEOUT_MS, "soon")]));
        assert!(matches!(
            err,
            Err(ConfigError::InvalidEnvValue {
                var: ENV_BUSY_TIMEOUT_MS,
                ..
            })
        ));

        let err = TreeConfig::from_lookup(lookup_from(&[(ENV_BUSY_TIMEOUT_MS, "0")]));
        assert_eq!(err, Err(ConfigError::ZeroBusyTimeout));

        let err = TreeConfig::from_lookup(lookup_from(&[(ENV_WAL, "maybe")]));
        assert!(err.is_err());
    }

    #[test]
    fn test_empty_path_rejected() {
        let config = TreeConfig::for_path("");
        assert_eq!(config.validate(), Err(ConfigError::EmptyDatabasePath));
    }
}
