use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Error
// ─────────────────────────────────────────────────────────────────────────────

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

pub const ENV_DATABASE_PATH: &str = "TRACELENS_DATABASE_PATH";
pub const ENV_BIND_ADDR: &str = "TRACELENS_BIND_ADDR";
pub const ENV_REPLAY_TIMEOUT_SECS: &str = "TRACELENS_REPLAY_TIMEOUT_SECS";
pub const ENV_LOG_FILTER: &str = "TRACELENS_LOG";
pub const ENV_AUTO_CLASSIFY_BATCH: &str = "TRACELENS_AUTO_CLASSIFY_BATCH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite database file.
    pub database_path: PathBuf,
    pub bind_addr: String,
    /// Default replay time limit when a request gives none.
    pub replay_timeout_secs: u64,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Failed traces classified per batch run. Zero disables the batch job.
    pub auto_classify_batch: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/tracelens.db"),
            bind_addr: "0.0.0.0:8000".to_string(),
            replay_timeout_secs: 300,
            log_filter: "info".to_string(),
            auto_classify_batch: 0,
        }
    }
}

impl Settings {
    /// Defaults overridden by `TRACELENS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            settings.database_path = PathBuf::from(path);
        }
        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            settings.bind_addr = addr;
        }
        if let Some(raw) = lookup(ENV_REPLAY_TIMEOUT_SECS) {
            settings.replay_timeout_secs = parse_number(ENV_REPLAY_TIMEOUT_SECS, &raw)?;
        }
        if let Some(filter) = lookup(ENV_LOG_FILTER) {
            settings.log_filter = filter;
        }
        if let Some(raw) = lookup(ENV_AUTO_CLASSIFY_BATCH) {
            settings.auto_classify_batch = parse_number(ENV_AUTO_CLASSIFY_BATCH, &raw)?;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Reads settings from a JSON file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database_path is empty".into()));
        }
        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("bind_addr is empty".into()));
        }
        if self.replay_timeout_secs == 0 {
            return Err(ConfigError::Invalid("replay_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn replay_timeout(&self) -> Duration {
        Duration::from_secs(self.replay_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.replay_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_env_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            (ENV_DATABASE_PATH, "/tmp/t.db"),
            (ENV_REPLAY_TIMEOUT_SECS, "30"),
            (ENV_AUTO_CLASSIFY_BATCH, "25"),
        ]))
        .unwrap();
        assert_eq!(settings.database_path, PathBuf::from("/tmp/t.db"));
        assert_eq!(settings.replay_timeout_secs, 30);
        assert_eq!(settings.auto_classify_batch, 25);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = Settings::from_lookup(lookup(&[(ENV_REPLAY_TIMEOUT_SECS, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = Settings::from_lookup(lookup(&[(ENV_REPLAY_TIMEOUT_SECS, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_partial_json() {
        let settings: Settings = serde_json::from_str(r#"{"bind_addr": "127.0.0.1:9000"}"#).unwrap();
        assert_eq!(settings.bind_addr, "127.0.0.1:9000");
        assert_eq!(settings.log_filter, "info");
    }
}
