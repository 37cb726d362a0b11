//! Runtime configuration.
//!
//! Resolution order: defaults → optional JSON file → `BIOAGE_*` environment
//! variables. The result is validated once and then shared behind an `Arc`.
//!
//! | variable                        | field                  | default      |
//! |---------------------------------|------------------------|--------------|
//! | `BIOAGE_QUEUE_NAME`             | `queue_name`           | `ml_tasks`   |
//! | `BIOAGE_WORKER_COUNT`           | `worker_count`         | `1`          |
//! | `BIOAGE_WORKER_ID`              | `worker_id`            | `$HOSTNAME`  |
//! | `BIOAGE_VISIBILITY_TIMEOUT_MS`  | `visibility_timeout_ms`| `30000`      |
//! | `BIOAGE_RECEIVE_TIMEOUT_MS`     | `receive_timeout_ms`   | `1000`       |
//! | `BIOAGE_RECONNECT_BACKOFF_MS`   | `reconnect_backoff_ms` | `3000`       |
//! | `BIOAGE_MODEL_ARTIFACT`         | `model_artifact_path`  | unset        |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub queue_name: String,
    pub worker_count: usize,

    /// Stamped on every task a worker touches.
    pub worker_id: String,

    pub visibility_timeout_ms: u64,
    pub receive_timeout_ms: u64,
    pub reconnect_backoff_ms: u64,

    /// Trained linear model metadata (JSON). The stub predictor is used when
    /// unset or unreadable.
    pub model_artifact_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: '{value}'")]
    InvalidVar { key: &'static str, value: String },

    #[error("{0} must be greater than 0")]
    Zero(&'static str),

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Io { .. } => ErrorKind::Infrastructure,
            _ => ErrorKind::UserInput,
        }
    }
}

fn default_worker_id() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "worker".to_string())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            queue_name: "ml_tasks".to_string(),
            worker_count: 1,
            worker_id: default_worker_id(),
            visibility_timeout_ms: 30_000,
            receive_timeout_ms: 1_000,
            reconnect_backoff_ms: 3_000,
            model_artifact_path: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidVar { key, value })
}

impl AppConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Read a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// File (if any), then environment, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        let config = base.with_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BIOAGE_*` overrides read through `lookup`.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("BIOAGE_QUEUE_NAME") {
            self.queue_name = v;
        }
        if let Some(v) = lookup("BIOAGE_WORKER_COUNT") {
            self.worker_count = parse_var("BIOAGE_WORKER_COUNT", v)?;
        }
        if let Some(v) = lookup("BIOAGE_WORKER_ID") {
            self.worker_id = v;
        }
        if let Some(v) = lookup("BIOAGE_VISIBILITY_TIMEOUT_MS") {
            self.visibility_timeout_ms = parse_var("BIOAGE_VISIBILITY_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("BIOAGE_RECEIVE_TIMEOUT_MS") {
            self.receive_timeout_ms = parse_var("BIOAGE_RECEIVE_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("BIOAGE_RECONNECT_BACKOFF_MS") {
            self.reconnect_backoff_ms = parse_var("BIOAGE_RECONNECT_BACKOFF_MS", v)?;
        }
        if let Some(v) = lookup("BIOAGE_MODEL_ARTIFACT") {
            self.model_artifact_path = (!v.is_empty()).then(|| PathBuf::from(v));
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_name.trim().is_empty() {
            return Err(ConfigError::Empty("queue_name"));
        }
        if self.worker_id.trim().is_empty() {
            return Err(ConfigError::Empty("worker_id"));
        }
        if self.worker_count == 0 {
            return Err(ConfigError::Zero("worker_count"));
        }
        if self.visibility_timeout_ms == 0 {
            return Err(ConfigError::Zero("visibility_timeout_ms"));
        }
        if self.receive_timeout_ms == 0 {
            return Err(ConfigError::Zero("receive_timeout_ms"));
        }
        Ok(())
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.visibility_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.queue_name, "ml_tasks");
        assert_eq!(config.receive_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn env_overrides_defaults() {
        let config = AppConfig::default()
            .with_env_overrides(lookup(&[
                ("BIOAGE_WORKER_COUNT", "4"),
                ("BIOAGE_WORKER_ID", "worker-a"),
                ("BIOAGE_MODEL_ARTIFACT", "/tmp/meta.json"),
            ]))
            .unwrap();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.worker_id, "worker-a");
        assert_eq!(
            config.model_artifact_path,
            Some(PathBuf::from("/tmp/meta.json"))
        );
    }

    #[test]
    fn bad_number_names_the_variable() {
        let err = AppConfig::default()
            .with_env_overrides(lookup(&[("BIOAGE_WORKER_COUNT", "many")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidVar { key: "BIOAGE_WORKER_COUNT", .. }
        ));
    }

    #[test]
    fn zero_workers_are_rejected() {
        let config = AppConfig {
            worker_count: 0,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Zero("worker_count"))));
    }

    #[test]
    fn json_file_fills_missing_fields_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"queue_name": "scoring", "worker_count": 3}}"#).unwrap();

        let config = AppConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.queue_name, "scoring");
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.visibility_timeout_ms, 30_000);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AppConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }
}
