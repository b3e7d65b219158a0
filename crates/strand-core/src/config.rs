//! Queue configuration: TOML file + environment overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::ShutdownMode;
use crate::domain::{KeyError, NamespaceKey};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Key used when a submission carries no group id.
    pub default_group_id: String,

    /// Backpressure cap per lane (running task included). `None` = unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pending_per_lane: Option<usize>,

    /// Drop a lane from the registry as soon as it drains.
    pub retire_idle_lanes: bool,

    pub shutdown_deadline_secs: u64,
    pub shutdown_mode: ShutdownMode,

    /// Global cap on concurrent apply calls across keys.
    pub semaphore_limit: usize,

    pub use_custom_entities: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_group_id: "default".to_string(),
            max_pending_per_lane: None,
            retire_idle_lanes: true,
            shutdown_deadline_secs: 30,
            shutdown_mode: ShutdownMode::Drain,
            semaphore_limit: 10,
            use_custom_entities: false,
        }
    }
}

impl QueueConfig {
    /// Read a TOML file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Defaults with the process environment applied on top.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup` (the environment, or a map in tests).
    pub fn apply_env_with(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup("DEFAULT_GROUP_ID") {
            self.default_group_id = value;
        }
        if let Some(value) = parse_var(&lookup, "MAX_PENDING_PER_LANE")? {
            self.max_pending_per_lane = Some(value);
        }
        if let Some(value) = parse_var(&lookup, "RETIRE_IDLE_LANES")? {
            self.retire_idle_lanes = value;
        }
        if let Some(value) = parse_var(&lookup, "SHUTDOWN_DEADLINE_SECS")? {
            self.shutdown_deadline_secs = value;
        }
        if let Some(value) = parse_var(&lookup, "SHUTDOWN_MODE")? {
            self.shutdown_mode = value;
        }
        if let Some(value) = parse_var(&lookup, "SEMAPHORE_LIMIT")? {
            self.semaphore_limit = value;
        }
        if let Some(value) = parse_var(&lookup, "USE_CUSTOM_ENTITIES")? {
            self.use_custom_entities = value;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        NamespaceKey::parse(self.default_group_id.as_str()).map_err(|e: KeyError| {
            ConfigError::Invalid(format!("default_group_id: {e}"))
        })?;
        if self.max_pending_per_lane == Some(0) {
            return Err(ConfigError::Invalid(
                "max_pending_per_lane must be at least 1".to_string(),
            ));
        }
        if self.semaphore_limit == 0 {
            return Err(ConfigError::Invalid(
                "semaphore_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve an optional group id, falling back to `default_group_id`.
    pub fn key_for(&self, group_id: Option<&str>) -> Result<NamespaceKey, KeyError> {
        match group_id {
            Some(group) if !group.trim().is_empty() => NamespaceKey::parse(group),
            _ => NamespaceKey::parse(self.default_group_id.as_str()),
        }
    }

    pub fn shutdown_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.shutdown_deadline_secs)
    }
}

fn parse_var<V: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<V>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value }),
    }
}
