//! Configuration file model for the catsync collector.
//!
//! The collector reads a YAML file (`config.yml` by default):
//!
//! ```yaml
//! version: v1
//! service_host: https://catalog.example.com
//! business_service: retail
//! db_type: sqlite
//! connection_string: sqlite://catalog.db
//! user: collector
//! password: secret
//! country: de
//! lang: en
//! log_path: collector.log
//! ```

use catsync_sync::SyncConfig;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

const SUPPORTED_DB_TYPE: &str = "sqlite";
const SUPPORTED_PAYLOAD_MODE: &str = "stream";
const SUPPORTED_MODE: &str = "resourceCollector";

/// Errors raised while loading or validating the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("no version defined")]
    MissingVersion,

    #[error("unsupported config version `{0}`")]
    UnsupportedVersion(String),

    #[error("`{0}` must be set")]
    Missing(&'static str),

    #[error("unsupported {field} `{value}`, expected `{expected}`")]
    Unsupported {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// `version` may be written as `1`, `"1"` or `"v1"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ConfigVersion {
    Number(u64),
    Text(String),
}

impl ConfigVersion {
    /// The API version this file version selects.
    pub fn api_version(&self) -> Result<u32, ConfigError> {
        let parsed = match self {
            ConfigVersion::Number(n) => u32::try_from(*n).ok(),
            ConfigVersion::Text(s) => {
                let s = s.trim();
                s.strip_prefix('v').unwrap_or(s).parse::<u32>().ok()
            }
        };
        match parsed {
            Some(v @ (1 | 2)) => Ok(v),
            _ => Err(ConfigError::UnsupportedVersion(self.to_string())),
        }
    }
}

impl fmt::Display for ConfigVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigVersion::Number(n) => write!(f, "{n}"),
            ConfigVersion::Text(s) => f.write_str(s),
        }
    }
}

fn default_payload_mode() -> String {
    SUPPORTED_PAYLOAD_MODE.to_string()
}

fn default_mode() -> String {
    SUPPORTED_MODE.to_string()
}

/// The collector configuration file.
///
/// Unknown keys are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    pub version: Option<ConfigVersion>,
    #[serde(default)]
    pub service_host: String,
    #[serde(default)]
    pub business_service: String,
    #[serde(default)]
    pub db_type: String,
    #[serde(default = "default_payload_mode")]
    pub payload_mode: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub connection_string: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

impl CollectorConfig {
    /// Reads, parses and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parses and validates YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_version()?;

        let required = [
            ("service_host", &self.service_host),
            ("business_service", &self.business_service),
            ("db_type", &self.db_type),
            ("connection_string", &self.connection_string),
            ("country", &self.country),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(field));
            }
        }

        let fixed = [
            ("db_type", &self.db_type, SUPPORTED_DB_TYPE),
            ("payload_mode", &self.payload_mode, SUPPORTED_PAYLOAD_MODE),
            ("mode", &self.mode, SUPPORTED_MODE),
        ];
        for (field, value, expected) in fixed {
            if value.trim() != expected {
                return Err(ConfigError::Unsupported {
                    field,
                    value: value.clone(),
                    expected,
                });
            }
        }
        Ok(())
    }

    pub fn api_version(&self) -> Result<u32, ConfigError> {
        self.version
            .as_ref()
            .ok_or(ConfigError::MissingVersion)?
            .api_version()
    }

    /// Engine configuration; timeouts and batch size keep their defaults.
    pub fn to_sync_config(&self) -> Result<SyncConfig, ConfigError> {
        Ok(SyncConfig {
            service_host: self.service_host.trim().to_string(),
            business_service: self.business_service.trim().to_string(),
            api_version: self.api_version()?,
            user: self.user.clone(),
            password: self.password.clone(),
            country: self.country.trim().to_string(),
            lang: self
                .lang
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
            ..SyncConfig::default()
        })
    }
}
