//! Configuration management using Figment
//!
//! Configuration is loaded from the following sources, highest precedence first:
//! 1. Environment variables (prefix: `EASY_REPOSITORY_`, nesting with `__`,
//!    e.g. `EASY_REPOSITORY_DATABASE__URL`)
//! 2. The TOML configuration file
//! 3. Default values

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::unit_of_work::ServiceLifetime;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
    #[serde(default = "default_connect_timeout", with = "duration_serde::duration")]
    pub connect_timeout: Duration,
    #[serde(default = "default_idle_timeout", with = "duration_serde::duration")]
    pub idle_timeout: Duration,
    /// Route sqlx statement logging through tracing at debug level
    #[serde(default = "default_sqlx_logging")]
    pub sqlx_logging: bool,
}

/// How units of work are handed out by the factory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub service_lifetime: ServiceLifetime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)
}

fn default_sqlx_logging() -> bool {
    DEFAULT_SQLX_LOGGING
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: Some(DEFAULT_MAX_CONNECTIONS),
            connect_timeout: default_connect_timeout(),
            idle_timeout: default_idle_timeout(),
            sqlx_logging: default_sqlx_logging(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl DatabaseConfig {
    /// Configuration for a URL with every other option defaulted
    pub fn for_url<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Config {
    /// Load configuration from the file named by `CONFIG_FILE` (or `config.toml`)
    pub fn load() -> AppResult<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&config_file)
    }

    /// Load configuration from a specific file, layered over defaults and
    /// under environment overrides. A missing file is not an error.
    pub fn load_from(config_file: &str) -> AppResult<Self> {
        if Path::new(config_file).exists() {
            info!("Loading configuration from: {}", config_file);
        }

        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Write the default configuration to `config_file` unless it already exists
    pub fn write_default(config_file: &str) -> AppResult<bool> {
        if Path::new(config_file).exists() {
            return Ok(false);
        }

        let contents = toml::to_string_pretty(&Self::default())
            .map_err(|e| AppError::configuration(e.to_string()))?;
        std::fs::write(config_file, contents)
            .map_err(|e| AppError::configuration(format!("{config_file}: {e}")))?;
        info!("Created default config file: {}", config_file);
        Ok(true)
    }
}
