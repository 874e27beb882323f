//! Service configuration, read from environment variables.

use dropshot::ConfigLoggingLevel;
use std::net::SocketAddr;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_DATABASE_URL: &str =
    "postgresql://root@127.0.0.1:26257/defaultdb?sslmode=disable";
const DEFAULT_POOL_SIZE: u32 = 4;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: {message}")]
    Invalid { var: &'static str, message: String },
}

impl ConfigError {
    fn invalid(var: &'static str, message: impl Into<String>) -> ConfigError {
        ConfigError::Invalid { var, message: message.into() }
    }
}

/// Where the counter lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageConfig {
    Memory,
    Postgres { url: String, pool_size: u32 },
}

#[derive(Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: ConfigLoggingLevel,
    pub cors_origins: Vec<String>,
    pub storage: StorageConfig,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the config from `lookup`, treating empty values as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_address = get("COUNTER_BIND_ADDRESS")
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string())
            .parse()
            .map_err(|error| {
                ConfigError::invalid(
                    "COUNTER_BIND_ADDRESS",
                    format!("bad socket address: {}", error),
                )
            })?;

        let log_level = parse_log_level(
            &get("COUNTER_LOG_LEVEL").unwrap_or_else(|| String::from("info")),
        )?;

        let cors_origins: Vec<String> = get("CORS_ORIGIN")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();
        if cors_origins.is_empty() {
            return Err(ConfigError::invalid("CORS_ORIGIN", "no origins listed"));
        }

        let storage_kind =
            get("COUNTER_STORAGE").map(|kind| kind.to_ascii_lowercase());
        let storage = match storage_kind.as_deref() {
            None | Some("memory") => StorageConfig::Memory,
            Some("postgres") => {
                let url = get("DATABASE_URL")
                    .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
                let pool_size = match get("COUNTER_DB_POOL_SIZE") {
                    None => DEFAULT_POOL_SIZE,
                    Some(raw) => raw
                        .parse::<u32>()
                        .ok()
                        .filter(|size| *size > 0)
                        .ok_or_else(|| {
                            ConfigError::invalid(
                                "COUNTER_DB_POOL_SIZE",
                                format!("expected a positive integer, got {:?}", raw),
                            )
                        })?,
                };
                StorageConfig::Postgres { url, pool_size }
            }
            Some(other) => {
                return Err(ConfigError::invalid(
                    "COUNTER_STORAGE",
                    format!("expected \"memory\" or \"postgres\", got {:?}", other),
                ))
            }
        };

        Ok(Config { bind_address, log_level, cors_origins, storage })
    }
}

fn parse_log_level(raw: &str) -> Result<ConfigLoggingLevel, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "trace" => Ok(ConfigLoggingLevel::Trace),
        "debug" => Ok(ConfigLoggingLevel::Debug),
        "info" => Ok(ConfigLoggingLevel::Info),
        "warn" => Ok(ConfigLoggingLevel::Warn),
        "error" => Ok(ConfigLoggingLevel::Error),
        "critical" => Ok(ConfigLoggingLevel::Critical),
        other => Err(ConfigError::invalid(
            "COUNTER_LOG_LEVEL",
            format!("unknown level {:?}", other),
        )),
    }
}
