//! Configuration error types.

use thiserror::Error;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that abort the agent at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("region is required (config `region`, --region or AWS_REGION)")]
    MissingRegion,

    #[error("invalid duration for `{key}`: {value:?}")]
    InvalidDuration { key: String, value: String },

    #[error("invalid filter for tag `{tag}`: {pattern:?}: {reason}")]
    InvalidFilter {
        tag: String,
        pattern: String,
        reason: String,
    },

    #[error("{0} family is enabled but no database user is configured")]
    MissingCredentials(&'static str),

    #[error("{0} family is enabled but no inventory is configured")]
    MissingInventory(&'static str),

    #[error("invalid listen address: {0}")]
    InvalidListenAddress(String),
}
