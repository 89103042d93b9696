//! Error types for collectors and their collaborators.

use std::time::Duration;

use thiserror::Error;

/// Errors from an engine metric source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("endpoint is not defined")]
    MissingEndpoint,

    #[error("{0} source requires credentials")]
    MissingCredentials(&'static str),

    #[error("connect to {address} timed out after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    #[error("query timed out after {0:?}")]
    QueryTimeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the host telemetry collaborator.
#[derive(Debug, Error)]
pub enum HostMetricsError {
    #[error("invalid resource id: {0:?}")]
    InvalidResourceId(String),

    #[error("host metrics fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed host metrics sample: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors constructing a collector entry.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("instance {0} has no endpoint")]
    MissingEndpoint(String),

    #[error("failed to start log parser: {0}")]
    LogParser(#[from] fleet_logs::ParserError),
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;
pub type CollectorResult<T> = std::result::Result<T, CollectorError>;
