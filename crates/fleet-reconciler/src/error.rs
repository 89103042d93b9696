//! Discovery errors. Any of these aborts the current reconciliation
//! cycle; tracked state is left as it was.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery API error: {0}")]
    Api(String),

    #[error("discovery call timed out after {0:?}")]
    Timeout(Duration),

    #[error("pagination marker {0:?} was returned twice")]
    PaginationLoop(String),

    #[error("unknown instance: {0}")]
    UnknownInstance(String),

    #[error("failed to read inventory: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse inventory: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;
