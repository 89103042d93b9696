//! The log-source collaborator contract.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// A log file as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub name: String,
    /// Remote last-written timestamp (ms since epoch). Non-decreasing per file.
    pub last_written: i64,
}

impl LogFile {
    pub fn new(name: impl Into<String>, last_written: i64) -> Self {
        Self {
            name: name.into(),
            last_written,
        }
    }
}

/// Where a download starts. Exactly one of the two per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadFrom {
    /// Continue after a marker from a previous download of the same file.
    Marker(String),
    /// Only the last N lines (used to obtain a marker).
    Tail(u32),
}

/// The text returned by a download and the marker to continue from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPortion {
    pub data: String,
    pub marker: String,
}

#[derive(Debug, Error)]
pub enum LogSourceError {
    #[error("log API error: {0}")]
    Api(String),

    #[error("log file not found: {0}")]
    NotFound(String),

    #[error("invalid log file name: {0:?}")]
    InvalidFileName(String),

    #[error("invalid marker: {0:?}")]
    InvalidMarker(String),

    #[error("log API call timed out after {0:?}")]
    Timeout(Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote, REST-style access to an instance's log files.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn list_log_files(&self, instance_id: &str) -> Result<Vec<LogFile>, LogSourceError>;

    async fn download_portion(
        &self,
        instance_id: &str,
        file_name: &str,
        from: ReadFrom,
    ) -> Result<LogPortion, LogSourceError>;
}
