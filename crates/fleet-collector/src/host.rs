//! Host telemetry collaborator.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::HostMetricsError;

/// Source of the most recent host telemetry sample for a resource.
#[async_trait]
pub trait HostMetricsSource: Send + Sync {
    /// The latest raw sample, or `None` if nothing has been published.
    async fn fetch_latest_sample(&self, resource_id: &str) -> Result<Option<String>, HostMetricsError>;
}

/// Reads newline-delimited JSON samples from `<root>/<resource_id>`.
pub struct DirHostMetrics {
    root: PathBuf,
}

impl DirHostMetrics {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl HostMetricsSource for DirHostMetrics {
    async fn fetch_latest_sample(&self, resource_id: &str) -> Result<Option<String>, HostMetricsError> {
        if resource_id.is_empty() || resource_id.contains(['/', '\\']) || resource_id == ".." {
            return Err(HostMetricsError::InvalidResourceId(resource_id.to_string()));
        }
        let content = match tokio::fs::read_to_string(self.root.join(resource_id)).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(str::to_string))
    }
}
