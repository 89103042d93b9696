//! Engine metric sources.
//!
//! Every supported engine maps to exactly one [`MetricSource`] variant
//! through [`constructor_for`]. Unsupported engines map to no source, in
//! which case the owning collector exports identity and status only.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use fleet_core::{Credentials, EngineKind, ResourceDescriptor};
use fleet_metrics::Metric;

use crate::error::{SourceError, SourceResult};
use crate::memcached::MemcachedSource;
use crate::postgres::PostgresSource;
use crate::redis::RedisSource;

/// Engine-level metrics for one instance endpoint.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Never fails: an unreachable engine reports itself down.
    async fn collect(&self) -> Vec<Metric>;

    /// Release connections. Idempotent.
    async fn close(&self) -> SourceResult<()>;
}

/// Connection settings shared by the sources of one family.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub credentials: Option<Credentials>,
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
    /// Minimum time between checks for sources that cache results.
    pub scrape_interval: Duration,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            credentials: None,
            connect_timeout: Duration::from_secs(1),
            query_timeout: Duration::from_secs(30),
            scrape_interval: Duration::from_secs(30),
        }
    }
}

pub type SourceConstructor = fn(&ResourceDescriptor, &SourceSettings) -> SourceResult<Box<dyn MetricSource>>;

/// The constructor for an engine kind, if it has a source at all.
pub fn constructor_for(kind: EngineKind) -> Option<SourceConstructor> {
    match kind {
        EngineKind::RelationalDb => Some(PostgresSource::boxed as SourceConstructor),
        EngineKind::KeyValueCache => Some(RedisSource::boxed as SourceConstructor),
        EngineKind::DocumentCache => Some(MemcachedSource::boxed as SourceConstructor),
        EngineKind::Unsupported => None,
    }
}

/// Builds the metric source for a descriptor.
///
/// A factory never fails: construction errors are logged and yield no
/// source, leaving the collector tracked with identity metrics only.
pub trait MetricSourceFactory: Send + Sync {
    fn build(&self, descriptor: &ResourceDescriptor) -> Option<Box<dyn MetricSource>>;
}

/// Factory dispatching on the descriptor's engine.
pub struct EngineSourceFactory {
    settings: SourceSettings,
}

impl EngineSourceFactory {
    pub fn new(settings: SourceSettings) -> Self {
        Self { settings }
    }
}

impl MetricSourceFactory for EngineSourceFactory {
    fn build(&self, descriptor: &ResourceDescriptor) -> Option<Box<dyn MetricSource>> {
        let kind = descriptor.engine_kind();
        let Some(construct) = constructor_for(kind) else {
            debug!(engine = %descriptor.engine, "no metric source for engine");
            return None;
        };
        match construct(descriptor, &self.settings) {
            Ok(source) => {
                info!(%kind, endpoint = %descriptor.endpoint, "started metric source");
                Some(source)
            }
            Err(e) => {
                warn!(%kind, endpoint = %descriptor.endpoint, error = %e, "failed to init metric source");
                None
            }
        }
    }
}

/// Connect to `address`, bounded by `timeout`.
pub(crate) async fn connect(address: &str, timeout: Duration) -> SourceResult<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(stream) => Ok(stream?),
        Err(_) => Err(SourceError::ConnectTimeout {
            address: address.to_string(),
            timeout,
        }),
    }
}

/// Metric name from an engine-reported field, with anything outside
/// `[a-zA-Z0-9_]` replaced by `_`.
pub(crate) fn metric_name(prefix: &str, field: &str) -> String {
    let mut name = String::with_capacity(prefix.len() + 1 + field.len());
    name.push_str(prefix);
    name.push('_');
    name.extend(
        field
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }),
    );
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::Endpoint;

    #[test]
    fn mapping_is_total_over_engine_kinds() {
        assert!(constructor_for(EngineKind::RelationalDb).is_some());
        assert!(constructor_for(EngineKind::KeyValueCache).is_some());
        assert!(constructor_for(EngineKind::DocumentCache).is_some());
        assert!(constructor_for(EngineKind::Unsupported).is_none());
    }

    #[test]
    fn unsupported_engine_builds_nothing() {
        let factory = EngineSourceFactory::new(SourceSettings::default());
        let d = ResourceDescriptor::new("db-1", "oracle-ee", Endpoint::new("h", 1521));
        assert!(factory.build(&d).is_none());
    }

    #[test]
    fn construction_failure_builds_nothing() {
        // Postgres without credentials cannot log in.
        let factory = EngineSourceFactory::new(SourceSettings::default());
        let d = ResourceDescriptor::new("db-1", "postgres", Endpoint::new("h", 5432));
        assert!(factory.build(&d).is_none());
    }

    #[test]
    fn cache_engines_build_without_credentials() {
        let factory = EngineSourceFactory::new(SourceSettings::default());
        let redis = ResourceDescriptor::new("c/0001", "redis", Endpoint::new("h", 6379));
        let memcached = ResourceDescriptor::new("m/0001", "memcached", Endpoint::new("h", 11211));
        assert!(factory.build(&redis).is_some());
        assert!(factory.build(&memcached).is_some());
    }

    #[test]
    fn metric_names_are_sanitized() {
        assert_eq!(metric_name("redis", "used_memory"), "redis_used_memory");
        assert_eq!(metric_name("redis", "db0.keys"), "redis_db0_keys");
        assert_eq!(metric_name("memcached", "rusage-user"), "memcached_rusage_user");
    }
}
