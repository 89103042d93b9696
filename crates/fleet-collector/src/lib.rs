//! fleet-collector: per-instance collector lifecycle.
//!
//! Each tracked instance gets one [`CollectorEntry`], which owns:
//!
//! - an engine [`MetricSource`] chosen by [`constructor_for`] from the
//!   engine kind (Postgres login check, Redis `INFO`, memcached `stats`),
//! - for relational engines, a log tailer feeding a pattern counter,
//! - access to the shared host telemetry collaborator.
//!
//! # Scrape fan-out
//!
//! ```text
//! CollectorEntry::collect()
//!   ├── identity, status, capacity gauges (from the descriptor)
//!   ├── join ─┬── MetricSource::collect()
//!   │         └── HostMetricsSource::fetch_latest_sample() → decode
//!   └── LogParser::counters() → aws_rds_log_messages_total
//! ```

pub mod descs;
pub mod enhanced;
pub mod entry;
pub mod error;
pub mod host;
pub mod memcached;
pub mod postgres;
pub mod redis;
pub mod source;

pub use entry::{CollectorContext, CollectorEntry, LogSettings};
pub use error::{CollectorError, CollectorResult, HostMetricsError, SourceError, SourceResult};
pub use host::{DirHostMetrics, HostMetricsSource};
pub use memcached::MemcachedSource;
pub use postgres::PostgresSource;
pub use redis::RedisSource;
pub use source::{EngineSourceFactory, MetricSource, MetricSourceFactory, SourceConstructor, SourceSettings, constructor_for};
