//! fleet-metrics: the metrics side of fleetd.
//!
//! Collectors produce plain [`Metric`] samples on demand. The
//! [`Registry`] holds one collectable per instance scope and attaches the
//! scope label (`rds_instance_id="<region>/<id>"`) to everything that
//! collectable emits. A scrape gathers all collectables concurrently and
//! renders the result in the Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! Registry
//!   ├── register(scope, collectable)    ← reconciler, on add
//!   ├── unregister(scope, collectable)  ← reconciler, on remove
//!   └── gather() → Vec<Metric>          ← scrape handler
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics
//! ```

pub mod metric;
pub mod prometheus;
pub mod registry;

pub use metric::{Desc, Metric, MetricKind};
pub use prometheus::{CONTENT_TYPE, render_prometheus};
pub use registry::{Collectable, Registry, RegistryError, Scope};
