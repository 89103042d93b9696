//! Domain types shared across fleetd.
//!
//! A [`ResourceDescriptor`] is rebuilt from the discovery response on
//! every reconciliation cycle. It is never edited in place; a newer
//! descriptor for the same `id` supersedes the previous one.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::engine::EngineKind;

/// Stable identifier of a discovered instance within one discovery cycle.
pub type InstanceId = String;

// ── Family ─────────────────────────────────────────────────────────

/// A discovery family: one kind of managed resource, with its own
/// discovery backend, filters, and registry label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceFamily {
    /// Managed relational databases.
    Database,
    /// Managed cache nodes.
    Cache,
}

impl ResourceFamily {
    /// The label every metric of an instance in this family carries.
    pub fn instance_label(self) -> &'static str {
        match self {
            ResourceFamily::Database => "rds_instance_id",
            ResourceFamily::Cache => "ec_instance_id",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceFamily::Database => "database",
            ResourceFamily::Cache => "cache",
        }
    }
}

impl fmt::Display for ResourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Endpoint ───────────────────────────────────────────────────────

/// Network endpoint of an instance.
///
/// This pair is the restart identity of a tracked instance: when it
/// changes, the owned collaborators are closed and rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn is_defined(&self) -> bool {
        !self.host.is_empty()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}

// ── Descriptor ─────────────────────────────────────────────────────

/// Immutable snapshot of one discovered instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Reconciliation identity.
    pub id: InstanceId,
    /// Engine name as reported by the cloud API (e.g. `postgres`, `redis`).
    pub engine: String,
    pub endpoint: Endpoint,
    /// Resource tags, used only by the allow filter.
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Lifecycle status string (e.g. `available`, `modifying`).
    #[serde(default)]
    pub status: String,
    /// Display and capacity attributes.
    #[serde(default)]
    pub attributes: InstanceAttributes,
}

impl ResourceDescriptor {
    pub fn new(id: impl Into<String>, engine: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            id: id.into(),
            engine: engine.into(),
            endpoint,
            tags: HashMap::new(),
            status: String::new(),
            attributes: InstanceAttributes::default(),
        }
    }

    pub fn engine_kind(&self) -> EngineKind {
        EngineKind::classify(&self.engine)
    }

    /// Whether `other` points at the same `(host, port)`.
    pub fn same_endpoint(&self, other: &ResourceDescriptor) -> bool {
        self.endpoint == other.endpoint
    }

    /// Whether the instance publishes enhanced host telemetry.
    pub fn has_host_telemetry(&self) -> bool {
        self.attributes.monitoring_interval_secs > 0
            && self
                .attributes
                .resource_id
                .as_deref()
                .is_some_and(|id| !id.is_empty())
    }
}

/// Engine-specific display and capacity attributes.
///
/// Everything here is cosmetic for reconciliation purposes: changes are
/// picked up by replacing the stored descriptor, never by a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InstanceAttributes {
    pub availability_zone: String,
    pub secondary_availability_zone: String,
    pub engine_version: String,
    /// Instance size class (e.g. `db.r6g.large`, `cache.t3.micro`).
    pub instance_class: String,
    pub storage_type: String,
    pub cluster_id: Option<String>,
    /// Cache replication group; preferred over `cluster_id` for display.
    pub replication_group_id: Option<String>,
    pub source_instance_id: Option<String>,
    pub read_replica_ids: Vec<String>,
    pub allocated_storage_gib: Option<u64>,
    pub max_allocated_storage_gib: Option<u64>,
    pub provisioned_iops: Option<u64>,
    pub backup_retention_days: Option<u64>,
    /// Internal resource id that keys the host telemetry stream.
    pub resource_id: Option<String>,
    /// Enhanced monitoring interval; zero when disabled.
    pub monitoring_interval_secs: u64,
}
