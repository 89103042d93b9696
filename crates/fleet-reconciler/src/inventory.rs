//! File-backed discovery.
//!
//! The inventory is a TOML document listing the instances of one family.
//! It is re-read on every call, so edits show up on the next cycle.
//!
//! ```toml
//! [[instances]]
//! id = "orders-db"
//! engine = "postgres"
//! status = "available"
//! endpoint = { host = "orders-db.internal", port = 5432 }
//! tags = { env = "production" }
//!
//! [[instances]]
//! id = "sessions"
//! node_id = "0001"
//! engine = "redis"
//! endpoint = { host = "sessions-0001.internal", port = 6379 }
//! ```
//!
//! A record with `node_id` describes one cache node; its id becomes
//! `<id>/<node_id>` and `cluster_id` defaults to `<id>`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use fleet_core::{Endpoint, InstanceAttributes, ResourceDescriptor};

use crate::discovery::{Page, PagedDiscovery};
use crate::error::{DiscoveryError, DiscoveryResult};

#[derive(Debug, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    instances: Vec<InventoryRecord>,
}

#[derive(Debug, Deserialize)]
struct InventoryRecord {
    id: String,
    #[serde(default)]
    node_id: Option<String>,
    engine: String,
    #[serde(default)]
    endpoint: Option<Endpoint>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    attributes: InstanceAttributes,
}

impl InventoryRecord {
    fn instance_id(&self) -> String {
        match &self.node_id {
            Some(node) => format!("{}/{}", self.id, node),
            None => self.id.clone(),
        }
    }

    fn into_descriptor(self) -> Option<ResourceDescriptor> {
        let id = self.instance_id();
        let endpoint = match self.endpoint {
            Some(ep) if ep.is_defined() => ep,
            _ => {
                debug!(instance_id = %id, "instance has no endpoint yet, skipping");
                return None;
            }
        };

        let mut attributes = self.attributes;
        if self.node_id.is_some() && attributes.cluster_id.is_none() {
            attributes.cluster_id = Some(self.id);
        }

        Some(ResourceDescriptor {
            id,
            engine: self.engine,
            endpoint,
            tags: self.tags,
            status: self.status,
            attributes,
        })
    }
}

/// Discovery backed by a TOML inventory file, served in pages.
pub struct InventoryDiscovery {
    path: PathBuf,
    page_size: usize,
}

impl InventoryDiscovery {
    pub fn new(path: impl Into<PathBuf>, page_size: usize) -> Self {
        Self {
            path: path.into(),
            page_size: page_size.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> DiscoveryResult<Vec<InventoryRecord>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let file: InventoryFile = toml::from_str(&content)?;
        Ok(file.instances)
    }
}

#[async_trait]
impl PagedDiscovery for InventoryDiscovery {
    async fn list_page(&self, marker: Option<&str>) -> DiscoveryResult<Page> {
        let start = match marker {
            None => 0,
            Some(m) => m
                .parse::<usize>()
                .map_err(|_| DiscoveryError::Api(format!("invalid marker {m:?}")))?,
        };

        let records = self.load().await?;
        let total = records.len();
        let end = start.saturating_add(self.page_size).min(total);
        let instances = records
            .into_iter()
            .skip(start)
            .take(end.saturating_sub(start))
            .filter_map(InventoryRecord::into_descriptor)
            .collect();

        Ok(Page {
            instances,
            next_marker: (end < total).then(|| end.to_string()),
        })
    }

    async fn list_tags(&self, instance_id: &str) -> DiscoveryResult<HashMap<String, String>> {
        self.load()
            .await?
            .into_iter()
            .find(|r| r.instance_id() == instance_id)
            .map(|r| r.tags)
            .ok_or_else(|| DiscoveryError::UnknownInstance(instance_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{Discovery, Paginated};
    use std::io::Write;

    const INVENTORY: &str = r#"
[[instances]]
id = "orders-db"
engine = "postgres"
status = "available"
endpoint = { host = "orders.internal", port = 5432 }
tags = { env = "production" }

[instances.attributes]
instance_class = "db.r6g.large"
allocated_storage_gib = 100

[[instances]]
id = "creating-db"
engine = "mysql"
status = "creating"

[[instances]]
id = "sessions"
node_id = "0001"
engine = "redis"
endpoint = { host = "sessions-0001.internal", port = 6379 }

[[instances]]
id = "sessions"
node_id = "0002"
engine = "redis"
endpoint = { host = "sessions-0002.internal", port = 6379 }
"#;

    fn inventory_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[tokio::test]
    async fn pages_cover_every_record() {
        let f = inventory_file(INVENTORY);
        let inv = InventoryDiscovery::new(f.path(), 2);

        let first = inv.list_page(None).await.unwrap();
        assert_eq!(first.next_marker.as_deref(), Some("2"));
        // creating-db has no endpoint and is dropped from the page.
        assert_eq!(first.instances.len(), 1);

        let second = inv.list_page(Some("2")).await.unwrap();
        assert_eq!(second.next_marker, None);
        assert_eq!(second.instances.len(), 2);
    }

    #[tokio::test]
    async fn cache_nodes_get_composite_ids() {
        let f = inventory_file(INVENTORY);
        let all = Paginated::new(InventoryDiscovery::new(f.path(), 1))
            .list_instances()
            .await
            .unwrap();

        let ids: Vec<_> = all.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["orders-db", "sessions/0001", "sessions/0002"]);

        let node = &all[1];
        assert_eq!(node.attributes.cluster_id.as_deref(), Some("sessions"));
        assert_eq!(node.endpoint, Endpoint::new("sessions-0001.internal", 6379));

        let db = &all[0];
        assert_eq!(db.attributes.allocated_storage_gib, Some(100));
        assert_eq!(db.status, "available");
    }

    #[tokio::test]
    async fn tags_are_looked_up_by_instance_id() {
        let f = inventory_file(INVENTORY);
        let inv = InventoryDiscovery::new(f.path(), 10);

        let tags = inv.list_tags("orders-db").await.unwrap();
        assert_eq!(tags.get("env").map(String::as_str), Some("production"));
        assert!(inv.list_tags("sessions/0002").await.unwrap().is_empty());
        assert!(matches!(
            inv.list_tags("missing").await,
            Err(DiscoveryError::UnknownInstance(_))
        ));
    }

    #[tokio::test]
    async fn missing_or_invalid_file_is_an_error() {
        let inv = InventoryDiscovery::new("/nonexistent/fleetd/inventory.toml", 10);
        assert!(matches!(inv.list_page(None).await, Err(DiscoveryError::Io(_))));

        let f = inventory_file("[[instances]]\nid = 3\n");
        let inv = InventoryDiscovery::new(f.path(), 10);
        assert!(matches!(inv.list_page(None).await, Err(DiscoveryError::Parse(_))));
    }

    #[tokio::test]
    async fn empty_inventory_lists_nothing() {
        let f = inventory_file("");
        let all = Paginated::new(InventoryDiscovery::new(f.path(), 10))
            .list_instances()
            .await
            .unwrap();
        assert!(all.is_empty());
    }
}
