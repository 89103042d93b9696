//! Discovery collaborator contract.
//!
//! The reconciler sees one flattened instance list per cycle. Backends
//! that page their results implement [`PagedDiscovery`] and are wrapped
//! in [`Paginated`], which walks the pages.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tracing::debug;

use fleet_core::ResourceDescriptor;

use crate::error::{DiscoveryError, DiscoveryResult};

/// Source of the current instance set for one resource family.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Every instance that currently exists. All-or-nothing.
    async fn list_instances(&self) -> DiscoveryResult<Vec<ResourceDescriptor>>;

    /// Tags of one instance. Used only by the allow filter.
    async fn list_tags(&self, instance_id: &str) -> DiscoveryResult<HashMap<String, String>>;
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub instances: Vec<ResourceDescriptor>,
    /// Continuation marker; `None` on the last page.
    pub next_marker: Option<String>,
}

/// A discovery backend that returns results in pages.
#[async_trait]
pub trait PagedDiscovery: Send + Sync {
    async fn list_page(&self, marker: Option<&str>) -> DiscoveryResult<Page>;

    async fn list_tags(&self, instance_id: &str) -> DiscoveryResult<HashMap<String, String>>;
}

/// Flattens a [`PagedDiscovery`] into a [`Discovery`].
pub struct Paginated<P> {
    inner: P,
}

impl<P> Paginated<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: PagedDiscovery> Discovery for Paginated<P> {
    async fn list_instances(&self) -> DiscoveryResult<Vec<ResourceDescriptor>> {
        let mut out = Vec::new();
        let mut seen_markers = HashSet::new();
        let mut marker: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.inner.list_page(marker.as_deref()).await?;
            pages += 1;
            out.extend(page.instances);

            match page.next_marker {
                Some(next) => {
                    if !seen_markers.insert(next.clone()) {
                        return Err(DiscoveryError::PaginationLoop(next));
                    }
                    marker = Some(next);
                }
                None => break,
            }
        }

        debug!(pages, instances = out.len(), "discovery listing complete");
        Ok(out)
    }

    async fn list_tags(&self, instance_id: &str) -> DiscoveryResult<HashMap<String, String>> {
        self.inner.list_tags(instance_id).await
    }
}
