//! Fleet reconciler: keeps one collector per discovered instance.
//!
//! Each cycle lists the family's instances, applies the tag filter, and
//! diffs the result against the tracked set:
//!
//! - new instances get a [`CollectorEntry`], registered under the
//!   region-qualified instance id,
//! - kept instances receive the fresh descriptor (restarting on an
//!   endpoint change),
//! - vanished instances are unregistered first and closed second.
//!
//! A failed listing aborts the cycle and leaves everything as it was.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use fleet_collector::{CollectorContext, CollectorEntry};
use fleet_core::{ResourceDescriptor, TagFilter, id_with_region};
use fleet_metrics::{Collectable, Registry, Scope};

use crate::discovery::Discovery;
use crate::error::{DiscoveryError, DiscoveryResult};

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Distinct instances returned by discovery.
    pub discovered: usize,
    /// Instances rejected by the tag filter.
    pub filtered_out: usize,
    pub added: usize,
    pub removed: usize,
    /// Kept instances whose descriptor was refreshed in place.
    pub updated: usize,
    /// Kept instances restarted because their endpoint moved.
    pub restarted: usize,
    /// New instances that could not be started or registered.
    pub failed: usize,
}

struct Tracked {
    entry: Arc<CollectorEntry>,
    /// The exact handle given to the registry.
    registered: Arc<dyn Collectable>,
    scope: Scope,
}

pub struct FleetReconciler {
    discovery: Arc<dyn Discovery>,
    registry: Registry,
    ctx: Arc<CollectorContext>,
    filter: TagFilter,
    api_timeout: Duration,
    tracked: HashMap<String, Tracked>,
}

impl FleetReconciler {
    pub fn new(
        discovery: Arc<dyn Discovery>,
        registry: Registry,
        ctx: Arc<CollectorContext>,
        filter: TagFilter,
        api_timeout: Duration,
    ) -> Self {
        Self {
            discovery,
            registry,
            ctx,
            filter,
            api_timeout,
            tracked: HashMap::new(),
        }
    }

    /// Sorted ids of the tracked instances.
    pub fn tracked_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.tracked.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_tracked(&self, id: &str) -> bool {
        self.tracked.contains_key(id)
    }

    /// Run one reconciliation cycle.
    pub async fn reconcile(&mut self) -> DiscoveryResult<CycleReport> {
        let started = Instant::now();
        let listed = tokio::time::timeout(self.api_timeout, self.discovery.list_instances())
            .await
            .map_err(|_| DiscoveryError::Timeout(self.api_timeout))??;

        let mut report = CycleReport::default();
        let wanted = self.select(listed, &mut report).await;

        for (id, descriptor) in &wanted {
            match self.tracked.get(id) {
                Some(tracked) => {
                    if tracked.entry.update(descriptor.clone()).await {
                        report.restarted += 1;
                    } else {
                        report.updated += 1;
                    }
                }
                None => {
                    if self.add(descriptor.clone()).await {
                        report.added += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }
        }

        let gone: Vec<String> = self
            .tracked
            .keys()
            .filter(|id| !wanted.contains_key(*id))
            .cloned()
            .collect();
        for id in gone {
            info!(instance_id = %id, family = %self.ctx.family, "instance no longer exists");
            if let Some(tracked) = self.tracked.remove(&id) {
                self.retire(tracked).await;
                report.removed += 1;
            }
        }

        info!(
            family = %self.ctx.family,
            discovered = report.discovered,
            tracked = self.tracked.len(),
            added = report.added,
            removed = report.removed,
            restarted = report.restarted,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reconciliation cycle complete"
        );
        Ok(report)
    }

    /// Run cycles until `shutdown` flips, then release every instance.
    ///
    /// The first cycle runs immediately. The interval is measured from
    /// the end of one cycle to the start of the next.
    pub async fn run(&mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            family = %self.ctx.family,
            interval_secs = interval.as_secs(),
            "reconciler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.reconcile().await {
                error!(family = %self.ctx.family, error = %e, "discovery failed, keeping current instances");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(family = %self.ctx.family, "reconciler shutting down");
        self.shutdown_all().await;
    }

    /// Unregister and close every tracked instance.
    pub async fn shutdown_all(&mut self) {
        let tracked = std::mem::take(&mut self.tracked);
        for (_, t) in tracked {
            self.retire(t).await;
        }
    }

    /// Dedupe by id and apply the tag filter.
    async fn select(
        &self,
        listed: Vec<ResourceDescriptor>,
        report: &mut CycleReport,
    ) -> BTreeMap<String, ResourceDescriptor> {
        let mut seen = HashSet::new();
        let mut wanted = BTreeMap::new();

        for descriptor in listed {
            if !seen.insert(descriptor.id.clone()) {
                warn!(instance_id = %descriptor.id, "duplicate instance in discovery listing, ignoring");
                continue;
            }
            report.discovered += 1;

            if !self.filter.is_empty() {
                let tags = self.tags_of(&descriptor.id).await;
                if !self.filter.allows(&tags) {
                    debug!(instance_id = %descriptor.id, filter = %self.filter, "instance excluded by tag filter");
                    report.filtered_out += 1;
                    continue;
                }
            }

            wanted.insert(descriptor.id.clone(), descriptor);
        }

        wanted
    }

    /// Tag lookup failures count as "no tags".
    async fn tags_of(&self, id: &str) -> HashMap<String, String> {
        let lookup = tokio::time::timeout(self.api_timeout, self.discovery.list_tags(id)).await;
        match lookup {
            Ok(Ok(tags)) => tags,
            Ok(Err(e)) => {
                warn!(instance_id = %id, error = %e, "tag lookup failed, treating as untagged");
                HashMap::new()
            }
            Err(_) => {
                warn!(instance_id = %id, timeout_ms = self.api_timeout.as_millis() as u64, "tag lookup timed out, treating as untagged");
                HashMap::new()
            }
        }
    }

    async fn add(&mut self, descriptor: ResourceDescriptor) -> bool {
        let id = descriptor.id.clone();
        info!(instance_id = %id, engine = %descriptor.engine, family = %self.ctx.family, "new instance found");

        let entry = match CollectorEntry::start(descriptor, Arc::clone(&self.ctx)).await {
            Ok(entry) => Arc::new(entry),
            Err(e) => {
                warn!(instance_id = %id, error = %e, "failed to start collector, will retry next cycle");
                return false;
            }
        };

        let scope = Scope::new(
            self.ctx.family.instance_label(),
            id_with_region(&self.ctx.region, &id),
        );
        let registered: Arc<dyn Collectable> = entry.clone();
        if let Err(e) = self.registry.register(scope.clone(), Arc::clone(&registered)).await {
            warn!(instance_id = %id, error = %e, "failed to register collector, will retry next cycle");
            entry.close().await;
            return false;
        }

        self.tracked.insert(
            id,
            Tracked {
                entry,
                registered,
                scope,
            },
        );
        true
    }

    async fn retire(&self, tracked: Tracked) {
        self.registry_release(&tracked).await;
        tracked.entry.close().await;
    }

    async fn registry_release(&self, tracked: &Tracked) {
        if !self.registry.unregister(&tracked.scope, &tracked.registered).await {
            warn!(scope = %tracked.scope, "collector was not registered at removal");
        }
    }
}
