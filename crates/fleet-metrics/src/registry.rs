//! Instance-scoped metric registry.
//!
//! Registration, unregistration, and gathering may interleave freely:
//! the reconciler mutates registrations while scrapes iterate them. A
//! gather snapshots the current registrations under a short read lock
//! and collects outside of it, so a slow collectable never blocks
//! reconciliation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::metric::Metric;

/// Anything that can produce metric samples on demand.
#[async_trait]
pub trait Collectable: Send + Sync {
    async fn collect(&self) -> Vec<Metric>;
}

/// The label attached to every sample of one registered collectable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scope {
    pub label: String,
    pub value: String,
}

impl Scope {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=\"{}\"", self.label, self.value)
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a collector is already registered for {0}")]
    AlreadyRegistered(Scope),
}

#[derive(Default)]
struct Registrations {
    scoped: BTreeMap<Scope, Arc<dyn Collectable>>,
    unscoped: Vec<Arc<dyn Collectable>>,
}

/// Shared registry. Cheap to clone; all clones see the same registrations.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<Registrations>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collectable under `scope`. Fails if the scope is taken.
    pub async fn register(
        &self,
        scope: Scope,
        collectable: Arc<dyn Collectable>,
    ) -> Result<(), RegistryError> {
        let mut regs = self.inner.write().await;
        if regs.scoped.contains_key(&scope) {
            return Err(RegistryError::AlreadyRegistered(scope));
        }
        debug!(%scope, "collector registered");
        regs.scoped.insert(scope, collectable);
        Ok(())
    }

    /// Register a collectable whose samples carry no scope label.
    pub async fn register_unscoped(&self, collectable: Arc<dyn Collectable>) {
        self.inner.write().await.unscoped.push(collectable);
    }

    /// Unregister `collectable` from `scope`.
    ///
    /// Returns `false` if nothing is registered there or if a different
    /// collectable holds the scope.
    pub async fn unregister(&self, scope: &Scope, collectable: &Arc<dyn Collectable>) -> bool {
        let mut regs = self.inner.write().await;
        match regs.scoped.get(scope) {
            Some(current) if Arc::ptr_eq(current, collectable) => {
                regs.scoped.remove(scope);
                debug!(%scope, "collector unregistered");
                true
            }
            _ => false,
        }
    }

    pub async fn is_registered(&self, scope: &Scope) -> bool {
        self.inner.read().await.scoped.contains_key(scope)
    }

    /// Number of scoped registrations.
    pub async fn len(&self) -> usize {
        self.inner.read().await.scoped.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Collect from every registered collectable concurrently.
    ///
    /// Scoped samples get the scope label prepended to their own labels.
    pub async fn gather(&self) -> Vec<Metric> {
        let (scoped, unscoped) = {
            let regs = self.inner.read().await;
            let scoped: Vec<_> = regs
                .scoped
                .iter()
                .map(|(scope, c)| (scope.clone(), Arc::clone(c)))
                .collect();
            (scoped, regs.unscoped.clone())
        };

        let mut tasks = JoinSet::new();
        for (scope, collectable) in scoped {
            tasks.spawn(async move {
                let mut metrics = collectable.collect().await;
                for m in &mut metrics {
                    m.labels.insert(0, (scope.label.clone(), scope.value.clone()));
                }
                metrics
            });
        }
        for collectable in unscoped {
            tasks.spawn(async move { collectable.collect().await });
        }

        let mut out = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(metrics) => out.extend(metrics),
                Err(e) => warn!(error = %e, "collect task failed"),
            }
        }
        out
    }
}
