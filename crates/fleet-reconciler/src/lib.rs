//! fleet-reconciler: discovery and fleet reconciliation.
//!
//! One [`FleetReconciler`] runs per enabled resource family. Each cycle
//! it asks a [`Discovery`] backend for the instance set, filters it by
//! tags, and converges the tracked collectors and their registry
//! scopes onto it.

pub mod discovery;
pub mod error;
pub mod inventory;
pub mod reconciler;

pub use discovery::{Discovery, Page, PagedDiscovery, Paginated};
pub use error::{DiscoveryError, DiscoveryResult};
pub use inventory::InventoryDiscovery;
pub use reconciler::{CycleReport, FleetReconciler};
