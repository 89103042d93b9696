//! fleetd: managed-instance telemetry agent.
//!
//! Assembles the workspace crates into one process:
//! - one [`fleet_reconciler::FleetReconciler`] per enabled family
//! - a shared [`fleet_metrics::Registry`] holding every tracked collector
//! - the HTTP `/metrics` endpoint
//!
//! # Usage
//!
//! ```text
//! fleetd run --config /etc/fleetd/fleetd.toml --region us-east-1
//! ```

pub mod agent;
pub mod server;

pub use agent::{AgentInfo, cache_context, database_context, spawn_reconcilers};
pub use server::build_router;
