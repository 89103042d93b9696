//! fleet-core: shared types and configuration for fleetd.
//!
//! Everything the reconciler, collectors and log tailers agree on lives
//! here: the immutable [`ResourceDescriptor`] snapshot produced by
//! discovery, engine classification, the tag-based allow filter, the
//! region-qualified instance id, and the TOML agent configuration.
//!
//! Configuration is parsed once at startup into [`AgentSettings`] and then
//! passed down explicitly through constructors. Nothing in the workspace
//! reads ambient global state.

pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod id;
pub mod types;

pub use config::{
    AgentConfig, AgentSettings, CacheSettings, Credentials, DatabaseSettings, parse_duration,
};
pub use engine::EngineKind;
pub use error::{ConfigError, ConfigResult};
pub use filter::TagFilter;
pub use id::id_with_region;
pub use types::*;
