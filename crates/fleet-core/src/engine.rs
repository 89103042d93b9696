//! Engine classification.
//!
//! Maps the engine string reported by discovery onto the closed set of
//! metric-source variants. Unknown engines are not an error: they simply
//! get no metric-source collaborator.

use std::fmt;

/// Which metric-source variant applies to an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// PostgreSQL-compatible relational database.
    RelationalDb,
    /// Redis-protocol key-value cache.
    KeyValueCache,
    /// Memcached-protocol cache.
    DocumentCache,
    Unsupported,
}

impl EngineKind {
    pub fn classify(engine: &str) -> Self {
        match engine.trim().to_ascii_lowercase().as_str() {
            "postgres" | "aurora-postgresql" => EngineKind::RelationalDb,
            "redis" | "valkey" => EngineKind::KeyValueCache,
            "memcached" => EngineKind::DocumentCache,
            _ => EngineKind::Unsupported,
        }
    }

    /// Whether the engine writes logs the tailer and parser understand.
    pub fn supports_structured_logs(self) -> bool {
        matches!(self, EngineKind::RelationalDb)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineKind::RelationalDb => "relational-db",
            EngineKind::KeyValueCache => "key-value-cache",
            EngineKind::DocumentCache => "document-cache",
            EngineKind::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}
