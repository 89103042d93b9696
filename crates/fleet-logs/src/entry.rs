//! Log lines as handed to the parser.

use std::fmt;

/// Message severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Unknown,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Unknown => "unknown",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Critical => "critical",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One complete log line, without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub content: String,
    /// Severity if the producer knows it; the parser detects it otherwise.
    pub level: Level,
}

impl LogEntry {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            level: Level::Unknown,
        }
    }
}
