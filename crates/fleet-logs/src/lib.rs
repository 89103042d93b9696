//! fleet-logs: incremental tailing of remote, rotating log files.
//!
//! A [`LogTailer`] runs one background task per instance. Each pass
//! lists the instance's log files, primes newly seen files (obtaining a
//! resume marker without emitting history), reads everything new from
//! files whose last-written timestamp advanced, and forgets files that
//! rotated out of the listing.
//!
//! # Architecture
//!
//! ```text
//! LogTailer (per instance, own timer loop)
//!   ├── LogSource::list_log_files()
//!   ├── LogSource::download_portion(marker | tail)
//!   └── LogSink::emit(LogEntry) ──mpsc──▶ LogParser task
//!                                           └── counters() ← scrape
//! ```
//!
//! The sink never blocks: when the parser falls behind, lines are
//! dropped and counted rather than stalling the tailer or its shutdown.

pub mod entry;
pub mod local;
pub mod parser;
pub mod source;
pub mod tailer;

pub use entry::{Level, LogEntry};
pub use local::DirLogSource;
pub use parser::{LogCounter, LogParser, LogSink, ParserError};
pub use source::{LogFile, LogPortion, LogSource, LogSourceError, ReadFrom};
pub use tailer::{LogFileState, LogTailer, PassSummary, TailerHandle};
