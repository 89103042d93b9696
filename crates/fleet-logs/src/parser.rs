//! Log pattern counter fed by the tailer.
//!
//! Each counted line is reduced to a pattern (its first alphabetic
//! words), keyed by `(level, hash)` and counted. Counters only ever grow
//! and are read without draining, so they export as Prometheus counters.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::entry::{Level, LogEntry};

const PATTERN_WORDS: usize = 16;
const HASH_HEX_DIGITS: usize = 16;
const SAMPLE_MAX_CHARS: usize = 256;

const PREFIX_PATTERN: &str = r"(?:^|[\s:\]])(DEBUG[1-5]?|LOG|INFO|NOTICE|WARNING|ERROR|FATAL|PANIC|DETAIL|HINT|CONTEXT|STATEMENT|QUERY|LOCATION):\s+";

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("invalid level pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Accumulated count for one `(level, pattern)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCounter {
    pub level: Level,
    pub hash: String,
    /// First message seen with this pattern.
    pub sample: String,
    pub messages: u64,
}

// ── Sink ───────────────────────────────────────────────────────────

/// Sending half handed to the tailer. Never blocks.
#[derive(Clone)]
pub struct LogSink {
    tx: mpsc::Sender<LogEntry>,
    dropped: Arc<AtomicU64>,
}

impl LogSink {
    pub fn new(tx: mpsc::Sender<LogEntry>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Hand a line to the parser. Returns `false` if it was dropped.
    pub fn emit(&self, entry: LogEntry) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if n == 1 || n % 1000 == 0 {
                    warn!(dropped_total = n, "log parser saturated, dropping lines");
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("log parser closed, dropping line");
                false
            }
        }
    }

    /// Lines dropped so far because the parser was saturated.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ── Pattern counting ───────────────────────────────────────────────

struct PatternCounter {
    prefix: Regex,
    counters: HashMap<(Level, String), LogCounter>,
    /// Counter whose sample was taken from the last counted line.
    sampled: Option<(Level, String)>,
}

impl PatternCounter {
    fn new() -> Result<Self, ParserError> {
        Ok(Self {
            prefix: Regex::new(PREFIX_PATTERN)?,
            counters: HashMap::new(),
            sampled: None,
        })
    }

    /// Count one line. Continuation records are not counted; they extend
    /// the sample of the message they follow.
    fn observe(&mut self, entry: &LogEntry) {
        let line = entry.content.trim_end_matches('\r');
        if line.trim().is_empty() {
            return;
        }
        if line.starts_with(char::is_whitespace) {
            self.attach(line);
            return;
        }

        let (detected, body) = match self.prefix.captures(line) {
            Some(caps) => {
                let Some(level) = map_severity(&caps[1]) else {
                    let start = caps.get(1).map_or(0, |m| m.start());
                    self.attach(&line[start..]);
                    return;
                };
                let end = caps.get(0).map_or(0, |m| m.end());
                (level, &line[end..])
            }
            None => (Level::Unknown, line),
        };
        let level = if entry.level == Level::Unknown {
            detected
        } else {
            entry.level
        };

        let pattern = extract_pattern(body);
        let hash = pattern_hash(&pattern);
        let key = (level, hash);
        let counter = self.counters.entry(key.clone()).or_insert_with(|| LogCounter {
            level,
            hash: key.1.clone(),
            sample: truncate_chars(body.trim(), SAMPLE_MAX_CHARS),
            messages: 0,
        });
        counter.messages += 1;
        self.sampled = (counter.messages == 1).then_some(key);
    }

    fn attach(&mut self, continuation: &str) {
        let Some(counter) = self.sampled.as_ref().and_then(|key| self.counters.get_mut(key)) else {
            return;
        };
        let joined = format!("{} {}", counter.sample, continuation.trim());
        counter.sample = truncate_chars(&joined, SAMPLE_MAX_CHARS);
    }

    fn snapshot(&self) -> Vec<LogCounter> {
        let mut out: Vec<_> = self.counters.values().cloned().collect();
        out.sort_by(|a, b| (a.level, &a.hash).cmp(&(b.level, &b.hash)));
        out
    }
}

/// `None` marks a continuation record.
fn map_severity(tag: &str) -> Option<Level> {
    match tag {
        "LOG" | "INFO" | "NOTICE" => Some(Level::Info),
        "WARNING" => Some(Level::Warning),
        "ERROR" => Some(Level::Error),
        "FATAL" | "PANIC" => Some(Level::Critical),
        t if t.starts_with("DEBUG") => Some(Level::Debug),
        _ => None,
    }
}

/// The first alphabetic words of a message, space-joined. Tokens with
/// digits or identifiers mixed in are treated as variable parts.
fn extract_pattern(body: &str) -> String {
    body.split_whitespace()
        .map(|t| t.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|t| !t.is_empty() && t.chars().all(char::is_alphabetic))
        .take(PATTERN_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

fn pattern_hash(pattern: &str) -> String {
    let digest = Sha256::digest(pattern.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_HEX_DIGITS);
    hex
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

// ── Parser task ────────────────────────────────────────────────────

/// Background task draining the sink's channel into pattern counters.
pub struct LogParser {
    state: Arc<Mutex<PatternCounter>>,
    handle: JoinHandle<()>,
}

impl LogParser {
    /// Spawn the parser task with a channel of `capacity` lines.
    pub fn start(capacity: usize) -> Result<(LogParser, LogSink), ParserError> {
        let state = Arc::new(Mutex::new(PatternCounter::new()?));
        let (tx, mut rx) = mpsc::channel::<LogEntry>(capacity.max(1));

        let task_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                task_state.lock().await.observe(&entry);
            }
            debug!("log parser channel closed");
        });

        Ok((LogParser { state, handle }, LogSink::new(tx)))
    }

    /// Current counters, ordered by level then hash.
    pub async fn counters(&self) -> Vec<LogCounter> {
        self.state.lock().await.snapshot()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for LogParser {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
