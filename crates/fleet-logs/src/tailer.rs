//! Log tailer: per-instance background task that incrementally reads
//! remote log files.
//!
//! Per-file state moves `untracked → primed → steady`: a file is primed
//! on first sighting (a one-line tail read that yields a marker and emits
//! nothing), then read from its marker whenever its last-written
//! timestamp advances, and forgotten as soon as it drops out of a
//! listing. A forgotten file that reappears is primed again.
//!
//! Rotation detection relies on the remote timestamp alone. A file that
//! is truncated and rewritten within one timestamp tick can lose lines.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::entry::LogEntry;
use crate::parser::LogSink;
use crate::source::{LogFile, LogPortion, LogSource, LogSourceError, ReadFrom};

/// Lines requested by a priming read.
const PRIMING_LINES: u32 = 1;

/// Resume state of one remote log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileState {
    pub last_written: i64,
    /// Only valid for the file it was obtained from.
    pub marker: String,
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub primed: usize,
    pub read: usize,
    pub unchanged: usize,
    pub lines: usize,
    pub rotated: usize,
    pub failed: usize,
}

/// Tails every log file of one instance.
pub struct LogTailer {
    source: Arc<dyn LogSource>,
    instance_id: String,
    files: HashMap<String, LogFileState>,
    sink: LogSink,
    call_timeout: Duration,
}

impl LogTailer {
    pub fn new(
        source: Arc<dyn LogSource>,
        instance_id: impl Into<String>,
        sink: LogSink,
        call_timeout: Duration,
    ) -> Self {
        Self {
            source,
            instance_id: instance_id.into(),
            files: HashMap::new(),
            sink,
            call_timeout,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn file_state(&self, file_name: &str) -> Option<&LogFileState> {
        self.files.get(file_name)
    }

    pub fn tracked_files(&self) -> usize {
        self.files.len()
    }

    /// Run one pass over the instance's log files.
    ///
    /// A listing failure aborts the pass before any state changes. A
    /// download failure skips only that file and leaves its state as it
    /// was, so the same marker is retried next pass.
    pub async fn pass(&mut self) -> Result<PassSummary, LogSourceError> {
        let listing = self.list().await?;
        let mut summary = PassSummary::default();
        let mut seen = HashSet::with_capacity(listing.len());

        for file in listing {
            seen.insert(file.name.clone());

            let Some(state) = self.files.get(&file.name) else {
                match self.download(&file.name, ReadFrom::Tail(PRIMING_LINES)).await {
                    Ok(portion) => {
                        info!(file = %file.name, "new log file detected");
                        self.files.insert(
                            file.name,
                            LogFileState {
                                last_written: file.last_written,
                                marker: portion.marker,
                            },
                        );
                        summary.primed += 1;
                    }
                    Err(e) => {
                        warn!(file = %file.name, error = %e, "failed to prime log file");
                        summary.failed += 1;
                    }
                }
                continue;
            };

            if file.last_written <= state.last_written {
                summary.unchanged += 1;
                continue;
            }

            let marker = state.marker.clone();
            match self.download(&file.name, ReadFrom::Marker(marker)).await {
                Ok(portion) => {
                    summary.read += 1;
                    summary.lines += self.emit(&portion.data);
                    self.files.insert(
                        file.name,
                        LogFileState {
                            last_written: file.last_written,
                            marker: portion.marker,
                        },
                    );
                }
                Err(e) => {
                    warn!(file = %file.name, error = %e, "failed to download log file portion");
                    summary.failed += 1;
                }
            }
        }

        let before = self.files.len();
        self.files.retain(|name, _| {
            let keep = seen.contains(name);
            if !keep {
                debug!(file = %name, "log file rotated out");
            }
            keep
        });
        summary.rotated = before - self.files.len();

        Ok(summary)
    }

    /// Start the tailer loop in the background: one pass now, then one
    /// pass per `interval`, measured from the end of the previous pass.
    pub fn spawn(self, interval: Duration) -> TailerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let span = info_span!("log_tailer", instance_id = %self.instance_id);
        let handle = tokio::spawn(self.run(interval, shutdown_rx).instrument(span));
        TailerHandle {
            shutdown_tx,
            handle,
        }
    }

    async fn run(mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        debug!(interval_ms = interval.as_millis() as u64, "log tailer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            match self.pass().await {
                Ok(summary) => debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    primed = summary.primed,
                    read = summary.read,
                    lines = summary.lines,
                    rotated = summary.rotated,
                    failed = summary.failed,
                    "logs refreshed"
                ),
                Err(e) => warn!(error = %e, "failed to list log files"),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                // Also fires when the handle is dropped.
                _ = shutdown.changed() => break,
            }
        }

        debug!("log tailer stopped");
    }

    async fn list(&self) -> Result<Vec<LogFile>, LogSourceError> {
        tokio::time::timeout(self.call_timeout, self.source.list_log_files(&self.instance_id))
            .await
            .map_err(|_| LogSourceError::Timeout(self.call_timeout))?
    }

    async fn download(&self, file_name: &str, from: ReadFrom) -> Result<LogPortion, LogSourceError> {
        tokio::time::timeout(
            self.call_timeout,
            self.source.download_portion(&self.instance_id, file_name, from),
        )
        .await
        .map_err(|_| LogSourceError::Timeout(self.call_timeout))?
    }

    fn emit(&self, data: &str) -> usize {
        let mut emitted = 0;
        for line in complete_lines(data) {
            if self.sink.emit(LogEntry::new(line)) {
                emitted += 1;
            }
        }
        emitted
    }
}

/// Lines terminated by `\n`, without the terminator. A trailing fragment
/// with no terminator is not yielded.
pub fn complete_lines(data: &str) -> impl Iterator<Item = &str> {
    data.split_inclusive('\n').filter_map(|l| l.strip_suffix('\n'))
}

/// Handle to a running tailer task.
///
/// Stopping is cooperative: the loop exits at the top of its next pass
/// or immediately if it is idle between passes. An in-flight download is
/// never aborted. Dropping the handle stops the tailer as well.
pub struct TailerHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TailerHandle {
    /// Signal the loop to stop. Never blocks; safe to call repeatedly.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal stop and wait for the loop to exit.
    pub async fn join(self) {
        self.stop();
        let _ = self.handle.await;
    }
}
