//! Directory-backed log source.
//!
//! Layout: `<root>/<instance_id>/<file>`. A file's last-written time is
//! its mtime in milliseconds and a marker is the decimal byte offset just
//! past the last complete line returned, so partial lines are re-read
//! once they are terminated.

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::warn;

use crate::source::{LogFile, LogPortion, LogSource, LogSourceError, ReadFrom};

pub struct DirLogSource {
    root: PathBuf,
}

impl DirLogSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn instance_dir(&self, instance_id: &str) -> Result<PathBuf, LogSourceError> {
        Ok(self.root.join(checked_name(instance_id)?))
    }
}

/// Accept a single normal path component only.
fn checked_name(name: &str) -> Result<&str, LogSourceError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(name),
        _ => Err(LogSourceError::InvalidFileName(name.to_string())),
    }
}

fn mtime_ms(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_millis() as i64)
}

#[async_trait]
impl LogSource for DirLogSource {
    async fn list_log_files(&self, instance_id: &str) -> Result<Vec<LogFile>, LogSourceError> {
        let dir = self.instance_dir(instance_id)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            files.push(LogFile::new(name, mtime_ms(&meta)));
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn download_portion(
        &self,
        instance_id: &str,
        file_name: &str,
        from: ReadFrom,
    ) -> Result<LogPortion, LogSourceError> {
        let path = self.instance_dir(instance_id)?.join(checked_name(file_name)?);
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LogSourceError::NotFound(file_name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata().await?.len();

        match from {
            ReadFrom::Tail(lines) => {
                let mut buf = Vec::with_capacity(len as usize);
                file.read_to_end(&mut buf).await?;
                let complete = buf.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
                let text = String::from_utf8_lossy(&buf[..complete]);
                let data = last_lines(&text, lines as usize).to_string();
                Ok(LogPortion {
                    data,
                    marker: complete.to_string(),
                })
            }
            ReadFrom::Marker(marker) => {
                let mut offset: u64 = marker
                    .parse()
                    .map_err(|_| LogSourceError::InvalidMarker(marker.clone()))?;
                if offset > len {
                    warn!(file = %file_name, offset, len, "log file shrank, reading from start");
                    offset = 0;
                }
                file.seek(SeekFrom::Start(offset)).await?;
                let mut buf = Vec::with_capacity((len - offset) as usize);
                file.read_to_end(&mut buf).await?;

                let complete = buf.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
                buf.truncate(complete);
                Ok(LogPortion {
                    data: String::from_utf8_lossy(&buf).into_owned(),
                    marker: (offset + complete as u64).to_string(),
                })
            }
        }
    }
}

/// The last `n` newline-terminated lines of `text`.
fn last_lines(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let body = text.strip_suffix('\n').unwrap_or(text);
    match body.rmatch_indices('\n').nth(n - 1) {
        Some((i, _)) => &text[i + 1..],
        None => text,
    }
}
