//! Document cache source: `stats` over a persistent text-protocol
//! connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use fleet_core::ResourceDescriptor;
use fleet_metrics::{Desc, Metric};

use crate::error::{SourceError, SourceResult};
use crate::source::{MetricSource, SourceSettings, connect, metric_name};

const MEMCACHED_UP: Desc = Desc::gauge("memcached_up", "Whether the stats command succeeded", &[]);
const MAX_STAT_LINES: usize = 4096;

pub struct MemcachedSource {
    address: String,
    connect_timeout: Duration,
    query_timeout: Duration,
    conn: Mutex<Option<BufReader<TcpStream>>>,
    closed: AtomicBool,
}

impl MemcachedSource {
    pub fn new(descriptor: &ResourceDescriptor, settings: &SourceSettings) -> SourceResult<Self> {
        if !descriptor.endpoint.is_defined() {
            return Err(SourceError::MissingEndpoint);
        }
        Ok(Self {
            address: descriptor.endpoint.address(),
            connect_timeout: settings.connect_timeout,
            query_timeout: settings.query_timeout,
            conn: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn boxed(
        descriptor: &ResourceDescriptor,
        settings: &SourceSettings,
    ) -> SourceResult<Box<dyn MetricSource>> {
        Ok(Box::new(Self::new(descriptor, settings)?))
    }

    async fn stats(&self, conn: &mut Option<BufReader<TcpStream>>) -> SourceResult<Vec<(String, String)>> {
        if conn.is_none() {
            let stream = connect(&self.address, self.connect_timeout).await?;
            debug!(address = %self.address, "memcached connected");
            *conn = Some(BufReader::new(stream));
        }
        let Some(stream) = conn.as_mut() else {
            return Err(SourceError::Protocol("no connection".into()));
        };

        tokio::time::timeout(self.query_timeout, query_stats(stream))
            .await
            .map_err(|_| SourceError::QueryTimeout(self.query_timeout))?
    }
}

#[async_trait]
impl MetricSource for MemcachedSource {
    async fn collect(&self) -> Vec<Metric> {
        if self.closed.load(Ordering::Acquire) {
            return Vec::new();
        }

        let started = Instant::now();
        let mut conn = self.conn.lock().await;
        match self.stats(&mut *conn).await {
            Ok(stats) => {
                let mut metrics: Vec<Metric> = stats
                    .iter()
                    .filter_map(|(name, value)| {
                        let v = value.parse::<f64>().ok()?;
                        Some(Metric::gauge(
                            metric_name("memcached", name),
                            format!("memcached stat {name}"),
                            v,
                        ))
                    })
                    .collect();
                metrics.push(MEMCACHED_UP.sample(1.0, &[]));
                debug!(
                    address = %self.address,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "memcached metrics collected"
                );
                metrics
            }
            Err(e) => {
                warn!(address = %self.address, error = %e, "memcached stats failed");
                *conn = None;
                vec![MEMCACHED_UP.sample(0.0, &[])]
            }
        }
    }

    async fn close(&self) -> SourceResult<()> {
        self.closed.store(true, Ordering::Release);
        if let Some(mut stream) = self.conn.lock().await.take() {
            let _ = stream.get_mut().shutdown().await;
        }
        Ok(())
    }
}

async fn query_stats(stream: &mut BufReader<TcpStream>) -> SourceResult<Vec<(String, String)>> {
    stream.get_mut().write_all(b"stats\r\n").await?;

    let mut stats = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        if stream.read_line(&mut line).await? == 0 {
            return Err(SourceError::Protocol("connection closed".into()));
        }
        match parse_stat_line(line.trim_end()) {
            StatLine::Stat(name, value) => stats.push((name.to_string(), value.to_string())),
            StatLine::End => return Ok(stats),
            StatLine::Error(msg) => return Err(SourceError::Protocol(msg.to_string())),
            StatLine::Other => {}
        }
        if stats.len() > MAX_STAT_LINES {
            return Err(SourceError::Protocol("stats reply too long".into()));
        }
    }
}

enum StatLine<'a> {
    Stat(&'a str, &'a str),
    End,
    Error(&'a str),
    Other,
}

fn parse_stat_line(line: &str) -> StatLine<'_> {
    if line == "END" {
        return StatLine::End;
    }
    if line == "ERROR" || line.starts_with("CLIENT_ERROR") || line.starts_with("SERVER_ERROR") {
        return StatLine::Error(line);
    }
    let mut parts = line.splitn(3, ' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("STAT"), Some(name), Some(value)) => StatLine::Stat(name, value),
        _ => StatLine::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::Endpoint;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    const STATS_REPLY: &str = "STAT pid 1\r\nSTAT uptime 500\r\nSTAT version 1.6.21\r\nSTAT curr_connections 10\r\nSTAT rusage_user 0.123\r\nEND\r\n";

    async fn mock_memcached(reply: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut cmd = [0u8; 7];
                    while stream.read_exact(&mut cmd).await.is_ok() {
                        assert_eq!(&cmd, b"stats\r\n");
                        if stream.write_all(reply.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        addr
    }

    fn source_for(addr: &str) -> MemcachedSource {
        let (host, port) = addr.rsplit_once(':').unwrap();
        let d = ResourceDescriptor::new("m/0001", "memcached", Endpoint::new(host, port.parse().unwrap()));
        MemcachedSource::new(&d, &SourceSettings::default()).unwrap()
    }

    fn value(metrics: &[Metric], name: &str) -> Option<f64> {
        metrics.iter().find(|m| m.name == name).map(|m| m.value)
    }

    #[test]
    fn stat_lines() {
        assert!(matches!(parse_stat_line("STAT pid 1"), StatLine::Stat("pid", "1")));
        assert!(matches!(parse_stat_line("END"), StatLine::End));
        assert!(matches!(parse_stat_line("SERVER_ERROR out of memory"), StatLine::Error(_)));
        assert!(matches!(parse_stat_line("garbage"), StatLine::Other));
    }

    #[tokio::test]
    async fn numeric_stats_become_gauges() {
        let addr = mock_memcached(STATS_REPLY).await;
        let metrics = source_for(&addr).collect().await;

        assert_eq!(value(&metrics, "memcached_up"), Some(1.0));
        assert_eq!(value(&metrics, "memcached_uptime"), Some(500.0));
        assert_eq!(value(&metrics, "memcached_curr_connections"), Some(10.0));
        assert_eq!(value(&metrics, "memcached_rusage_user"), Some(0.123));
        assert_eq!(value(&metrics, "memcached_version"), None);
    }

    #[tokio::test]
    async fn error_reply_reports_down() {
        let addr = mock_memcached("ERROR\r\n").await;
        let metrics = source_for(&addr).collect().await;
        assert_eq!(metrics.len(), 1);
        assert_eq!(value(&metrics, "memcached_up"), Some(0.0));
    }
}
