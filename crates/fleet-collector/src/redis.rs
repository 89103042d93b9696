//! Key-value cache source: `INFO` over a multiplexed connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncConnectionConfig, ProtocolVersion, RedisConnectionInfo};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use fleet_core::ResourceDescriptor;
use fleet_metrics::{Desc, Metric};

use crate::error::{SourceError, SourceResult};
use crate::source::{MetricSource, SourceSettings, connect, metric_name};

const REDIS_UP: Desc = Desc::gauge("redis_up", "Whether the INFO command succeeded", &[]);
const REDIS_DB_KEYS: Desc = Desc::gauge("redis_db_keys", "Keys per logical database", &["db"]);
const REDIS_DB_EXPIRES: Desc = Desc::gauge(
    "redis_db_keys_expiring",
    "Keys with an expiration per logical database",
    &["db"],
);

pub struct RedisSource {
    address: String,
    db_info: RedisConnectionInfo,
    connect_timeout: Duration,
    query_timeout: Duration,
    conn: Mutex<Option<MultiplexedConnection>>,
    closed: AtomicBool,
}

impl RedisSource {
    pub fn new(descriptor: &ResourceDescriptor, settings: &SourceSettings) -> SourceResult<Self> {
        if !descriptor.endpoint.is_defined() {
            return Err(SourceError::MissingEndpoint);
        }

        let (username, password) = match &settings.credentials {
            Some(c) => (
                Some(c.user.clone()).filter(|u| !u.is_empty()),
                Some(c.password.clone()).filter(|p| !p.is_empty()),
            ),
            None => (None, None),
        };

        let mut db_info = RedisConnectionInfo::default()
            .set_db(0)
            .set_protocol(ProtocolVersion::RESP2);
        if let Some(username) = username {
            db_info = db_info.set_username(username);
        }
        if let Some(password) = password {
            db_info = db_info.set_password(password);
        }

        Ok(Self {
            address: descriptor.endpoint.address(),
            db_info,
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

    /// Open a connection and run the handshake (`AUTH` when credentials
    /// are configured).
    async fn open(&self) -> SourceResult<MultiplexedConnection> {
        let stream = connect(&self.address, self.connect_timeout).await?;
        let config = AsyncConnectionConfig::new().set_response_timeout(Some(self.query_timeout));

        let (conn, background) = MultiplexedConnection::new_with_config(&self.db_info, stream, config).await?;
        tokio::spawn(background);
        debug!(address = %self.address, "redis connected");
        Ok(conn)
    }

    async fn info(&self, slot: &mut Option<MultiplexedConnection>) -> SourceResult<String> {
        let mut conn = match slot {
            Some(conn) => conn.clone(),
            None => {
                let conn = self.open().await?;
                *slot = Some(conn.clone());
                conn
            }
        };

        let text: String = tokio::time::timeout(self.query_timeout, redis::cmd("INFO").query_async(&mut conn))
            .await
            .map_err(|_| SourceError::QueryTimeout(self.query_timeout))??;
        Ok(text)
    }
}

#[async_trait]
impl MetricSource for RedisSource {
    async fn collect(&self) -> Vec<Metric> {
        if self.closed.load(Ordering::Acquire) {
            return Vec::new();
        }

        let started = Instant::now();
        let mut conn = self.conn.lock().await;
        match self.info(&mut conn).await {
            Ok(text) => {
                let mut metrics = parse_info(&text);
                metrics.push(REDIS_UP.sample(1.0, &[]));
                debug!(
                    address = %self.address,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "redis metrics collected"
                );
                metrics
            }
            Err(e) => {
                warn!(address = %self.address, error = %e, "redis INFO failed");
                // Reconnect on the next scrape.
                *conn = None;
                vec![REDIS_UP.sample(0.0, &[])]
            }
        }
    }

    async fn close(&self) -> SourceResult<()> {
        self.closed.store(true, Ordering::Release);
        // The background driver exits once the last handle is dropped.
        self.conn.lock().await.take();
        Ok(())
    }
}

/// Numeric `field:value` pairs as `redis_<field>` gauges, plus keyspace
/// lines (`db0:keys=1,expires=0`) as per-db gauges.
fn parse_info(text: &str) -> Vec<Metric> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };

        if let Ok(v) = value.parse::<f64>() {
            out.push(Metric::gauge(
                metric_name("redis", field),
                format!("Redis INFO field {field}"),
                v,
            ));
            continue;
        }

        if field.starts_with("db") && value.contains("keys=") {
            for pair in value.split(',') {
                match pair.split_once('=') {
                    Some(("keys", n)) => {
                        if let Ok(n) = n.parse() {
                            out.push(REDIS_DB_KEYS.sample(n, &[field]));
                        }
                    }
                    Some(("expires", n)) => {
                        if let Ok(n) = n.parse() {
                            out.push(REDIS_DB_EXPIRES.sample(n, &[field]));
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    out
}
