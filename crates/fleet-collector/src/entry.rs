//! Collector lifecycle: everything tracked for one discovered instance.
//!
//! A [`CollectorEntry`] owns the instance's metric source and, for engines
//! with structured logs, a log tailer feeding a pattern counter. It is
//! registered with the metrics registry as one collectable.
//!
//! Owned collaborators are never reconfigured in place: when the
//! instance's endpoint changes they are closed and rebuilt. Any other
//! descriptor change only replaces the stored snapshot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use fleet_core::{ResourceDescriptor, ResourceFamily, id_with_region};
use fleet_logs::{LogParser, LogSource, LogTailer, TailerHandle};
use fleet_metrics::{Collectable, Metric};

use crate::descs::*;
use crate::enhanced::decode_sample;
use crate::error::{CollectorError, CollectorResult, HostMetricsError};
use crate::host::HostMetricsSource;
use crate::source::{MetricSource, MetricSourceFactory};

/// Log tailing settings for a family.
#[derive(Clone)]
pub struct LogSettings {
    pub source: Arc<dyn LogSource>,
    /// Zero disables tailing.
    pub interval: Duration,
    pub channel_capacity: usize,
}

/// Everything a family's collectors share. Built once at startup.
pub struct CollectorContext {
    pub family: ResourceFamily,
    pub region: String,
    pub sources: Arc<dyn MetricSourceFactory>,
    pub logs: Option<LogSettings>,
    pub host_metrics: Option<Arc<dyn HostMetricsSource>>,
    /// Bound on each host-metrics fetch, endpoint lookup and close.
    pub call_timeout: Duration,
}

struct LogPipeline {
    tailer: TailerHandle,
    parser: LogParser,
}

impl LogPipeline {
    fn stop(&self) {
        self.tailer.stop();
        self.parser.stop();
    }
}

struct EntryState {
    descriptor: ResourceDescriptor,
    source: Option<Arc<dyn MetricSource>>,
    logs: Option<Arc<LogPipeline>>,
}

/// One tracked instance.
pub struct CollectorEntry {
    ctx: Arc<CollectorContext>,
    state: RwLock<EntryState>,
}

impl CollectorEntry {
    /// Build the entry and start its collaborators.
    ///
    /// Fails only if the instance cannot be monitored at all. A metric
    /// source that fails to build leaves the entry running without one.
    pub async fn start(descriptor: ResourceDescriptor, ctx: Arc<CollectorContext>) -> CollectorResult<Self> {
        if !descriptor.endpoint.is_defined() {
            return Err(CollectorError::MissingEndpoint(descriptor.id));
        }

        let source = ctx.sources.build(&descriptor).map(Arc::from);
        let logs = match start_logs(&ctx, &descriptor) {
            Ok(logs) => logs,
            Err(e) => {
                if let Some(source) = source {
                    close_source(&ctx, &descriptor.id, source).await;
                }
                return Err(e);
            }
        };

        debug!(
            instance_id = %descriptor.id,
            engine = %descriptor.engine,
            endpoint = %descriptor.endpoint,
            has_source = source.is_some(),
            has_log_tailer = logs.is_some(),
            "collector started"
        );

        Ok(Self {
            ctx,
            state: RwLock::new(EntryState {
                descriptor,
                source,
                logs,
            }),
        })
    }

    /// Apply a newer descriptor for the same instance. Returns `true` if
    /// the endpoint changed and the collaborators were restarted.
    pub async fn update(&self, descriptor: ResourceDescriptor) -> bool {
        let mut state = self.state.write().await;
        if state.descriptor.same_endpoint(&descriptor) {
            state.descriptor = descriptor;
            return false;
        }

        info!(
            instance_id = %descriptor.id,
            from = %state.descriptor.endpoint,
            to = %descriptor.endpoint,
            "endpoint changed, restarting collector"
        );
        self.shutdown_owned(&mut state).await;

        state.source = self.ctx.sources.build(&descriptor).map(Arc::from);
        state.logs = match start_logs(&self.ctx, &descriptor) {
            Ok(logs) => logs,
            Err(e) => {
                warn!(instance_id = %descriptor.id, error = %e, "failed to restart log tailer");
                None
            }
        };
        state.descriptor = descriptor;
        true
    }

    /// Close the metric source and stop the log tailer. Idempotent.
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        self.shutdown_owned(&mut state).await;
    }

    pub async fn descriptor(&self) -> ResourceDescriptor {
        self.state.read().await.descriptor.clone()
    }

    pub async fn has_source(&self) -> bool {
        self.state.read().await.source.is_some()
    }

    pub async fn has_log_tailer(&self) -> bool {
        self.state.read().await.logs.is_some()
    }

    async fn shutdown_owned(&self, state: &mut EntryState) {
        if let Some(logs) = state.logs.take() {
            logs.stop();
        }
        if let Some(source) = state.source.take() {
            close_source(&self.ctx, &state.descriptor.id, source).await;
        }
    }

    async fn host_metrics(&self, descriptor: &ResourceDescriptor) -> Vec<Metric> {
        let Some(host) = &self.ctx.host_metrics else {
            return Vec::new();
        };
        let Some(resource_id) = descriptor.attributes.resource_id.as_deref() else {
            return Vec::new();
        };
        if !descriptor.has_host_telemetry() {
            return Vec::new();
        }

        let started = Instant::now();
        let fetched = tokio::time::timeout(self.ctx.call_timeout, host.fetch_latest_sample(resource_id))
            .await
            .unwrap_or_else(|_| Err(HostMetricsError::Timeout(self.ctx.call_timeout)));
        let sample = match fetched {
            Ok(Some(sample)) => sample,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(instance_id = %descriptor.id, %resource_id, error = %e, "failed to read host metrics");
                return Vec::new();
            }
        };

        match decode_sample(&sample) {
            Ok(metrics) => {
                debug!(
                    instance_id = %descriptor.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "host metrics collected"
                );
                metrics
            }
            Err(e) => {
                warn!(instance_id = %descriptor.id, error = %e, "failed to parse host metrics sample");
                Vec::new()
            }
        }
    }

    fn identity(&self, d: &ResourceDescriptor, ipv4: &str) -> Vec<Metric> {
        let region = self.ctx.region.as_str();
        let a = &d.attributes;
        let port = d.endpoint.port.to_string();
        let mut out = Vec::new();

        match self.ctx.family {
            ResourceFamily::Database => {
                let cluster_id = id_with_region(region, a.cluster_id.as_deref().unwrap_or_default());
                let source_id = id_with_region(region, a.source_instance_id.as_deref().unwrap_or_default());
                out.push(RDS_INFO.sample(
                    1.0,
                    &[
                        region,
                        &a.availability_zone,
                        &d.endpoint.host,
                        ipv4,
                        &port,
                        &d.engine,
                        &a.engine_version,
                        &a.instance_class,
                        &a.storage_type,
                        &a.secondary_availability_zone,
                        &cluster_id,
                        &source_id,
                    ],
                ));
                out.push(RDS_STATUS.sample(1.0, &[&d.status]));

                let capacity = [
                    (&RDS_ALLOCATED_STORAGE, a.allocated_storage_gib),
                    (&RDS_STORAGE_AUTOSCALING_THRESHOLD, a.max_allocated_storage_gib),
                    (&RDS_PROVISIONED_IOPS, a.provisioned_iops),
                    (&RDS_BACKUP_RETENTION, a.backup_retention_days),
                ];
                // Unset capacity values are reported as zero.
                for (desc, value) in capacity {
                    out.push(desc.sample(value.unwrap_or_default() as f64, &[]));
                }
                for replica in &a.read_replica_ids {
                    out.push(RDS_READ_REPLICA_INFO.sample(1.0, &[&id_with_region(region, replica)]));
                }
            }
            ResourceFamily::Cache => {
                let cluster = a
                    .replication_group_id
                    .as_deref()
                    .filter(|g| !g.is_empty())
                    .or(a.cluster_id.as_deref())
                    .unwrap_or_default();
                out.push(CACHE_INFO.sample(
                    1.0,
                    &[
                        region,
                        &a.availability_zone,
                        &d.endpoint.host,
                        ipv4,
                        &port,
                        &d.engine,
                        &a.engine_version,
                        &a.instance_class,
                        cluster,
                    ],
                ));
                out.push(CACHE_STATUS.sample(1.0, &[&d.status]));
            }
        }
        out
    }
}

#[async_trait]
impl Collectable for CollectorEntry {
    async fn collect(&self) -> Vec<Metric> {
        let (descriptor, source, logs) = {
            let state = self.state.read().await;
            (state.descriptor.clone(), state.source.clone(), state.logs.clone())
        };

        let ipv4 = resolve_ipv4(&descriptor, self.ctx.call_timeout).await;
        let mut out = self.identity(&descriptor, &ipv4);

        let engine_metrics = async {
            let Some(source) = source else {
                return Vec::new();
            };
            let started = Instant::now();
            let metrics = source.collect().await;
            debug!(
                instance_id = %descriptor.id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "engine metrics collected"
            );
            metrics
        };
        let (engine, host) = tokio::join!(engine_metrics, self.host_metrics(&descriptor));
        out.extend(engine);
        out.extend(host);

        if let Some(logs) = logs {
            for c in logs.parser.counters().await {
                out.push(RDS_LOG_MESSAGES.sample(c.messages as f64, &[c.level.as_str(), &c.hash, &c.sample]));
            }
        }
        out
    }
}

fn start_logs(ctx: &CollectorContext, descriptor: &ResourceDescriptor) -> CollectorResult<Option<Arc<LogPipeline>>> {
    let Some(settings) = &ctx.logs else {
        return Ok(None);
    };
    if settings.interval.is_zero() || !descriptor.engine_kind().supports_structured_logs() {
        return Ok(None);
    }

    let (parser, sink) = LogParser::start(settings.channel_capacity)?;
    let tailer = LogTailer::new(Arc::clone(&settings.source), descriptor.id.clone(), sink, ctx.call_timeout)
        .spawn(settings.interval);
    Ok(Some(Arc::new(LogPipeline { tailer, parser })))
}

async fn close_source(ctx: &CollectorContext, instance_id: &str, source: Arc<dyn MetricSource>) {
    match tokio::time::timeout(ctx.call_timeout, source.close()).await {
        Ok(Ok(())) => debug!(%instance_id, "metric source closed"),
        Ok(Err(e)) => warn!(%instance_id, error = %e, "failed to close metric source"),
        Err(_) => warn!(%instance_id, "metric source close timed out"),
    }
}

/// First IPv4 address of the endpoint host, or empty on failure.
async fn resolve_ipv4(descriptor: &ResourceDescriptor, timeout: Duration) -> String {
    let endpoint = &descriptor.endpoint;
    let lookup = tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port));
    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(mut addrs)) => addrs
            .find(|a| a.is_ipv4())
            .map(|a| a.ip().to_string())
            .unwrap_or_default(),
        Ok(Err(e)) => {
            warn!(instance_id = %descriptor.id, host = %endpoint.host, error = %e, "failed to resolve endpoint");
            String::new()
        }
        Err(_) => {
            warn!(instance_id = %descriptor.id, host = %endpoint.host, "endpoint lookup timed out");
            String::new()
        }
    }
}
