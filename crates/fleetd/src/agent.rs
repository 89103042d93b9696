//! Agent assembly: one reconciler per enabled family, all sharing one
//! registry and one shutdown signal.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span};

use fleet_collector::descs::AGENT_INFO;
use fleet_collector::{
    CollectorContext, DirHostMetrics, EngineSourceFactory, HostMetricsSource, LogSettings, SourceSettings,
};
use fleet_core::{AgentSettings, CacheSettings, DatabaseSettings, ResourceFamily, TagFilter};
use fleet_logs::DirLogSource;
use fleet_metrics::{Collectable, Metric, Registry};
use fleet_reconciler::{FleetReconciler, InventoryDiscovery, Paginated};

/// `aws_agent_info{version}`, registered once without an instance scope.
pub struct AgentInfo {
    version: &'static str,
}

impl AgentInfo {
    pub fn new(version: &'static str) -> Self {
        Self { version }
    }
}

#[async_trait]
impl Collectable for AgentInfo {
    async fn collect(&self) -> Vec<Metric> {
        vec![AGENT_INFO.sample(1.0, &[self.version])]
    }
}

pub fn database_context(settings: &AgentSettings, db: &DatabaseSettings) -> CollectorContext {
    let sources = EngineSourceFactory::new(SourceSettings {
        credentials: Some(db.credentials.clone()),
        connect_timeout: db.connect_timeout,
        query_timeout: db.query_timeout,
        scrape_interval: db.scrape_interval,
    });

    let logs = db.log_dir.as_ref().map(|dir| LogSettings {
        source: Arc::new(DirLogSource::new(dir)),
        interval: db.logs_scrape_interval,
        channel_capacity: db.log_channel_capacity,
    });

    let host_metrics = db
        .host_metrics_dir
        .as_ref()
        .map(|dir| Arc::new(DirHostMetrics::new(dir)) as Arc<dyn HostMetricsSource>);

    CollectorContext {
        family: ResourceFamily::Database,
        region: settings.region.clone(),
        sources: Arc::new(sources),
        logs,
        host_metrics,
        call_timeout: settings.api_timeout,
    }
}

pub fn cache_context(settings: &AgentSettings, cache: &CacheSettings) -> CollectorContext {
    let sources = EngineSourceFactory::new(SourceSettings {
        credentials: cache.credentials.clone(),
        connect_timeout: cache.connect_timeout,
        query_timeout: settings.api_timeout,
        ..SourceSettings::default()
    });

    CollectorContext {
        family: ResourceFamily::Cache,
        region: settings.region.clone(),
        sources: Arc::new(sources),
        logs: None,
        host_metrics: None,
        call_timeout: settings.api_timeout,
    }
}

/// Start the reconciler of every enabled family.
pub fn spawn_reconcilers(
    settings: &AgentSettings,
    registry: &Registry,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if let Some(db) = &settings.database {
        let discovery = InventoryDiscovery::new(&db.inventory, db.page_size);
        handles.push(spawn_family(
            settings,
            database_context(settings, db),
            discovery,
            db.filter.clone(),
            registry,
            shutdown,
        ));
    }

    if let Some(cache) = &settings.cache {
        let discovery = InventoryDiscovery::new(&cache.inventory, cache.page_size);
        handles.push(spawn_family(
            settings,
            cache_context(settings, cache),
            discovery,
            cache.filter.clone(),
            registry,
            shutdown,
        ));
    }

    handles
}

fn spawn_family(
    settings: &AgentSettings,
    ctx: CollectorContext,
    discovery: InventoryDiscovery,
    filter: TagFilter,
    registry: &Registry,
    shutdown: &watch::Receiver<bool>,
) -> JoinHandle<()> {
    let family = ctx.family;
    info!(
        %family,
        inventory = %discovery.path().display(),
        %filter,
        "starting discovery"
    );

    let mut reconciler = FleetReconciler::new(
        Arc::new(Paginated::new(discovery)),
        registry.clone(),
        Arc::new(ctx),
        filter,
        settings.api_timeout,
    );
    let interval = settings.discovery_interval;
    let shutdown = shutdown.clone();

    tokio::spawn(
        async move { reconciler.run(interval, shutdown).await }
            .instrument(info_span!("reconciler", %family)),
    )
}
