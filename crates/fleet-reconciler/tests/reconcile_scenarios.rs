//! End-to-end reconciliation scenarios against a scripted discovery
//! backend and counting metric sources.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use fleet_collector::{CollectorContext, MetricSource, MetricSourceFactory, SourceResult};
use fleet_core::{Endpoint, ResourceDescriptor, ResourceFamily, TagFilter};
use fleet_metrics::{Collectable, Desc, Metric, Registry, Scope};
use fleet_reconciler::{Discovery, DiscoveryError, DiscoveryResult, FleetReconciler};

const REGION: &str = "us-east-1";
const TEST_UP: Desc = Desc::gauge("test_up", "Scripted source", &["port"]);

// ── Collaborators ──────────────────────────────────────────────────

struct Script {
    instances: Result<Vec<ResourceDescriptor>, String>,
    tags: HashMap<String, HashMap<String, String>>,
    failing_tags: Vec<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            instances: Ok(Vec::new()),
            tags: HashMap::new(),
            failing_tags: Vec::new(),
        }
    }
}

#[derive(Default)]
struct ScriptedDiscovery {
    script: Mutex<Script>,
    tag_calls: AtomicUsize,
}

impl ScriptedDiscovery {
    fn set(&self, instances: Vec<ResourceDescriptor>) {
        self.script.lock().unwrap().instances = Ok(instances);
    }

    fn fail(&self, msg: &str) {
        self.script.lock().unwrap().instances = Err(msg.to_string());
    }

    fn tag(&self, id: &str, key: &str, value: &str) {
        self.script
            .lock()
            .unwrap()
            .tags
            .entry(id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    fn fail_tags_for(&self, id: &str) {
        self.script.lock().unwrap().failing_tags.push(id.to_string());
    }
}

#[async_trait]
impl Discovery for ScriptedDiscovery {
    async fn list_instances(&self) -> DiscoveryResult<Vec<ResourceDescriptor>> {
        self.script
            .lock()
            .unwrap()
            .instances
            .clone()
            .map_err(DiscoveryError::Api)
    }

    async fn list_tags(&self, instance_id: &str) -> DiscoveryResult<HashMap<String, String>> {
        self.tag_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap();
        if script.failing_tags.iter().any(|id| id == instance_id) {
            return Err(DiscoveryError::Api("throttled".into()));
        }
        Ok(script.tags.get(instance_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct Counts {
    built: AtomicUsize,
    closed: AtomicUsize,
}

struct CountingSource {
    port: u16,
    counts: Arc<Counts>,
}

#[async_trait]
impl MetricSource for CountingSource {
    async fn collect(&self) -> Vec<Metric> {
        vec![TEST_UP.sample(1.0, &[&self.port.to_string()])]
    }

    async fn close(&self) -> SourceResult<()> {
        self.counts.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct CountingFactory {
    counts: Arc<Counts>,
}

impl MetricSourceFactory for CountingFactory {
    fn build(&self, d: &ResourceDescriptor) -> Option<Box<dyn MetricSource>> {
        self.counts.built.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(CountingSource {
            port: d.endpoint.port,
            counts: Arc::clone(&self.counts),
        }))
    }
}

struct Squatter;

#[async_trait]
impl Collectable for Squatter {
    async fn collect(&self) -> Vec<Metric> {
        Vec::new()
    }
}

// ── Harness ────────────────────────────────────────────────────────

struct Harness {
    discovery: Arc<ScriptedDiscovery>,
    counts: Arc<Counts>,
    registry: Registry,
    reconciler: FleetReconciler,
}

impl Harness {
    fn new(filter: &[(&str, &str)]) -> Self {
        let rules: HashMap<String, String> = filter
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let filter = TagFilter::new(&rules).unwrap();

        let discovery = Arc::new(ScriptedDiscovery::default());
        let factory = Arc::new(CountingFactory::default());
        let counts = Arc::clone(&factory.counts);
        let registry = Registry::new();
        let ctx = Arc::new(CollectorContext {
            family: ResourceFamily::Database,
            region: REGION.to_string(),
            sources: factory,
            logs: None,
            host_metrics: None,
            call_timeout: Duration::from_secs(1),
        });

        let reconciler = FleetReconciler::new(
            discovery.clone(),
            registry.clone(),
            ctx,
            filter,
            Duration::from_secs(5),
        );

        Self {
            discovery,
            counts,
            registry,
            reconciler,
        }
    }

    fn built(&self) -> usize {
        self.counts.built.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.counts.closed.load(Ordering::SeqCst)
    }
}

fn instance(id: &str, engine: &str, port: u16) -> ResourceDescriptor {
    ResourceDescriptor::new(id, engine, Endpoint::new("127.0.0.1", port))
}

fn scope(id: &str) -> Scope {
    Scope::new("rds_instance_id", format!("{REGION}/{id}"))
}

// ── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn add_restart_and_remove_across_cycles() {
    let mut h = Harness::new(&[]);

    h.discovery
        .set(vec![instance("a", "postgres", 5432), instance("b", "redis", 6379)]);
    let report = h.reconciler.reconcile().await.unwrap();
    assert_eq!(report.added, 2);
    assert_eq!(h.built(), 2);
    assert_eq!(h.reconciler.tracked_ids(), vec!["a", "b"]);
    assert!(h.registry.is_registered(&scope("a")).await);
    assert!(h.registry.is_registered(&scope("b")).await);

    // a moves, b disappears, c appears.
    h.discovery
        .set(vec![instance("a", "postgres", 5433), instance("c", "mysql", 3306)]);
    let report = h.reconciler.reconcile().await.unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(report.restarted, 1);
    assert_eq!(report.updated, 0);

    // Old a source and b source closed; new a source and c source built.
    assert_eq!(h.built(), 4);
    assert_eq!(h.closed(), 2);
    assert_eq!(h.reconciler.tracked_ids(), vec!["a", "c"]);
    assert!(h.registry.is_registered(&scope("a")).await);
    assert!(!h.registry.is_registered(&scope("b")).await);
    assert!(h.registry.is_registered(&scope("c")).await);
    assert_eq!(h.registry.len().await, 2);

    // The restarted collector reports from the new port under the same scope.
    let gathered = h.registry.gather().await;
    let ports: Vec<_> = gathered
        .iter()
        .filter(|m| m.name == "test_up" && m.label("rds_instance_id") == Some("us-east-1/a"))
        .filter_map(|m| m.label("port"))
        .collect();
    assert_eq!(ports, vec!["5433"]);
    assert!(
        gathered
            .iter()
            .all(|m| m.label("rds_instance_id") != Some("us-east-1/b"))
    );
}

#[tokio::test]
async fn unchanged_fleet_is_a_no_op() {
    let mut h = Harness::new(&[]);
    let fleet = vec![instance("a", "postgres", 5432), instance("b", "redis", 6379)];

    h.discovery.set(fleet.clone());
    h.reconciler.reconcile().await.unwrap();

    h.discovery.set(fleet);
    let report = h.reconciler.reconcile().await.unwrap();
    assert_eq!(report.added, 0);
    assert_eq!(report.removed, 0);
    assert_eq!(report.restarted, 0);
    assert_eq!(report.updated, 2);
    assert_eq!(h.built(), 2);
    assert_eq!(h.closed(), 0);
}

#[tokio::test]
async fn discovery_failure_keeps_tracked_state() {
    let mut h = Harness::new(&[]);
    h.discovery.set(vec![instance("a", "postgres", 5432)]);
    h.reconciler.reconcile().await.unwrap();

    h.discovery.fail("service unavailable");
    let err = h.reconciler.reconcile().await.unwrap_err();
    assert!(matches!(err, DiscoveryError::Api(_)));

    assert_eq!(h.reconciler.tracked_ids(), vec!["a"]);
    assert!(h.registry.is_registered(&scope("a")).await);
    assert_eq!(h.closed(), 0);
}

#[tokio::test]
async fn empty_listing_removes_everything() {
    let mut h = Harness::new(&[]);
    h.discovery
        .set(vec![instance("a", "postgres", 5432), instance("b", "redis", 6379)]);
    h.reconciler.reconcile().await.unwrap();

    h.discovery.set(Vec::new());
    let report = h.reconciler.reconcile().await.unwrap();
    assert_eq!(report.removed, 2);
    assert!(h.reconciler.tracked_ids().is_empty());
    assert!(h.registry.is_empty().await);
    assert_eq!(h.closed(), 2);
}

#[tokio::test]
async fn tag_filter_selects_instances() {
    let mut h = Harness::new(&[("env", "prod*")]);
    h.discovery.tag("a", "env", "production");
    h.discovery.tag("b", "env", "staging");
    h.discovery.set(vec![
        instance("a", "postgres", 5432),
        instance("b", "postgres", 5433),
        instance("c", "postgres", 5434),
    ]);

    let report = h.reconciler.reconcile().await.unwrap();
    assert_eq!(report.filtered_out, 2);
    assert_eq!(h.reconciler.tracked_ids(), vec!["a"]);
    assert_eq!(h.discovery.tag_calls.load(Ordering::SeqCst), 3);

    // Retagging takes effect on the next cycle.
    h.discovery.tag("a", "env", "dev");
    h.reconciler.reconcile().await.unwrap();
    assert!(h.reconciler.tracked_ids().is_empty());
    assert!(h.registry.is_empty().await);
}

#[tokio::test]
async fn tag_lookup_failure_counts_as_untagged() {
    let mut h = Harness::new(&[("team", "*")]);
    h.discovery.fail_tags_for("a");
    h.discovery.set(vec![instance("a", "postgres", 5432)]);

    h.reconciler.reconcile().await.unwrap();
    assert_eq!(h.reconciler.tracked_ids(), vec!["a"]);

    let mut strict = Harness::new(&[("team", "payments")]);
    strict.discovery.fail_tags_for("a");
    strict.discovery.set(vec![instance("a", "postgres", 5432)]);
    strict.reconciler.reconcile().await.unwrap();
    assert!(strict.reconciler.tracked_ids().is_empty());
}

#[tokio::test]
async fn tags_are_not_fetched_without_a_filter() {
    let mut h = Harness::new(&[]);
    h.discovery.set(vec![instance("a", "postgres", 5432)]);
    h.reconciler.reconcile().await.unwrap();
    assert_eq!(h.discovery.tag_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_start_is_retried_next_cycle() {
    let mut h = Harness::new(&[]);
    let pending = ResourceDescriptor::new("a", "postgres", Endpoint::default());
    h.discovery.set(vec![pending]);

    let report = h.reconciler.reconcile().await.unwrap();
    assert_eq!(report.failed, 1);
    assert!(h.reconciler.tracked_ids().is_empty());
    assert!(h.registry.is_empty().await);

    h.discovery.set(vec![instance("a", "postgres", 5432)]);
    let report = h.reconciler.reconcile().await.unwrap();
    assert_eq!(report.added, 1);
    assert!(h.registry.is_registered(&scope("a")).await);
}

#[tokio::test]
async fn taken_scope_skips_instance_and_closes_it() {
    let mut h = Harness::new(&[]);
    h.registry
        .register(scope("a"), Arc::new(Squatter))
        .await
        .unwrap();
    h.discovery.set(vec![instance("a", "postgres", 5432)]);

    let report = h.reconciler.reconcile().await.unwrap();
    assert_eq!(report.failed, 1);
    assert!(!h.reconciler.is_tracked("a"));
    assert_eq!(h.built(), 1);
    assert_eq!(h.closed(), 1);

    // Still retried on the following cycle.
    h.reconciler.reconcile().await.unwrap();
    assert_eq!(h.built(), 2);
    assert!(!h.reconciler.is_tracked("a"));
}

#[tokio::test]
async fn duplicate_ids_in_one_listing_are_tracked_once() {
    let mut h = Harness::new(&[]);
    h.discovery
        .set(vec![instance("a", "postgres", 5432), instance("a", "postgres", 5432)]);

    let report = h.reconciler.reconcile().await.unwrap();
    assert_eq!(report.discovered, 1);
    assert_eq!(report.added, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(h.built(), 1);
}

#[tokio::test]
async fn arn_ids_take_their_region_from_the_arn() {
    let mut h = Harness::new(&[]);
    h.discovery
        .set(vec![instance("arn:aws:rds:eu-west-1:123456789012:db:orders", "postgres", 5432)]);
    h.reconciler.reconcile().await.unwrap();

    assert!(
        h.registry
            .is_registered(&Scope::new("rds_instance_id", "eu-west-1/orders"))
            .await
    );
}

#[tokio::test]
async fn run_releases_everything_on_shutdown() {
    let Harness {
        discovery,
        counts,
        registry,
        mut reconciler,
    } = Harness::new(&[]);
    discovery.set(vec![instance("a", "postgres", 5432), instance("b", "redis", 6379)]);

    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        reconciler.run(Duration::from_secs(3600), rx).await;
        reconciler
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while registry.len().await < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    tx.send(true).unwrap();
    let reconciler = task.await.unwrap();

    assert!(reconciler.tracked_ids().is_empty());
    assert!(registry.is_empty().await);
    assert_eq!(counts.closed.load(Ordering::SeqCst), 2);
}
