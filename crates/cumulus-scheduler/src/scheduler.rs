use crate::affinity::{
    avoid_network_node, collect_image_matches, collect_networks_by_node, dedup_names,
    most_matching_images, most_matching_networks, resolve_images,
};
use crate::catalog::{ImageCatalog, InstanceCatalog, StoreCatalog};
use crate::config::SchedulerConfig;
use crate::filter::{apply_filter, default_filters, FilterPredicate};
use crate::metrics::{MetricsCache, MetricsStore};
use crate::network_node::NetworkNodeResolver;
use crate::registry::NodeRegistry;
use crate::types::SchedulingContext;
use crate::{Result, SchedulerError};
use cumulus_core::{object_types, Event, InstanceSpec};
use cumulus_storage::RecordStore;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

const SCHEDULE_OPERATION: &str = "schedule";

/// Placement engine
///
/// Chooses the nodes able to host an instance. Each engine owns its metrics
/// cache and network node resolution; `place` takes `&mut self`, so one
/// engine answers one request at a time. Separate engines don't coordinate.
pub struct Scheduler {
    id: Uuid,
    registry: Arc<NodeRegistry>,
    metrics_store: Arc<dyn MetricsStore>,
    instances: Arc<dyn InstanceCatalog>,
    images: Arc<dyn ImageCatalog>,
    audit: Arc<RecordStore>,
    config: SchedulerConfig,
    filters: Vec<Box<dyn FilterPredicate>>,
    cache: MetricsCache,
    network_node: NetworkNodeResolver,
}

impl Scheduler {
    /// Create a scheduler whose collaborators all live in `store`
    pub fn new(store: Arc<RecordStore>, config: SchedulerConfig) -> Self {
        let registry = Arc::new(NodeRegistry::new(store.clone(), config.node_name.clone()));
        let catalog = Arc::new(StoreCatalog::new(store.clone()));
        let metrics_store = Arc::new(catalog.metrics_store());

        Self::with_collaborators(
            registry,
            metrics_store,
            catalog.clone(),
            catalog,
            store,
            config,
        )
    }

    /// Create a scheduler over explicit collaborators
    pub fn with_collaborators(
        registry: Arc<NodeRegistry>,
        metrics_store: Arc<dyn MetricsStore>,
        instances: Arc<dyn InstanceCatalog>,
        images: Arc<dyn ImageCatalog>,
        audit: Arc<RecordStore>,
        config: SchedulerConfig,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!("Created scheduler {}", id);

        Self {
            id,
            network_node: NetworkNodeResolver::new(config.network_node_ip.clone()),
            registry,
            metrics_store,
            instances,
            images,
            audit,
            config,
            filters: default_filters(),
            cache: MetricsCache::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn cache(&self) -> &MetricsCache {
        &self.cache
    }

    /// Rebuild the metrics cache now, regardless of its age
    pub async fn refresh_metrics(&mut self) -> Result<()> {
        self.cache
            .refresh(&self.registry, self.metrics_store.as_ref())
            .await
    }

    /// Name of the network node, if one is configured and registered
    pub fn network_node(&mut self) -> Result<Option<String>> {
        Ok(self
            .network_node
            .resolve(&self.registry)?
            .map(str::to_string))
    }

    /// Candidate nodes for `instance`, in random order
    ///
    /// `networks` are the network ids the instance will attach to. When
    /// `forced` is non-empty it replaces the cached nodes as the initial
    /// candidates. Never returns an empty list: a stage that eliminates
    /// every candidate fails with [`SchedulerError::CapacityExhausted`].
    pub async fn place(
        &mut self,
        instance: &InstanceSpec,
        networks: &[String],
        forced: Option<&[String]>,
    ) -> Result<Vec<String>> {
        let span = info_span!("schedule", scheduler = %self.id, instance = %instance.uuid);

        async {
            let start = Instant::now();
            self.record(instance, Event::new(&self.config.node_name, SCHEDULE_OPERATION).with_phase("start"));

            let result = self.run_pipeline(instance, networks, forced).await;

            let mut finish = Event::new(&self.config.node_name, SCHEDULE_OPERATION)
                .with_phase("finish")
                .with_duration(start.elapsed().as_secs_f64());
            match &result {
                Ok(candidates) => info!("Placement candidates: {:?}", candidates),
                Err(e) => {
                    warn!("Placement failed: {}", e);
                    finish = finish.with_message(e.to_string());
                }
            }
            self.record(instance, finish);

            result
        }
        .instrument(span)
        .await
    }

    async fn run_pipeline(
        &mut self,
        instance: &InstanceSpec,
        networks: &[String],
        forced: Option<&[String]>,
    ) -> Result<Vec<String>> {
        if self.cache.is_stale(self.config.cache_timeout) {
            debug!(
                "Metrics are {:?} old, max is {:?}. Cache has {} elements.",
                self.cache.age(),
                self.config.cache_timeout,
                self.cache.len()
            );
            self.refresh_metrics().await?;
            debug!("Cache has {} elements after refresh.", self.cache.len());
        }

        let mut candidates = match forced {
            Some(forced) if !forced.is_empty() => {
                self.record_stage(instance, "Forced candidates", forced);
                if let Some(unknown) = forced.iter().find(|n| !self.cache.contains(n)) {
                    return Err(SchedulerError::unknown_candidate(unknown));
                }
                dedup_names(forced)
            }
            _ => self.cache.node_names(),
        };
        self.record_stage(instance, "Initial candidates", &candidates);
        if candidates.is_empty() {
            return Err(SchedulerError::capacity_exhausted("seed", "No nodes with metrics"));
        }

        let context = SchedulingContext::new(instance, &self.config);
        for filter in &self.filters {
            candidates = apply_filter(filter.as_ref(), &context, &candidates, &self.cache);
            self.record_stage(instance, filter.description(), &candidates);
            if candidates.is_empty() {
                return Err(SchedulerError::capacity_exhausted(
                    filter.name(),
                    filter.exhausted_reason(),
                ));
            }
        }

        let network_node = self.network_node()?;

        let requested = dedup_names(networks);
        if !requested.is_empty() {
            let present = collect_networks_by_node(self.instances.as_ref()).await?;
            candidates =
                most_matching_networks(&requested, &candidates, &present, network_node.as_deref());
            self.record_stage(instance, "Have most matching networks", &candidates);
        }

        let urls = resolve_images(self.images.as_ref(), instance.base_images()).await?;
        if !urls.is_empty() {
            let matches = collect_image_matches(self.images.as_ref(), &urls, &candidates).await?;
            candidates = most_matching_images(&candidates, &matches);
        }
        self.record_stage(instance, "Have most matching images", &candidates);

        let before = candidates.len();
        candidates = avoid_network_node(&candidates, network_node.as_deref());
        if candidates.len() != before {
            self.record_stage(instance, "Are non-network nodes", &candidates);
        }

        candidates.shuffle(&mut rand::thread_rng());
        Ok(candidates)
    }

    fn record_stage(&self, instance: &InstanceSpec, stage: &str, candidates: &[String]) {
        info!("Scheduling: {}: {:?}", stage, candidates);
        self.record(
            instance,
            Event::new(&self.config.node_name, SCHEDULE_OPERATION)
                .with_phase(stage)
                .with_message(format!("{:?}", candidates)),
        );
    }

    fn record(&self, instance: &InstanceSpec, event: Event) {
        if let Err(e) = self
            .audit
            .add_event(object_types::INSTANCE, &instance.uuid, &event)
        {
            warn!("Failed to record event for instance {}: {}", instance.uuid, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RecordMetricsStore;
    use cumulus_core::resources::quantities::BYTES_PER_GIB;
    use cumulus_core::{
        metric_names, DiskSpec, ImageRecord, ImageState, NetworkInterface, NodeMetrics, Placement,
    };
    use cumulus_storage::MemoryBackend;
    use std::collections::HashSet;
    use std::time::Duration;

    struct Cluster {
        store: Arc<RecordStore>,
        registry: NodeRegistry,
        metrics: RecordMetricsStore,
    }

    impl Cluster {
        fn new() -> Self {
            let store = Arc::new(RecordStore::new(Arc::new(MemoryBackend::new())));
            Self {
                registry: NodeRegistry::new(store.clone(), "sf-1"),
                metrics: RecordMetricsStore::new(store.clone()),
                store,
            }
        }

        fn add_node(&self, name: &str, ip: &str, metrics: NodeMetrics) {
            self.registry.register(name, ip).unwrap();
            self.metrics.publish_metrics(name, &metrics).unwrap();
        }

        fn place_instance(&self, uuid: &str, node: &str, networks: &[&str]) {
            let spec = InstanceSpec {
                uuid: uuid.to_string(),
                cpus: 1,
                memory: 1024,
                placement: Some(Placement {
                    node: Some(node.to_string()),
                }),
                ..Default::default()
            };
            self.store.save(object_types::INSTANCE, uuid, &spec).unwrap();

            for (i, network) in networks.iter().enumerate() {
                let iface_uuid = format!("{}-if{}", uuid, i);
                let iface = NetworkInterface {
                    uuid: iface_uuid.clone(),
                    instance_uuid: uuid.to_string(),
                    network_uuid: network.to_string(),
                };
                self.store
                    .save(object_types::NETWORK_INTERFACE, &iface_uuid, &iface)
                    .unwrap();
            }
        }

        fn cache_image(&self, uuid: &str, url: &str, node: &str) {
            let image = ImageRecord {
                uuid: uuid.to_string(),
                url: url.to_string(),
                node: node.to_string(),
                state: ImageState::Created,
            };
            self.store.save(object_types::IMAGE, uuid, &image).unwrap();
        }

        fn scheduler(&self, config: SchedulerConfig) -> Scheduler {
            Scheduler::new(self.store.clone(), config)
        }
    }

    fn roomy() -> NodeMetrics {
        NodeMetrics::new()
            .with(metric_names::CPU_MAX, 16.0)
            .with(metric_names::CPU_MAX_PER_INSTANCE, 16.0)
            .with(metric_names::CPU_TOTAL_INSTANCE_VCPUS, 8.0)
            .with(metric_names::MEMORY_AVAILABLE, 65536.0)
            .with(metric_names::MEMORY_MAX, 131072.0)
            .with(metric_names::MEMORY_TOTAL_INSTANCE_ACTUAL, 16384.0)
            .with(metric_names::DISK_FREE, 1000.0 * BYTES_PER_GIB)
    }

    fn request(cpus: u32, memory: u64, disks: Vec<DiskSpec>) -> InstanceSpec {
        InstanceSpec {
            uuid: "new-instance".to_string(),
            name: "test".to_string(),
            cpus,
            memory,
            disk_spec: disks,
            placement: None,
        }
    }

    fn disk(size: Option<u64>, base: Option<&str>) -> DiskSpec {
        DiskSpec {
            size,
            base: base.map(str::to_string),
        }
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            node_name: "sf-1".to_string(),
            network_node_ip: "10.0.0.254".to_string(),
            ..Default::default()
        }
    }

    fn sorted(mut nodes: Vec<String>) -> Vec<String> {
        nodes.sort();
        nodes
    }

    #[tokio::test]
    async fn test_place_on_sole_roomy_node() {
        let cluster = Cluster::new();
        cluster.add_node("sf-1", "10.0.0.1", roomy());

        let mut scheduler = cluster.scheduler(config());
        let result = scheduler
            .place(&request(2, 4096, vec![disk(Some(20), None)]), &[], None)
            .await
            .unwrap();

        assert_eq!(result, vec!["sf-1"]);
    }

    #[tokio::test]
    async fn test_forced_candidate_without_metrics() {
        let cluster = Cluster::new();
        cluster.add_node("sf-1", "10.0.0.1", roomy());

        let mut scheduler = cluster.scheduler(config());
        let forced = vec!["node-x".to_string()];
        let err = scheduler
            .place(&request(2, 4096, vec![]), &[], Some(&forced))
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::UnknownCandidate { ref node } if node == "node-x"));
    }

    #[tokio::test]
    async fn test_forced_candidates_restrict_seed() {
        let cluster = Cluster::new();
        cluster.add_node("sf-1", "10.0.0.1", roomy());
        cluster.add_node("sf-2", "10.0.0.2", roomy());

        let mut scheduler = cluster.scheduler(config());
        let forced = vec!["sf-2".to_string()];
        let result = scheduler
            .place(&request(1, 1024, vec![]), &[], Some(&forced))
            .await
            .unwrap();

        assert_eq!(result, vec!["sf-2"]);
    }

    #[tokio::test]
    async fn test_repeated_forced_candidate_placed_once() {
        let cluster = Cluster::new();
        cluster.add_node("sf-1", "10.0.0.1", roomy());
        cluster.add_node("sf-2", "10.0.0.2", roomy());

        let mut scheduler = cluster.scheduler(config());
        let forced = vec!["sf-1".to_string(), "sf-1".to_string()];
        let result = scheduler
            .place(&request(1, 1024, vec![]), &[], Some(&forced))
            .await
            .unwrap();

        assert_eq!(result, vec!["sf-1"]);
    }

    #[tokio::test]
    async fn test_disk_exhaustion() {
        let cluster = Cluster::new();
        cluster.add_node(
            "sf-1",
            "10.0.0.1",
            roomy().with(metric_names::DISK_FREE, 10.0 * BYTES_PER_GIB),
        );

        let mut scheduler = cluster.scheduler(config());
        let err = scheduler
            .place(&request(1, 1024, vec![disk(Some(8), None), disk(Some(8), None)]), &[], None)
            .await
            .unwrap_err();

        match err {
            SchedulerError::CapacityExhausted { stage, reason } => {
                assert_eq!(stage, "disk_headroom");
                assert_eq!(reason, "No nodes with enough disk space");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_disks_do_not_wrap() {
        let cluster = Cluster::new();
        cluster.add_node(
            "sf-1",
            "10.0.0.1",
            roomy().with(metric_names::DISK_FREE, 10.0 * BYTES_PER_GIB),
        );

        let mut scheduler = cluster.scheduler(config());
        let disks = vec![disk(Some(u64::MAX), None), disk(Some(2), None)];
        let err = scheduler
            .place(&request(1, 1024, disks), &[], None)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some("disk_headroom"));
    }

    #[tokio::test]
    async fn test_no_nodes_with_metrics() {
        let cluster = Cluster::new();
        cluster.registry.register("sf-1", "10.0.0.1").unwrap();

        let mut scheduler = cluster.scheduler(config());
        let err = scheduler.place(&request(1, 1024, vec![]), &[], None).await.unwrap_err();

        assert_eq!(err.stage(), Some("seed"));
    }

    #[tokio::test]
    async fn test_first_emptying_stage_is_reported() {
        let cluster = Cluster::new();
        // Fails both CPU headroom and RAM headroom; CPU comes first
        cluster.add_node(
            "sf-1",
            "10.0.0.1",
            roomy()
                .with(metric_names::CPU_TOTAL_INSTANCE_VCPUS, 256.0)
                .with(metric_names::MEMORY_AVAILABLE, 0.0),
        );

        let mut scheduler = cluster.scheduler(config());
        let err = scheduler.place(&request(1, 1024, vec![]), &[], None).await.unwrap_err();

        assert_eq!(err.stage(), Some("cpu_headroom"));
    }

    #[tokio::test]
    async fn test_network_node_avoided() {
        let cluster = Cluster::new();
        cluster.add_node("sf-1", "10.0.0.1", roomy());
        cluster.add_node("sf-net", "10.0.0.254", roomy());

        let mut scheduler = cluster.scheduler(config());
        let result = scheduler.place(&request(1, 1024, vec![]), &[], None).await.unwrap();

        assert_eq!(result, vec!["sf-1"]);
        assert_eq!(scheduler.network_node().unwrap().as_deref(), Some("sf-net"));
    }

    #[tokio::test]
    async fn test_network_node_used_when_alone() {
        let cluster = Cluster::new();
        cluster.add_node("sf-1", "10.0.0.1", roomy().with(metric_names::CPU_MAX_PER_INSTANCE, 1.0));
        cluster.add_node("sf-net", "10.0.0.254", roomy());

        let mut scheduler = cluster.scheduler(config());
        let result = scheduler.place(&request(4, 1024, vec![]), &[], None).await.unwrap();

        assert_eq!(result, vec!["sf-net"]);
    }

    #[tokio::test]
    async fn test_network_affinity_narrows_to_most_matches() {
        let cluster = Cluster::new();
        for (name, ip) in [("sf-1", "10.0.0.1"), ("sf-2", "10.0.0.2"), ("sf-3", "10.0.0.3")] {
            cluster.add_node(name, ip, roomy());
        }
        cluster.place_instance("i-1", "sf-1", &["net-a", "net-b"]);
        cluster.place_instance("i-2", "sf-2", &["net-a"]);
        cluster.place_instance("i-3", "sf-3", &["net-z"]);

        let mut scheduler = cluster.scheduler(config());
        let networks = vec!["net-a".to_string(), "net-b".to_string(), "net-a".to_string()];
        let result = scheduler
            .place(&request(1, 1024, vec![]), &networks, None)
            .await
            .unwrap();

        assert_eq!(result, vec!["sf-1"]);
    }

    #[tokio::test]
    async fn test_network_node_alone_in_best_bucket_is_no_preference() {
        let cluster = Cluster::new();
        cluster.add_node("sf-1", "10.0.0.1", roomy());
        cluster.add_node("sf-2", "10.0.0.2", roomy());
        cluster.add_node("sf-net", "10.0.0.254", roomy());
        cluster.place_instance("router", "sf-net", &["net-a"]);

        let mut scheduler = cluster.scheduler(config());
        let result = scheduler
            .place(&request(1, 1024, vec![]), &["net-a".to_string()], None)
            .await
            .unwrap();

        // Unchanged by network affinity, then the network node is avoided
        assert_eq!(sorted(result), vec!["sf-1", "sf-2"]);
    }

    #[tokio::test]
    async fn test_image_affinity_over_all_disks() {
        let cluster = Cluster::new();
        for (name, ip) in [("sf-1", "10.0.0.1"), ("sf-2", "10.0.0.2"), ("sf-3", "10.0.0.3")] {
            cluster.add_node(name, ip, roomy());
        }
        cluster.cache_image("img-1", "http://images/debian", "sf-1");
        cluster.cache_image("img-2", "http://images/debian", "sf-2");
        cluster.cache_image("img-3", "http://images/cirros", "sf-2");

        let mut scheduler = cluster.scheduler(config());
        let spec = request(
            1,
            1024,
            vec![
                disk(Some(10), Some("http://images/debian")),
                disk(None, Some("http://images/cirros")),
            ],
        );
        let result = scheduler.place(&spec, &[], None).await.unwrap();

        assert_eq!(result, vec!["sf-2"]);
    }

    #[tokio::test]
    async fn test_image_affinity_without_copies_keeps_all() {
        let cluster = Cluster::new();
        cluster.add_node("sf-1", "10.0.0.1", roomy());
        cluster.add_node("sf-2", "10.0.0.2", roomy());

        let mut scheduler = cluster.scheduler(config());
        let spec = request(1, 1024, vec![disk(Some(10), Some("http://images/debian"))]);
        let result = scheduler.place(&spec, &[], None).await.unwrap();

        assert_eq!(sorted(result), vec!["sf-1", "sf-2"]);
    }

    #[tokio::test]
    async fn test_results_satisfy_filters_and_are_stable_as_a_set() {
        let cluster = Cluster::new();
        cluster.add_node("sf-1", "10.0.0.1", roomy());
        cluster.add_node("sf-2", "10.0.0.2", roomy());
        cluster.add_node("sf-3", "10.0.0.3", roomy().with(metric_names::MEMORY_AVAILABLE, 1024.0));
        cluster.add_node("sf-4", "10.0.0.4", roomy());

        let mut scheduler = cluster.scheduler(config());
        let spec = request(2, 4096, vec![disk(Some(20), None)]);
        let context_config = scheduler.config().clone();

        let mut seen = HashSet::new();
        for _ in 0..5 {
            let result = scheduler.place(&spec, &[], None).await.unwrap();
            assert!(!result.is_empty());

            let context = SchedulingContext::new(&spec, &context_config);
            for node in &result {
                let metrics = scheduler.cache().get(node).unwrap();
                for filter in default_filters() {
                    assert!(filter.filter(&context, node, metrics).passed);
                }
            }
            seen.insert(sorted(result));
        }

        assert_eq!(seen.len(), 1);
        assert!(seen.contains(&vec!["sf-1".to_string(), "sf-2".to_string(), "sf-4".to_string()]));
    }

    #[tokio::test]
    async fn test_fresh_cache_is_reused() {
        let cluster = Cluster::new();
        cluster.add_node("sf-1", "10.0.0.1", roomy());

        let mut scheduler = cluster.scheduler(config());
        scheduler.place(&request(1, 1024, vec![]), &[], None).await.unwrap();

        cluster.add_node("sf-2", "10.0.0.2", roomy());
        let result = scheduler.place(&request(1, 1024, vec![]), &[], None).await.unwrap();

        assert_eq!(result, vec!["sf-1"]);
    }

    #[tokio::test]
    async fn test_stale_cache_is_refreshed() {
        let cluster = Cluster::new();
        cluster.add_node("sf-1", "10.0.0.1", roomy());

        let mut scheduler = cluster.scheduler(SchedulerConfig {
            cache_timeout: Duration::from_millis(1),
            ..config()
        });
        scheduler.place(&request(1, 1024, vec![]), &[], None).await.unwrap();

        cluster.add_node("sf-2", "10.0.0.2", roomy());
        tokio::time::sleep(Duration::from_millis(10)).await;
        let result = scheduler.place(&request(1, 1024, vec![]), &[], None).await.unwrap();

        assert_eq!(sorted(result), vec!["sf-1", "sf-2"]);
    }

    #[tokio::test]
    async fn test_place_records_audit_trail() {
        let cluster = Cluster::new();
        cluster.add_node("sf-1", "10.0.0.1", roomy());

        let mut scheduler = cluster.scheduler(config());
        let spec = request(1, 1024, vec![]);
        scheduler.place(&spec, &[], None).await.unwrap();

        let events = cluster.store.events(object_types::INSTANCE, &spec.uuid).unwrap();
        assert!(events.iter().all(|e| e.operation == "schedule"));

        let phases: Vec<_> = events.iter().filter_map(|e| e.phase.as_deref()).collect();
        assert_eq!(
            phases,
            vec![
                "start",
                "Initial candidates",
                "Have enough actual CPU",
                "Have enough idle CPU",
                "Have enough idle RAM",
                "Have enough idle disk",
                "Have most matching images",
                "finish",
            ]
        );

        let finish = events.last().unwrap();
        assert!(finish.duration.is_some());
        assert!(finish.message.is_none());
    }
}
