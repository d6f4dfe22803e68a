use crate::metrics::MetricsCache;
use crate::types::{FilterResult, SchedulingContext};
use cumulus_core::resources::quantities::{bytes_to_gib, gib_to_mib};
use cumulus_core::NodeMetrics;
use tracing::debug;

/// Filter predicate trait
///
/// Predicates are pure: the verdict depends only on the request, the
/// configured limits and the node's cached metrics.
pub trait FilterPredicate: Send + Sync {
    /// Filter a node for the given instance
    fn filter(&self, context: &SchedulingContext<'_>, node: &str, metrics: &NodeMetrics) -> FilterResult;

    /// Stage name reported when the filter empties the candidate set
    fn name(&self) -> &str;

    /// Event text for the survivors
    fn description(&self) -> &str;

    /// Capacity failure reason when no node passes
    fn exhausted_reason(&self) -> &str;
}

/// Filter for the largest instance a node accepts
pub struct MaxCpuPerInstance;

impl FilterPredicate for MaxCpuPerInstance {
    fn filter(&self, context: &SchedulingContext<'_>, node: &str, metrics: &NodeMetrics) -> FilterResult {
        let requested = f64::from(context.instance.cpus);
        let limit = metrics.cpu_max_per_instance();

        if requested > limit {
            return FilterResult::fail(
                node,
                format!("{} vCPUs requested, per-instance limit is {}", requested, limit),
            );
        }
        FilterResult::pass(node)
    }

    fn name(&self) -> &str {
        "cpu_per_instance"
    }

    fn description(&self) -> &str {
        "Have enough actual CPU"
    }

    fn exhausted_reason(&self) -> &str {
        "Requested vCPUs exceeds vCPU limit"
    }
}

/// Filter for overcommitted vCPU headroom
pub struct CpuHeadroom;

impl FilterPredicate for CpuHeadroom {
    fn filter(&self, context: &SchedulingContext<'_>, node: &str, metrics: &NodeMetrics) -> FilterResult {
        let limit = metrics.cpu_max() * context.config.cpu_overcommit_ratio;
        let wanted = metrics.cpu_total_instance_vcpus() + f64::from(context.instance.cpus);

        if wanted > limit {
            return FilterResult::fail(
                node,
                format!("Would commit {} vCPUs, limit is {}", wanted, limit),
            );
        }
        FilterResult::pass(node)
    }

    fn name(&self) -> &str {
        "cpu_headroom"
    }

    fn description(&self) -> &str {
        "Have enough idle CPU"
    }

    fn exhausted_reason(&self) -> &str {
        "No nodes with enough idle CPU"
    }
}

/// Filter for free memory and the memory overcommit ceiling
///
/// The host reservation is subtracted from free memory without assuming any
/// overlap with memory already used by instances.
pub struct RamHeadroom;

impl FilterPredicate for RamHeadroom {
    fn filter(&self, context: &SchedulingContext<'_>, node: &str, metrics: &NodeMetrics) -> FilterResult {
        let requested = context.instance.memory as f64;
        let reserved = gib_to_mib(context.config.ram_system_reservation_gb);

        let available = metrics.memory_available() - reserved;
        if available < requested {
            return FilterResult::fail(
                node,
                format!(
                    "Insufficient memory: requested {} MiB, available {} MiB after reservation",
                    requested, available
                ),
            );
        }

        let capacity = metrics.memory_max();
        if capacity <= 0.0 {
            return FilterResult::fail(node, "No memory capacity reported");
        }

        let ratio = (metrics.memory_total_instance_actual() + requested) / capacity;
        if ratio > context.config.ram_overcommit_ratio {
            return FilterResult::fail(
                node,
                format!(
                    "Memory overcommit {:.2} exceeds ratio {}",
                    ratio, context.config.ram_overcommit_ratio
                ),
            );
        }

        FilterResult::pass(node)
    }

    fn name(&self) -> &str {
        "ram_headroom"
    }

    fn description(&self) -> &str {
        "Have enough idle RAM"
    }

    fn exhausted_reason(&self) -> &str {
        "No nodes with enough idle RAM"
    }
}

/// Filter for free instance disk
pub struct DiskHeadroom;

impl FilterPredicate for DiskHeadroom {
    fn filter(&self, context: &SchedulingContext<'_>, node: &str, metrics: &NodeMetrics) -> FilterResult {
        let requested = context.instance.requested_disk_gb() as f64;
        let free = bytes_to_gib(metrics.disk_free());

        if requested > free {
            return FilterResult::fail(
                node,
                format!(
                    "Insufficient disk: requested {} GiB, free {:.1} GiB",
                    requested, free
                ),
            );
        }
        FilterResult::pass(node)
    }

    fn name(&self) -> &str {
        "disk_headroom"
    }

    fn description(&self) -> &str {
        "Have enough idle disk"
    }

    fn exhausted_reason(&self) -> &str {
        "No nodes with enough disk space"
    }
}

/// Get default filter predicates, in pipeline order
pub fn default_filters() -> Vec<Box<dyn FilterPredicate>> {
    vec![
        Box::new(MaxCpuPerInstance),
        Box::new(CpuHeadroom),
        Box::new(RamHeadroom),
        Box::new(DiskHeadroom),
    ]
}

/// Candidates that pass `filter`, in their original order
///
/// A candidate without cached metrics never passes.
pub fn apply_filter(
    filter: &dyn FilterPredicate,
    context: &SchedulingContext<'_>,
    candidates: &[String],
    cache: &MetricsCache,
) -> Vec<String> {
    candidates
        .iter()
        .filter(|node| {
            let result = match cache.get(node) {
                Some(metrics) => filter.filter(context, node, metrics),
                None => FilterResult::fail(node.as_str(), "No cached metrics"),
            };
            if let Some(reason) = &result.reason {
                debug!("Filter {} rejected node {}: {}", filter.name(), node, reason);
            }
            result.passed
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use cumulus_core::resources::quantities::BYTES_PER_GIB;
    use cumulus_core::{metric_names, DiskSpec, InstanceSpec};

    fn instance(cpus: u32, memory: u64, disks: &[Option<u64>]) -> InstanceSpec {
        InstanceSpec {
            uuid: "i-1".to_string(),
            name: "test".to_string(),
            cpus,
            memory,
            disk_spec: disks
                .iter()
                .map(|size| DiskSpec {
                    size: *size,
                    base: None,
                })
                .collect(),
            placement: None,
        }
    }

    fn roomy_node() -> NodeMetrics {
        NodeMetrics::new()
            .with(metric_names::CPU_MAX, 8.0)
            .with(metric_names::CPU_MAX_PER_INSTANCE, 8.0)
            .with(metric_names::CPU_TOTAL_INSTANCE_VCPUS, 4.0)
            .with(metric_names::MEMORY_AVAILABLE, 32768.0)
            .with(metric_names::MEMORY_MAX, 65536.0)
            .with(metric_names::MEMORY_TOTAL_INSTANCE_ACTUAL, 8192.0)
            .with(metric_names::DISK_FREE, 500.0 * BYTES_PER_GIB)
    }

    #[test]
    fn test_roomy_node_passes_every_filter() {
        let config = SchedulerConfig::default();
        let spec = instance(2, 4096, &[Some(20)]);
        let context = SchedulingContext::new(&spec, &config);
        let metrics = roomy_node();

        for filter in default_filters() {
            let result = filter.filter(&context, "sf-1", &metrics);
            assert!(result.passed, "{} rejected: {:?}", filter.name(), result.reason);
        }
    }

    #[test]
    fn test_max_cpu_per_instance() {
        let config = SchedulerConfig::default();
        let spec = instance(16, 1024, &[]);
        let context = SchedulingContext::new(&spec, &config);

        let result = MaxCpuPerInstance.filter(&context, "sf-1", &roomy_node());
        assert!(!result.passed);

        // Unreported limit reads as zero
        let spec = instance(1, 1024, &[]);
        let context = SchedulingContext::new(&spec, &config);
        assert!(!MaxCpuPerInstance.filter(&context, "sf-1", &NodeMetrics::new()).passed);
    }

    #[test]
    fn test_cpu_headroom_boundary() {
        let config = SchedulerConfig {
            cpu_overcommit_ratio: 2.0,
            ..Default::default()
        };
        let metrics = NodeMetrics::new()
            .with(metric_names::CPU_MAX, 4.0)
            .with(metric_names::CPU_TOTAL_INSTANCE_VCPUS, 6.0);

        // 6 + 2 == 4 * 2
        let spec = instance(2, 1024, &[]);
        let context = SchedulingContext::new(&spec, &config);
        assert!(CpuHeadroom.filter(&context, "sf-1", &metrics).passed);

        let spec = instance(3, 1024, &[]);
        let context = SchedulingContext::new(&spec, &config);
        assert!(!CpuHeadroom.filter(&context, "sf-1", &metrics).passed);
    }

    #[test]
    fn test_ram_headroom_reservation() {
        let config = SchedulerConfig::default();
        let metrics = roomy_node().with(metric_names::MEMORY_AVAILABLE, 6144.0);

        // 6144 - 5120 reserved leaves 1024
        let spec = instance(1, 1024, &[]);
        let context = SchedulingContext::new(&spec, &config);
        assert!(RamHeadroom.filter(&context, "sf-1", &metrics).passed);

        let spec = instance(1, 1025, &[]);
        let context = SchedulingContext::new(&spec, &config);
        let result = RamHeadroom.filter(&context, "sf-1", &metrics);
        assert!(!result.passed);
        assert!(result.reason.unwrap().contains("Insufficient memory"));
    }

    #[test]
    fn test_ram_headroom_overcommit_ratio() {
        let config = SchedulerConfig::default();
        let metrics = roomy_node()
            .with(metric_names::MEMORY_MAX, 16384.0)
            .with(metric_names::MEMORY_TOTAL_INSTANCE_ACTUAL, 20480.0);

        // (20480 + 4096) / 16384 == 1.5
        let spec = instance(1, 4096, &[]);
        let context = SchedulingContext::new(&spec, &config);
        assert!(RamHeadroom.filter(&context, "sf-1", &metrics).passed);

        let spec = instance(1, 4097, &[]);
        let context = SchedulingContext::new(&spec, &config);
        assert!(!RamHeadroom.filter(&context, "sf-1", &metrics).passed);
    }

    #[test]
    fn test_ram_headroom_zero_capacity_fails() {
        let config = SchedulerConfig::default();
        let metrics = roomy_node().with(metric_names::MEMORY_MAX, 0.0);
        let spec = instance(1, 512, &[]);
        let context = SchedulingContext::new(&spec, &config);

        assert!(!RamHeadroom.filter(&context, "sf-1", &metrics).passed);
    }

    #[test]
    fn test_disk_headroom_ignores_sizeless_disks() {
        let config = SchedulerConfig::default();
        let metrics = roomy_node().with(metric_names::DISK_FREE, 30.0 * BYTES_PER_GIB);

        let spec = instance(1, 512, &[Some(20), None, Some(10)]);
        let context = SchedulingContext::new(&spec, &config);
        assert!(DiskHeadroom.filter(&context, "sf-1", &metrics).passed);

        let spec = instance(1, 512, &[Some(20), Some(11)]);
        let context = SchedulingContext::new(&spec, &config);
        assert!(!DiskHeadroom.filter(&context, "sf-1", &metrics).passed);
    }

    #[test]
    fn test_disk_headroom_huge_request_fails() {
        let config = SchedulerConfig::default();
        let metrics = roomy_node().with(metric_names::DISK_FREE, 10.0 * BYTES_PER_GIB);

        // Would wrap to 1 GiB in u64 arithmetic
        let spec = instance(1, 512, &[Some(u64::MAX), Some(2)]);
        let context = SchedulingContext::new(&spec, &config);
        assert!(!DiskHeadroom.filter(&context, "sf-1", &metrics).passed);
    }

    #[test]
    fn test_apply_filter_keeps_order_and_drops_uncached() {
        let config = SchedulerConfig::default();
        let spec = instance(2, 1024, &[]);
        let context = SchedulingContext::new(&spec, &config);

        let mut cache = MetricsCache::new();
        cache.insert("sf-1", roomy_node());
        cache.insert("sf-2", roomy_node().with(metric_names::CPU_MAX_PER_INSTANCE, 1.0));
        cache.insert("sf-3", roomy_node());

        let candidates: Vec<String> = ["sf-3", "sf-2", "sf-1", "sf-9"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let survivors = apply_filter(&MaxCpuPerInstance, &context, &candidates, &cache);

        assert_eq!(survivors, vec!["sf-3", "sf-1"]);
        // Input untouched
        assert_eq!(candidates.len(), 4);
    }
}
