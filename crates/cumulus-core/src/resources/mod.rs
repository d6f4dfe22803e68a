pub mod quantities;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Names of the figures a node reports
pub mod names {
    /// Physical CPU count
    pub const CPU_MAX: &str = "cpu_max";
    /// vCPUs committed to running instances
    pub const CPU_TOTAL_INSTANCE_VCPUS: &str = "cpu_total_instance_vcpus";
    /// Largest vCPU count a single instance may have
    pub const CPU_MAX_PER_INSTANCE: &str = "cpu_max_per_instance";
    /// Free memory in MiB
    pub const MEMORY_AVAILABLE: &str = "memory_available";
    /// Physical memory in MiB
    pub const MEMORY_MAX: &str = "memory_max";
    /// Memory in MiB actually used by instances
    pub const MEMORY_TOTAL_INSTANCE_ACTUAL: &str = "memory_total_instance_actual";
    /// Free instance disk in bytes
    pub const DISK_FREE: &str = "disk_free";
}

/// Telemetry snapshot for one node
///
/// A mapping of named figures. Figures a node did not report read as zero,
/// which fails every headroom check that depends on them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeMetrics(BTreeMap<String, f64>);

impl NodeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, mostly for fixtures
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    /// A named figure, zero when unreported
    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn cpu_max(&self) -> f64 {
        self.get(names::CPU_MAX)
    }

    pub fn cpu_total_instance_vcpus(&self) -> f64 {
        self.get(names::CPU_TOTAL_INSTANCE_VCPUS)
    }

    pub fn cpu_max_per_instance(&self) -> f64 {
        self.get(names::CPU_MAX_PER_INSTANCE)
    }

    pub fn memory_available(&self) -> f64 {
        self.get(names::MEMORY_AVAILABLE)
    }

    pub fn memory_max(&self) -> f64 {
        self.get(names::MEMORY_MAX)
    }

    pub fn memory_total_instance_actual(&self) -> f64 {
        self.get(names::MEMORY_TOTAL_INSTANCE_ACTUAL)
    }

    pub fn disk_free(&self) -> f64 {
        self.get(names::DISK_FREE)
    }
}
