//! Configuration types for the scheduler.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Placement engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Multiplier applied to physical CPUs when checking vCPU headroom
    pub cpu_overcommit_ratio: f64,
    /// Upper bound on instance memory as a fraction of physical memory
    pub ram_overcommit_ratio: f64,
    /// GiB of memory kept back for the host operating system
    pub ram_system_reservation_gb: f64,
    /// How long a metrics snapshot stays usable
    #[serde(with = "duration_secs")]
    pub cache_timeout: Duration,
    /// Address of the node attached to every virtual network
    pub network_node_ip: String,
    /// Name recorded on audit events written by this process
    pub node_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cpu_overcommit_ratio: 16.0,
            ram_overcommit_ratio: 1.5,
            ram_system_reservation_gb: 5.0,
            cache_timeout: Duration::from_secs(30),
            network_node_ip: String::new(),
            node_name: String::new(),
        }
    }
}

/// Identity this process registers itself under
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_name: String,
    pub node_ip: String,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
