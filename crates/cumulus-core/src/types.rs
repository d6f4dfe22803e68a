use crate::state::NodeState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Object type names used as record store namespaces
pub mod object_types {
    pub const NODE: &str = "node";
    pub const INSTANCE: &str = "instance";
    pub const IMAGE: &str = "image";
    pub const IMAGE_ALIAS: &str = "image-alias";
    pub const NETWORK_INTERFACE: &str = "networkinterface";
}

/// Schema version written for new node records
pub const CURRENT_NODE_VERSION: u32 = 2;

/// Static values of a node record, written once at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Fully qualified name, also used as the node's UUID
    pub fqdn: String,
    /// Address the node is reachable on
    pub ip: String,
    /// Record schema version
    pub version: u32,
}

/// The `state` attribute of a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub value: NodeState,
    pub update_time: DateTime<Utc>,
}

/// The `observed` attribute of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Last time the node reported in
    pub at: DateTime<Utc>,
    /// Software release the node reported
    pub release: String,
}

/// A cluster node as assembled from its record and attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub fqdn: String,
    pub ip: String,
    pub version: u32,
    pub state: Option<StateRecord>,
    pub observed: Option<Observation>,
}

impl Node {
    /// Assemble a node from its static record and attributes
    pub fn from_parts(
        record: NodeRecord,
        state: Option<StateRecord>,
        observed: Option<Observation>,
    ) -> Self {
        Self {
            fqdn: record.fqdn,
            ip: record.ip,
            version: record.version,
            state,
            observed,
        }
    }

    /// Current lifecycle state, `None` before creation completes
    pub fn state(&self) -> Option<NodeState> {
        self.state.as_ref().map(|s| s.value)
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.observed.as_ref().map(|o| o.at)
    }

    pub fn installed_version(&self) -> Option<&str> {
        self.observed.as_ref().map(|o| o.release.as_str())
    }

    /// The operator-facing representation of this node
    pub fn external_view(&self) -> NodeView {
        NodeView {
            uuid: self.fqdn.clone(),
            fqdn: self.fqdn.clone(),
            ip: self.ip.clone(),
            state: self.state().map(|s| s.as_str().to_string()),
            lastseen: self.last_seen(),
            release: self.installed_version().map(str::to_string),
        }
    }
}

/// External view of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeView {
    pub uuid: String,
    pub fqdn: String,
    pub ip: String,
    pub state: Option<String>,
    pub lastseen: Option<DateTime<Utc>>,
    pub release: Option<String>,
}

/// One disk of an instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    /// Size in GiB; absent for disks sized exactly to their base image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Base image reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
}

/// Where an instance currently lives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    #[serde(default)]
    pub node: Option<String>,
}

/// The parts of an instance the scheduler reads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    pub cpus: u32,
    /// Memory in MiB
    pub memory: u64,
    #[serde(default)]
    pub disk_spec: Vec<DiskSpec>,
    #[serde(default)]
    pub placement: Option<Placement>,
}

impl InstanceSpec {
    /// Sum of explicitly sized disks in GiB; sizeless disks don't count
    ///
    /// Widened so that any number of `u64` sizes sums without overflow.
    pub fn requested_disk_gb(&self) -> u128 {
        self.disk_spec
            .iter()
            .filter_map(|d| d.size)
            .map(u128::from)
            .sum()
    }

    /// Base image references in disk order
    pub fn base_images(&self) -> impl Iterator<Item = &str> {
        self.disk_spec
            .iter()
            .filter_map(|d| d.base.as_deref())
            .filter(|b| !b.is_empty())
    }

    /// Node the instance is placed on, if any
    pub fn placed_on(&self) -> Option<&str> {
        self.placement
            .as_ref()
            .and_then(|p| p.node.as_deref())
            .filter(|n| !n.is_empty())
    }
}

/// An instance's attachment to a virtual network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub uuid: String,
    pub instance_uuid: String,
    pub network_uuid: String,
}

/// Lifecycle of a cached image copy on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageState {
    Initial,
    Creating,
    Created,
    Error,
    Deleted,
}

impl ImageState {
    pub fn is_active(&self) -> bool {
        matches!(self, ImageState::Created)
    }
}

/// A copy of an image held on a specific node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub uuid: String,
    /// Canonical source URL
    pub url: String,
    /// Node holding this copy
    pub node: String,
    pub state: ImageState,
}
