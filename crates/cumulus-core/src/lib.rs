//! Cumulus Core - Fundamental types for the Cumulus placement subsystem
//!
//! This crate provides:
//! - The node lifecycle state machine
//! - Node, instance, image and network interface records
//! - Per-node metrics snapshots
//! - Audit events
//! - Error types with miette diagnostics
//! - Serialization helpers

pub mod error;
pub mod events;
pub mod resources;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use error::{CumulusError, Result};
pub use events::Event;
pub use resources::{names as metric_names, NodeMetrics};
pub use state::{allowed_targets, can_transition, validate_transition, NodeState};
pub use types::{
    object_types, DiskSpec, ImageRecord, ImageState, InstanceSpec, NetworkInterface, Node,
    NodeRecord, NodeView, Observation, Placement, StateRecord, CURRENT_NODE_VERSION,
};

/// Serialize a value to pretty JSON
pub fn to_json_pretty<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| {
        CumulusError::serialization_error(
            format!("Failed to serialize to JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a value from JSON
pub fn from_json<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| {
        CumulusError::serialization_error(
            format!("Failed to deserialize from JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a value from YAML
pub fn from_yaml<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| {
        CumulusError::serialization_error(
            format!("Failed to deserialize from YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}
