//! Cumulus Scheduler - Instance to node placement
//!
//! This crate provides:
//! - The node registry and its lifecycle state machine
//! - A time-bounded metrics cache per placement engine
//! - Filter predicates (CPU, RAM and disk headroom)
//! - Network and image affinity
//! - Network node resolution

pub mod affinity;
pub mod catalog;
pub mod config;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod network_node;
pub mod registry;
pub mod scheduler;
pub mod types;

// Re-export commonly used types
pub use catalog::{ImageAlias, ImageCatalog, InstanceCatalog, StoreCatalog};
pub use config::{NodeConfig, SchedulerConfig};
pub use error::{Result, SchedulerError};
pub use metrics::{MetricsCache, MetricsStore, RecordMetricsStore};
pub use network_node::{NetworkNodeResolver, Resolution};
pub use registry::{active_states_filter, inactive_states_filter, NodeFilter, NodeRegistry, Nodes, RELEASE};
pub use scheduler::Scheduler;
pub use types::{FilterResult, SchedulingContext};
