//! Node metrics: the store contract and the scheduler's local cache.

use crate::error::{Result, SchedulerError};
use crate::registry::{active_states_filter, NodeRegistry};
use async_trait::async_trait;
use cumulus_core::{object_types, NodeMetrics};
use cumulus_storage::RecordStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const METRICS_ATTRIBUTE: &str = "metrics";

/// Source of per-node telemetry
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Latest snapshot for a node; `Ok(None)` when the node never reported
    async fn get_metrics(&self, node: &str) -> Result<Option<NodeMetrics>>;
}

/// Metrics kept as the `metrics` attribute of each node record
pub struct RecordMetricsStore {
    store: Arc<RecordStore>,
}

impl RecordMetricsStore {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Replace a node's published snapshot
    pub fn publish_metrics(&self, node: &str, metrics: &NodeMetrics) -> Result<()> {
        self.store
            .set_attribute(object_types::NODE, node, METRICS_ATTRIBUTE, metrics)?;
        Ok(())
    }
}

#[async_trait]
impl MetricsStore for RecordMetricsStore {
    async fn get_metrics(&self, node: &str) -> Result<Option<NodeMetrics>> {
        self.store
            .get_attribute(object_types::NODE, node, METRICS_ATTRIBUTE)
            .map_err(|e| SchedulerError::metrics_read(node, e.to_string()))
    }
}

/// Time-bounded snapshot of metrics for every active node
///
/// Owned by a single placement engine. A refresh replaces the whole
/// snapshot; nodes whose metrics can't be read simply drop out until a
/// later refresh succeeds.
#[derive(Debug, Default)]
pub struct MetricsCache {
    metrics: HashMap<String, NodeMetrics>,
    refreshed_at: Option<Instant>,
}

impl MetricsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the snapshot from every active node
    pub async fn refresh(&mut self, registry: &NodeRegistry, store: &dyn MetricsStore) -> Result<()> {
        debug!("Refreshing metrics");

        let nodes = registry.enumerate(&[active_states_filter]).to_vec()?;
        let mut metrics = HashMap::with_capacity(nodes.len());

        for node in nodes {
            match store.get_metrics(&node.fqdn).await {
                Ok(Some(snapshot)) if !snapshot.is_empty() => {
                    debug!("Metrics for node {}: {:?}", node.fqdn, snapshot);
                    metrics.insert(node.fqdn, snapshot);
                }
                Ok(_) => warn!("Empty metrics from database for node {}", node.fqdn),
                Err(e) => warn!("Refreshing metrics for node {} failed: {}", node.fqdn, e),
            }
        }

        self.metrics = metrics;
        self.refreshed_at = Some(Instant::now());
        Ok(())
    }

    /// True when empty, never refreshed, or older than `timeout`
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.is_stale_at(Instant::now(), timeout)
    }

    pub fn is_stale_at(&self, now: Instant, timeout: Duration) -> bool {
        if self.metrics.is_empty() {
            return true;
        }
        match self.refreshed_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) > timeout,
        }
    }

    /// Time since the last refresh
    pub fn age(&self) -> Option<Duration> {
        self.refreshed_at.map(|at| at.elapsed())
    }

    pub fn get(&self, node: &str) -> Option<&NodeMetrics> {
        self.metrics.get(node)
    }

    pub fn contains(&self, node: &str) -> bool {
        self.metrics.contains_key(node)
    }

    /// Cached node names, sorted
    pub fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.metrics.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Seed the cache directly, bypassing the store
    #[cfg(test)]
    pub(crate) fn insert(&mut self, node: impl Into<String>, metrics: NodeMetrics) {
        self.metrics.insert(node.into(), metrics);
        self.refreshed_at.get_or_insert_with(Instant::now);
    }
}
