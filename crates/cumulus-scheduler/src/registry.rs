//! Node registry backed by the record store.

use crate::config::NodeConfig;
use crate::error::{Result, SchedulerError};
use chrono::Utc;
use cumulus_core::{
    object_types, validate_transition, Event, Node, NodeRecord, NodeState, Observation,
    StateRecord, CURRENT_NODE_VERSION,
};
use cumulus_storage::RecordStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

const STATE_ATTRIBUTE: &str = "state";
const OBSERVED_ATTRIBUTE: &str = "observed";

/// Release string nodes report when observing themselves
pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

/// Predicate over nodes used by [`NodeRegistry::enumerate`]
pub type NodeFilter = fn(&Node) -> bool;

/// Nodes usable for scheduling
pub fn active_states_filter(node: &Node) -> bool {
    node.state().is_some_and(|s| s.is_active())
}

/// Nodes that are deleted, errored or missing
pub fn inactive_states_filter(node: &Node) -> bool {
    node.state().is_some_and(|s| s.is_inactive())
}

/// Catalogue of cluster nodes
///
/// Each node is a static record (`fqdn`, `ip`, `version`) plus `state` and
/// `observed` attributes. Every mutation appends to the node's event log.
pub struct NodeRegistry {
    store: Arc<RecordStore>,
    /// Name stamped on events this registry writes
    recorder: String,
}

impl NodeRegistry {
    pub fn new(store: Arc<RecordStore>, recorder: impl Into<String>) -> Self {
        Self {
            store,
            recorder: recorder.into(),
        }
    }

    /// Look a node up by name; a missing node is `None`, not an error
    pub fn lookup(&self, name: &str) -> Result<Option<Node>> {
        if name.is_empty() {
            return Ok(None);
        }

        let record: NodeRecord = match self.store.load(object_types::NODE, name)? {
            Some(r) => r,
            None => return Ok(None),
        };
        let state = self
            .store
            .get_attribute(object_types::NODE, name, STATE_ATTRIBUTE)?;
        let observed = self
            .store
            .get_attribute(object_types::NODE, name, OBSERVED_ATTRIBUTE)?;

        Ok(Some(Node::from_parts(record, state, observed)))
    }

    /// Create the node if it doesn't exist, otherwise return it unchanged
    pub fn register(&self, name: &str, ip: &str) -> Result<Node> {
        if let Some(node) = self.lookup(name)? {
            debug!("Node {} already registered", name);
            return Ok(node);
        }

        let record = NodeRecord {
            fqdn: name.to_string(),
            ip: ip.to_string(),
            version: CURRENT_NODE_VERSION,
        };
        self.store.save(object_types::NODE, name, &record)?;

        let node = Node::from_parts(record, None, None);
        let node = self.set_state(node, NodeState::Created)?;
        self.add_event(name, Event::new(&self.recorder, "db record creation"));

        info!("Registered node {} at {}", name, ip);
        Ok(node)
    }

    /// Upsert the node and record a fresh observation
    ///
    /// Observation is an attribute update, never a state transition.
    pub fn register_or_observe(&self, name: &str, ip: &str, release: &str) -> Result<Node> {
        let mut node = self.register(name, ip)?;

        let observed = Observation {
            at: Utc::now(),
            release: release.to_string(),
        };
        self.store
            .set_attribute(object_types::NODE, name, OBSERVED_ATTRIBUTE, &observed)?;
        debug!("Observed node {} running {}", name, release);

        node.observed = Some(observed);
        Ok(node)
    }

    /// Register the node this process runs on
    pub fn observe_this_node(&self, config: &NodeConfig) -> Result<Node> {
        self.register_or_observe(&config.node_name, &config.node_ip, RELEASE)
    }

    /// Nodes matching every filter; see [`Nodes`]
    pub fn enumerate(&self, filters: &[NodeFilter]) -> Nodes<'_> {
        Nodes {
            registry: self,
            filters: filters.to_vec(),
        }
    }

    /// Move a node to `target`, rejecting transitions the state table forbids
    pub fn transition(&self, name: &str, target: NodeState) -> Result<Node> {
        let node = self
            .lookup(name)?
            .ok_or_else(|| SchedulerError::node_not_found(name))?;
        self.set_state(node, target)
    }

    /// Soft delete: the record stays, its state becomes `deleted`
    pub fn delete(&self, name: &str) -> Result<Node> {
        self.transition(name, NodeState::Deleted)
    }

    /// A node's audit log, oldest first
    pub fn events(&self, name: &str) -> Result<Vec<Event>> {
        Ok(self.store.events(object_types::NODE, name)?)
    }

    fn set_state(&self, mut node: Node, target: NodeState) -> Result<Node> {
        let current = node.state();
        validate_transition(object_types::NODE, &node.fqdn, current, target)?;

        let state = StateRecord {
            value: target,
            update_time: Utc::now(),
        };
        self.store
            .set_attribute(object_types::NODE, &node.fqdn, STATE_ATTRIBUTE, &state)?;

        let from = current.map(|s| s.as_str()).unwrap_or("none");
        info!("Node {} state {} -> {}", node.fqdn, from, target);
        self.add_event(
            &node.fqdn,
            Event::new(&self.recorder, "state changed")
                .with_message(format!("{} -> {}", from, target)),
        );

        node.state = Some(state);
        Ok(node)
    }

    fn add_event(&self, name: &str, event: Event) {
        if let Err(e) = self.store.add_event(object_types::NODE, name, &event) {
            warn!("Failed to record event for node {}: {}", name, e);
        }
    }
}

/// A lazy, restartable enumeration of nodes
///
/// Each call to [`Nodes::iter`] rescans the store. Nodes are loaded one at
/// a time as the iterator advances; nodes that fail to load are skipped.
pub struct Nodes<'a> {
    registry: &'a NodeRegistry,
    filters: Vec<NodeFilter>,
}

impl<'a> Nodes<'a> {
    pub fn iter(&self) -> Result<impl Iterator<Item = Node> + '_> {
        let names = self.registry.store.uuids(object_types::NODE)?;

        Ok(names.into_iter().filter_map(move |name| {
            let node = match self.registry.lookup(&name) {
                Ok(Some(node)) => node,
                Ok(None) => return None,
                Err(e) => {
                    warn!("Skipping node {}: {}", name, e);
                    return None;
                }
            };
            self.filters.iter().all(|f| f(&node)).then_some(node)
        }))
    }

    /// Collect the current matches
    pub fn to_vec(&self) -> Result<Vec<Node>> {
        Ok(self.iter()?.collect())
    }
}
