use crate::error::Result;
use crate::registry::{active_states_filter, NodeRegistry};
use tracing::{debug, info};

/// Resolution state of the network node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Unresolved,
    Resolved(String),
}

/// Finds the node attached to every virtual network
///
/// The network node is identified by its configured address. A match is
/// cached for the life of the resolver and never invalidated; until one is
/// found every call rescans the active nodes.
#[derive(Debug)]
pub struct NetworkNodeResolver {
    network_node_ip: String,
    resolution: Resolution,
}

impl NetworkNodeResolver {
    pub fn new(network_node_ip: impl Into<String>) -> Self {
        Self {
            network_node_ip: network_node_ip.into(),
            resolution: Resolution::Unresolved,
        }
    }

    /// Name of the network node, scanning the registry if not yet known
    pub fn resolve(&mut self, registry: &NodeRegistry) -> Result<Option<&str>> {
        if let Resolution::Unresolved = self.resolution {
            if self.network_node_ip.is_empty() {
                debug!("No network node address configured");
            } else {
                let found = registry
                    .enumerate(&[active_states_filter])
                    .iter()?
                    .find(|n| n.ip == self.network_node_ip);

                match found {
                    Some(node) => {
                        info!("Network node is {} ({})", node.fqdn, node.ip);
                        self.resolution = Resolution::Resolved(node.fqdn);
                    }
                    None => debug!(
                        "No active node has the network node address {}",
                        self.network_node_ip
                    ),
                }
            }
        }

        Ok(self.resolved())
    }

    /// The cached result, without scanning
    pub fn resolved(&self) -> Option<&str> {
        match &self.resolution {
            Resolution::Resolved(name) => Some(name),
            Resolution::Unresolved => None,
        }
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }
}
