use crate::error::{CumulusError, Result};
use serde::{Deserialize, Serialize};

/// Node lifecycle state
///
/// A node with no recorded state is in the implicit pre-creation state,
/// represented as `None` wherever an `Option<NodeState>` is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Created,
    Error,
    Deleted,
    Missing,
}

impl NodeState {
    /// Every state, in declaration order
    pub const ALL: [NodeState; 4] = [
        NodeState::Created,
        NodeState::Error,
        NodeState::Deleted,
        NodeState::Missing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Created => "created",
            NodeState::Error => "error",
            NodeState::Deleted => "deleted",
            NodeState::Missing => "missing",
        }
    }

    /// Parse a state name as stored in the record store
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(NodeState::Created),
            "error" => Some(NodeState::Error),
            "deleted" => Some(NodeState::Deleted),
            "missing" => Some(NodeState::Missing),
            _ => None,
        }
    }

    /// Whether a node in this state may be scheduled onto
    pub fn is_active(&self) -> bool {
        matches!(self, NodeState::Created)
    }

    /// Whether this state counts as inactive for enumeration
    pub fn is_inactive(&self) -> bool {
        matches!(
            self,
            NodeState::Deleted | NodeState::Error | NodeState::Missing
        )
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NodeState {
    type Err = CumulusError;

    fn from_str(s: &str) -> Result<Self> {
        NodeState::parse(s).ok_or_else(|| CumulusError::unknown_state(s))
    }
}

/// States reachable from `from` in a single transition
pub fn allowed_targets(from: Option<NodeState>) -> &'static [NodeState] {
    match from {
        None => &[NodeState::Created, NodeState::Error, NodeState::Missing],
        Some(NodeState::Created) => &[NodeState::Deleted, NodeState::Error, NodeState::Missing],
        Some(NodeState::Error) => &[NodeState::Error, NodeState::Deleted],
        Some(NodeState::Missing) => &[NodeState::Created, NodeState::Error],
        Some(NodeState::Deleted) => &[],
    }
}

/// Check a single transition against the table
pub fn can_transition(from: Option<NodeState>, to: NodeState) -> bool {
    allowed_targets(from).contains(&to)
}

/// Validate a transition, producing a diagnostic error naming the object
pub fn validate_transition(
    object_type: &str,
    uuid: &str,
    from: Option<NodeState>,
    to: NodeState,
) -> Result<()> {
    if can_transition(from, to) {
        return Ok(());
    }

    let allowed = allowed_targets(from)
        .iter()
        .map(NodeState::as_str)
        .collect::<Vec<_>>();
    let allowed = if allowed.is_empty() {
        "none".to_string()
    } else {
        allowed.join(", ")
    };

    Err(CumulusError::invalid_state_transition(
        object_type,
        uuid,
        from.map(|s| s.as_str()).unwrap_or("none"),
        to.as_str(),
        allowed,
    ))
}
