// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// A pipeline stage left no candidates
    #[error("Insufficient capacity at stage {stage}: {reason}")]
    #[diagnostic(
        code(scheduler::capacity_exhausted),
        help("Reduce the request or retry the placement once capacity frees up")
    )]
    CapacityExhausted {
        stage: String,
        reason: String,
    },

    /// A forced candidate has no metrics
    #[error("Candidate node not found: {node}")]
    #[diagnostic(
        code(scheduler::unknown_candidate),
        help("Forced candidates must be active nodes that report metrics")
    )]
    UnknownCandidate {
        node: String,
    },

    /// Reading a node's metrics failed
    #[error("Failed to read metrics for node {node}: {message}")]
    #[diagnostic(
        code(scheduler::metrics_read),
        help("The node is skipped until a later refresh succeeds")
    )]
    MetricsRead {
        node: String,
        message: String,
    },

    /// Node is not registered
    #[error("Node not found: {node}")]
    #[diagnostic(
        code(scheduler::node_not_found),
        help("Register the node first with `cumulus observe`")
    )]
    NodeNotFound {
        node: String,
    },

    /// Storage error
    #[error("Storage error: {0}")]
    #[diagnostic(
        code(scheduler::storage_error),
        help("Check the underlying storage system")
    )]
    StorageError(#[from] cumulus_storage::StorageError),

    /// Core error, including illegal state transitions
    #[error(transparent)]
    #[diagnostic(transparent)]
    CoreError(#[from] cumulus_core::CumulusError),
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create a CapacityExhausted error
    pub fn capacity_exhausted(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CapacityExhausted {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnknownCandidate error
    pub fn unknown_candidate(node: impl Into<String>) -> Self {
        Self::UnknownCandidate { node: node.into() }
    }

    /// Create a MetricsRead error
    pub fn metrics_read(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MetricsRead {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Create a NodeNotFound error
    pub fn node_not_found(node: impl Into<String>) -> Self {
        Self::NodeNotFound { node: node.into() }
    }

    /// Stage name, for capacity failures
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::CapacityExhausted { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
