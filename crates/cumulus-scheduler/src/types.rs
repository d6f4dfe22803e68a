use crate::config::SchedulerConfig;
use cumulus_core::InstanceSpec;

/// The request and limits a placement is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct SchedulingContext<'a> {
    /// Instance to be placed
    pub instance: &'a InstanceSpec,
    /// Overcommit ratios and reservations
    pub config: &'a SchedulerConfig,
}

impl<'a> SchedulingContext<'a> {
    pub fn new(instance: &'a InstanceSpec, config: &'a SchedulerConfig) -> Self {
        Self { instance, config }
    }
}

/// Result of filtering a node
#[derive(Debug, Clone)]
pub struct FilterResult {
    /// Node name
    pub node_name: String,
    /// Whether the node passed the filter
    pub passed: bool,
    /// Reason for failure (if any)
    pub reason: Option<String>,
}

impl FilterResult {
    /// Create a passing filter result
    pub fn pass(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            passed: true,
            reason: None,
        }
    }

    /// Create a failing filter result
    pub fn fail(node_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            passed: false,
            reason: Some(reason.into()),
        }
    }
}
