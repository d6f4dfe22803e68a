use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An append-only audit entry attached to a stored object
///
/// Events are informational: nothing in the control path reads them back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
    /// Node that recorded the event
    pub fqdn: String,
    /// Operation name (e.g. "schedule", "state changed")
    pub operation: String,
    /// Phase within the operation
    pub phase: Option<String>,
    /// Elapsed seconds, for operations that measure themselves
    pub duration: Option<f64>,
    /// Free-form detail
    pub message: Option<String>,
}

impl Event {
    /// Create an event stamped with the current time
    pub fn new(fqdn: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            fqdn: fqdn.into(),
            operation: operation.into(),
            phase: None,
            duration: None,
            message: None,
        }
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
