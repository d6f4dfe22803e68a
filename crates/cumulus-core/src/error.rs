// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for Cumulus operations
#[derive(Error, Debug, Diagnostic)]
pub enum CumulusError {
    /// Illegal lifecycle state transition
    #[error("Invalid state transition for {object_type} {uuid}: {from} -> {to}")]
    #[diagnostic(
        code(cumulus::invalid_state_transition),
        help("Allowed targets from '{from}' are: {allowed}")
    )]
    InvalidStateTransition {
        #[allow(unused)]
        object_type: String,
        #[allow(unused)]
        uuid: String,
        #[allow(unused)]
        from: String,
        #[allow(unused)]
        to: String,
        #[allow(unused)]
        allowed: String,
    },

    /// Unknown lifecycle state name
    #[error("Unknown state: {state}")]
    #[diagnostic(
        code(cumulus::unknown_state),
        help("Valid states are: created, error, deleted, missing")
    )]
    UnknownState {
        #[allow(unused)]
        state: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(cumulus::serialization_error),
        help("Ensure the document is valid JSON or YAML")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for Cumulus operations
pub type Result<T> = std::result::Result<T, CumulusError>;

impl CumulusError {
    /// Create an InvalidStateTransition error
    pub fn invalid_state_transition(
        object_type: impl Into<String>,
        uuid: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        allowed: impl Into<String>,
    ) -> Self {
        Self::InvalidStateTransition {
            object_type: object_type.into(),
            uuid: uuid.into(),
            from: from.into(),
            to: to.into(),
            allowed: allowed.into(),
        }
    }

    /// Create an UnknownState error
    pub fn unknown_state(state: impl Into<String>) -> Self {
        Self::UnknownState {
            state: state.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }
}
