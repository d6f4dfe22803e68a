// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Storage error type
#[derive(Error, Debug, Diagnostic)]
pub enum StorageError {
    /// The database file could not be opened or created
    #[error("Failed to open record store at {path}")]
    #[diagnostic(
        code(storage::open),
        help("Check that the path is writable and no other process holds the file")
    )]
    Open {
        path: String,
        #[source]
        source: redb::DatabaseError,
    },

    /// A transaction against the records table failed
    #[error("Record store {operation} failed")]
    #[diagnostic(
        code(storage::backend),
        help("The data file may be corrupt or out of space")
    )]
    Backend {
        operation: &'static str,
        #[source]
        source: BoxedSource,
    },

    /// A key segment is empty or contains the `/` separator
    #[error("Invalid {kind} in storage key: '{value}'")]
    #[diagnostic(
        code(storage::invalid_key),
        help("Object types, uuids and attribute names must be non-empty and free of '/'")
    )]
    InvalidKey { kind: &'static str, value: String },

    /// A stored value does not match its expected shape
    #[error("Cannot {action} value at {key}")]
    #[diagnostic(
        code(storage::serialization),
        help("The stored value does not match the expected record shape")
    )]
    SerializationError {
        key: String,
        action: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Create an Open error
    pub fn open(path: impl Into<String>, source: redb::DatabaseError) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }

    /// Adapter for `map_err` on any redb call made during `operation`
    pub fn backend<E>(operation: &'static str) -> impl FnOnce(E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        move |e| Self::Backend {
            operation,
            source: Box::new(e),
        }
    }

    /// Create an InvalidKey error
    pub fn invalid_key(kind: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidKey {
            kind,
            value: value.into(),
        }
    }

    /// Create a SerializationError for encoding a value
    pub fn encode(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::SerializationError {
            key: key.into(),
            action: "encode",
            source,
        }
    }

    /// Create a SerializationError for decoding a value
    pub fn decode(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::SerializationError {
            key: key.into(),
            action: "decode",
            source,
        }
    }
}
