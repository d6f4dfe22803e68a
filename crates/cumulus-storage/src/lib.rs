//! Cumulus Storage - Record store abstraction and backends
//!
//! This crate provides:
//! - KVStore trait for storage abstraction
//! - redb-based and in-memory implementations
//! - Key encoding
//! - RecordStore, a typed repository with attributes and event logs

pub mod encoding;
pub mod error;
pub mod kv;
pub mod memory;
pub mod records;
pub mod redb_backend;

// Re-export commonly used types
pub use encoding::KeyEncoder;
pub use error::{Result, StorageError};
pub use kv::KVStore;
pub use memory::MemoryBackend;
pub use records::RecordStore;
pub use redb_backend::RedbBackend;
