use crate::Result;
use bytes::Bytes;

/// Key-value store trait
///
/// The record store's consistency guarantees come from the backend; nothing
/// layered on top adds locking of its own.
pub trait KVStore: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Put a key-value pair
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Scan keys with a given prefix, in key order
    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>>;

    /// Check if a key exists
    fn exists(&self, key: &[u8]) -> Result<bool>;

    /// Get all keys with a given prefix, in key order
    fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Bytes>>;
}
