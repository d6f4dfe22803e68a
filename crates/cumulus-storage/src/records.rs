use crate::{KVStore, KeyEncoder, Result, StorageError};
use cumulus_core::Event;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Typed repository over a key-value store
///
/// Objects are addressed by `(object_type, uuid)`. Each object has a static
/// JSON record, any number of named JSON attributes, and an append-only
/// event log. Listing is a full scan of the type's records filtered on the
/// client side.
pub struct RecordStore {
    kv: Arc<dyn KVStore>,
    event_seq: AtomicU64,
}

impl RecordStore {
    pub fn new(kv: Arc<dyn KVStore>) -> Self {
        Self {
            kv,
            event_seq: AtomicU64::new(0),
        }
    }

    /// Load an object's static record
    pub fn load<T: DeserializeOwned>(&self, object_type: &str, uuid: &str) -> Result<Option<T>> {
        let key = KeyEncoder::encode_record_key(object_type, uuid)?;
        self.get_json(&key)
    }

    /// Write an object's static record, replacing any previous one
    pub fn save<T: Serialize>(&self, object_type: &str, uuid: &str, record: &T) -> Result<()> {
        let key = KeyEncoder::encode_record_key(object_type, uuid)?;
        self.put_json(&key, record)
    }

    pub fn exists(&self, object_type: &str, uuid: &str) -> Result<bool> {
        let key = KeyEncoder::encode_record_key(object_type, uuid)?;
        self.kv.exists(key.as_bytes())
    }

    /// UUIDs of every stored object of a type, in key order
    pub fn uuids(&self, object_type: &str) -> Result<Vec<String>> {
        let prefix = KeyEncoder::encode_record_prefix(object_type)?;
        let keys = self.kv.keys_with_prefix(prefix.as_bytes())?;

        Ok(keys
            .iter()
            .filter_map(|k| KeyEncoder::parse_record_key(&String::from_utf8_lossy(k)))
            .map(|(_, uuid)| uuid)
            .collect())
    }

    /// Every record of a type matching `predicate`
    ///
    /// Records that fail to decode are skipped with a warning rather than
    /// failing the whole listing.
    pub fn list_where<T, F>(&self, object_type: &str, predicate: F) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let prefix = KeyEncoder::encode_record_prefix(object_type)?;
        let entries = self.kv.scan(prefix.as_bytes())?;

        let mut out = Vec::new();
        for (key, data) in entries.iter() {
            let key = String::from_utf8_lossy(key);
            match serde_json::from_slice::<T>(data) {
                Ok(record) if predicate(&record) => out.push(record),
                Ok(_) => {}
                Err(e) => warn!("Skipping undecodable record {}: {}", key, e),
            }
        }

        debug!("Listed {} {} records", out.len(), object_type);
        Ok(out)
    }

    /// Every record of a type
    pub fn list<T: DeserializeOwned>(&self, object_type: &str) -> Result<Vec<T>> {
        self.list_where(object_type, |_: &T| true)
    }

    pub fn get_attribute<T: DeserializeOwned>(
        &self,
        object_type: &str,
        uuid: &str,
        name: &str,
    ) -> Result<Option<T>> {
        let key = KeyEncoder::encode_attribute_key(object_type, uuid, name)?;
        self.get_json(&key)
    }

    pub fn set_attribute<T: Serialize>(
        &self,
        object_type: &str,
        uuid: &str,
        name: &str,
        value: &T,
    ) -> Result<()> {
        let key = KeyEncoder::encode_attribute_key(object_type, uuid, name)?;
        self.put_json(&key, value)
    }

    /// Append to an object's event log
    pub fn add_event(&self, object_type: &str, uuid: &str, event: &Event) -> Result<()> {
        let nanos = event.timestamp.timestamp_nanos_opt().unwrap_or_default();
        let seq = self.event_seq.fetch_add(1, Ordering::Relaxed);
        let sequence = format!("{:020}-{:010}", nanos, seq);

        let key = KeyEncoder::encode_event_key(object_type, uuid, &sequence)?;
        self.put_json(&key, event)
    }

    /// An object's event log, oldest first
    pub fn events(&self, object_type: &str, uuid: &str) -> Result<Vec<Event>> {
        let prefix = KeyEncoder::encode_event_prefix(object_type, uuid)?;
        let entries = self.kv.scan(prefix.as_bytes())?;

        entries
            .iter()
            .map(|(key, data)| decode(&String::from_utf8_lossy(key), data))
            .collect()
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.kv.get(key.as_bytes())? {
            Some(data) => decode(key, &data).map(Some),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let data = serde_json::to_vec(value).map_err(|e| StorageError::encode(key, e))?;
        self.kv.put(key.as_bytes(), &data)
    }
}

fn decode<T: DeserializeOwned>(key: &str, data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| StorageError::decode(key, e))
}
