use crate::{KVStore, Result, StorageError};
use bytes::Bytes;
use redb::{Database, ReadTransaction, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const RECORDS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");

/// Records store persisted in a single redb file
///
/// All keys live in one table. Prefix reads seek to the prefix and walk
/// forward until the first key outside it.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open (or create) a database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening record store at {}", path.display());

        let db = Database::create(path)
            .map_err(|e| StorageError::open(path.display().to_string(), e))?;

        // Create the table up front so read transactions never miss it
        let txn = db.begin_write().map_err(StorageError::backend("init"))?;
        txn.open_table(RECORDS_TABLE)
            .map_err(StorageError::backend("init"))?;
        txn.commit().map_err(StorageError::backend("init"))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn read(&self, operation: &'static str) -> Result<ReadTransaction> {
        self.db.begin_read().map_err(StorageError::backend(operation))
    }

    /// Apply `change` to the records table in its own write transaction
    fn write<F>(&self, operation: &'static str, change: F) -> Result<()>
    where
        F: FnOnce(
            &mut redb::Table<'_, &'static [u8], &'static [u8]>,
        ) -> std::result::Result<(), redb::StorageError>,
    {
        let txn = self.db.begin_write().map_err(StorageError::backend(operation))?;
        {
            let mut table = txn
                .open_table(RECORDS_TABLE)
                .map_err(StorageError::backend(operation))?;
            change(&mut table).map_err(StorageError::backend(operation))?;
        }
        txn.commit().map_err(StorageError::backend(operation))
    }

    /// Visit every entry under `prefix` in key order
    fn walk_prefix<F>(&self, operation: &'static str, prefix: &[u8], mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]),
    {
        let txn = self.read(operation)?;
        let table = txn
            .open_table(RECORDS_TABLE)
            .map_err(StorageError::backend(operation))?;

        for entry in table
            .range(prefix..)
            .map_err(StorageError::backend(operation))?
        {
            let (key, value) = entry.map_err(StorageError::backend(operation))?;
            if !key.value().starts_with(prefix) {
                break;
            }
            visit(key.value(), value.value());
        }

        Ok(())
    }
}

impl KVStore for RedbBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        debug!("get {}", String::from_utf8_lossy(key));

        let txn = self.read("get")?;
        let table = txn
            .open_table(RECORDS_TABLE)
            .map_err(StorageError::backend("get"))?;
        let value = table.get(key).map_err(StorageError::backend("get"))?;

        Ok(value.map(|v| Bytes::copy_from_slice(v.value())))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        debug!("put {}", String::from_utf8_lossy(key));
        self.write("put", |table| table.insert(key, value).map(|_| ()))
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        debug!("delete {}", String::from_utf8_lossy(key));
        self.write("delete", |table| table.remove(key).map(|_| ()))
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>> {
        let mut entries = Vec::new();
        self.walk_prefix("scan", prefix, |k, v| {
            entries.push((Bytes::copy_from_slice(k), Bytes::copy_from_slice(v)))
        })?;

        debug!("scan {} matched {}", String::from_utf8_lossy(prefix), entries.len());
        Ok(entries)
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Bytes>> {
        let mut keys = Vec::new();
        self.walk_prefix("keys", prefix, |k, _| keys.push(Bytes::copy_from_slice(k)))?;
        Ok(keys)
    }
}
