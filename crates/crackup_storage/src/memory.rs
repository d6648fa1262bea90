//! In-memory ordered store for testing.

use crate::cursor::{Seek, SeekCursor};
use crate::error::{StorageError, StorageResult};
use crate::factory::{Capabilities, Capability, StoreFactory};
use crate::store::{BatchOp, Direction, IterOptions, OrderedStore, Record, RecordIter};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type Table = Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>;

/// An in-memory ordered store.
///
/// This store keeps all records in a shared `BTreeMap` and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// Cloning yields another handle onto the same records.
///
/// # Example
///
/// ```rust
/// use crackup_storage::{InMemoryStore, OrderedStore};
///
/// let store = InMemoryStore::new();
/// store.put(b"key", b"value").unwrap();
/// assert_eq!(store.get(b"key").unwrap(), b"value");
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    table: Table,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns `true` if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// Returns a copy of all records in key order.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Record> {
        self.table
            .read()
            .iter()
            .map(|(key, value)| Record::new(key.clone(), value.clone()))
            .collect()
    }
}

impl Seek for InMemoryStore {
    fn seek(
        &self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        direction: Direction,
    ) -> StorageResult<Option<Record>> {
        let table = self.table.read();
        let mut range = table.range::<[u8], _>((lower, upper));
        let entry = match direction {
            Direction::Forward => range.next(),
            Direction::Reverse => range.next_back(),
        };
        Ok(entry.map(|(key, value)| Record::new(key.clone(), value.clone())))
    }
}

impl OrderedStore for InMemoryStore {
    fn get(&self, key: &[u8]) -> StorageResult<Vec<u8>> {
        self.table
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.table.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.table.write().remove(key);
        Ok(())
    }

    fn batch(&self, ops: Vec<BatchOp>) -> StorageResult<()> {
        // One write guard for the whole batch keeps it atomic to readers
        let mut table = self.table.write();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    table.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    table.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn iter(&self, options: IterOptions) -> StorageResult<RecordIter<'_>> {
        Ok(Box::new(SeekCursor::new(self, options)))
    }
}

/// Factory handing out [`InMemoryStore`] handles by location.
///
/// Every open of the same location shares one table, so data survives a
/// close/reopen cycle for as long as the factory lives. `destroy` forgets
/// the location.
#[derive(Debug, Default)]
pub struct InMemoryStoreFactory {
    tables: Mutex<HashMap<PathBuf, Table>>,
}

impl InMemoryStoreFactory {
    /// Creates a factory with no locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `location` as a concrete [`InMemoryStore`] handle.
    #[must_use]
    pub fn open_store(&self, location: &Path) -> InMemoryStore {
        let mut tables = self.tables.lock();
        let table = tables.entry(location.to_path_buf()).or_default();
        InMemoryStore {
            table: Arc::clone(table),
        }
    }

    /// Returns `true` if `location` has been opened and not destroyed.
    #[must_use]
    pub fn exists(&self, location: &Path) -> bool {
        self.tables.lock().contains_key(location)
    }
}

impl StoreFactory for InMemoryStoreFactory {
    fn open(&self, location: &Path) -> StorageResult<Box<dyn OrderedStore>> {
        Ok(Box::new(self.open_store(location)))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::from([Capability::Destroy])
    }

    fn destroy(&self, location: &Path) -> StorageResult<()> {
        if let Some(table) = self.tables.lock().remove(location) {
            // Handles still alive elsewhere must not see stale records
            table.write().clear();
        }
        Ok(())
    }
}
