//! Ordered store trait definition.

use crate::error::StorageResult;
use std::ops::Bound;

/// A single key/value pair as held by a backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record key. Ordering is byte-lexicographic.
    pub key: Vec<u8>,
    /// Record value, opaque to the store.
    pub value: Vec<u8>,
}

impl Record {
    /// Creates a record.
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Splits the record into its key and value.
    #[must_use]
    pub fn into_pair(self) -> (Vec<u8>, Vec<u8>) {
        (self.key, self.value)
    }
}

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite a record.
    Put {
        /// Record key.
        key: Vec<u8>,
        /// Record value.
        value: Vec<u8>,
    },
    /// Remove a record. Removing an absent key is not an error.
    Delete {
        /// Record key.
        key: Vec<u8>,
    },
}

impl BatchOp {
    /// Creates a put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates a delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self::Delete { key: key.into() }
    }

    /// Returns the key this operation targets.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// Traversal direction of an iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending key order.
    #[default]
    Forward,
    /// Descending key order.
    Reverse,
}

/// Range, direction and limit of an ordered scan.
///
/// The default scans every key in ascending order.
///
/// ```rust
/// use crackup_storage::{Direction, IterOptions};
///
/// let opts = IterOptions::prefix(b"user:").reverse().limit(10);
/// assert_eq!(opts.direction, Direction::Reverse);
/// assert!(opts.contains(b"user:42"));
/// assert!(!opts.contains(b"users"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterOptions {
    /// Lower key bound.
    pub lower: Bound<Vec<u8>>,
    /// Upper key bound.
    pub upper: Bound<Vec<u8>>,
    /// Traversal direction.
    pub direction: Direction,
    /// Maximum number of records to yield.
    pub limit: Option<usize>,
}

impl Default for IterOptions {
    fn default() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
            direction: Direction::Forward,
            limit: None,
        }
    }
}

impl IterOptions {
    /// Creates options for a full forward scan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans every key starting with `prefix`.
    #[must_use]
    pub fn prefix(prefix: &[u8]) -> Self {
        Self {
            lower: Bound::Included(prefix.to_vec()),
            upper: prefix_successor(prefix).map_or(Bound::Unbounded, Bound::Excluded),
            ..Self::default()
        }
    }

    /// Sets explicit bounds.
    #[must_use]
    pub fn range(mut self, lower: Bound<Vec<u8>>, upper: Bound<Vec<u8>>) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    /// Includes keys greater than or equal to `key`.
    #[must_use]
    pub fn from_key(mut self, key: &[u8]) -> Self {
        self.lower = Bound::Included(key.to_vec());
        self
    }

    /// Includes keys strictly less than `key`.
    #[must_use]
    pub fn until_key(mut self, key: &[u8]) -> Self {
        self.upper = Bound::Excluded(key.to_vec());
        self
    }

    /// Sets the traversal direction.
    #[must_use]
    pub const fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Scans in descending key order.
    #[must_use]
    pub const fn reverse(self) -> Self {
        self.direction(Direction::Reverse)
    }

    /// Caps the number of records yielded.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns `true` if `key` falls inside the bounds.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        let above = match &self.lower {
            Bound::Included(lower) => key >= lower.as_slice(),
            Bound::Excluded(lower) => key > lower.as_slice(),
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(upper) => key <= upper.as_slice(),
            Bound::Excluded(upper) => key < upper.as_slice(),
            Bound::Unbounded => true,
        };
        above && below
    }
}

/// Smallest key greater than every key starting with `prefix`.
///
/// `None` when no such key exists (empty or all-`0xFF` prefix).
fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Lazily advancing sequence of records from a backing store.
pub type RecordIter<'a> = Box<dyn Iterator<Item = StorageResult<Record>> + Send + 'a>;

/// An ordered byte-store.
///
/// Stores are **opaque**: they compare keys byte-lexicographically and never
/// look inside values. All methods take `&self`; implementations serialize
/// conflicting physical I/O internally.
///
/// # Invariants
///
/// - `get` returns exactly the bytes last written under that key
/// - `iter` yields keys in strict byte-lexicographic order (or its reverse)
/// - `batch` applies all of its operations or none of them, and two batches
///   never interleave
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait OrderedStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`](crate::StorageError::NotFound) if
    /// the key is absent, or an I/O error.
    fn get(&self, key: &[u8]) -> StorageResult<Vec<u8>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Removes `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Applies `ops` atomically, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be applied; in that case
    /// none of its operations are visible.
    fn batch(&self, ops: Vec<BatchOp>) -> StorageResult<()>;

    /// Opens a cursor over the records selected by `options`.
    ///
    /// The cursor advances one record per `next()` call and holds no lock
    /// between calls. Writes that land ahead of the cursor are observed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor cannot be opened.
    fn iter(&self, options: IterOptions) -> StorageResult<RecordIter<'_>>;

    /// Pushes buffered writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_successor_increments_last_byte() {
        assert_eq!(prefix_successor(b"abc"), Some(b"abd".to_vec()));
        assert_eq!(prefix_successor(&[b'a', 0xFF]), Some(b"b".to_vec()));
        assert_eq!(prefix_successor(&[0xFF, 0xFF]), None);
        assert_eq!(prefix_successor(b""), None);
    }

    #[test]
    fn prefix_options_select_prefixed_keys() {
        let opts = IterOptions::prefix(b"doc:");
        assert!(opts.contains(b"doc:"));
        assert!(opts.contains(b"doc:zzz"));
        assert!(!opts.contains(b"doc"));
        assert!(!opts.contains(b"doc;"));
    }

    #[test]
    fn explicit_range_bounds() {
        let opts = IterOptions::new().from_key(b"b").until_key(b"d");
        assert!(!opts.contains(b"a"));
        assert!(opts.contains(b"b"));
        assert!(opts.contains(b"c"));
        assert!(!opts.contains(b"d"));

        let opts = IterOptions::new().range(
            Bound::Excluded(b"b".to_vec()),
            Bound::Included(b"d".to_vec()),
        );
        assert!(!opts.contains(b"b"));
        assert!(opts.contains(b"c"));
        assert!(opts.contains(b"d"));
        assert!(!opts.contains(b"e"));
    }

    #[test]
    fn batch_op_key() {
        assert_eq!(BatchOp::put(b"k".to_vec(), b"v".to_vec()).key(), b"k");
        assert_eq!(BatchOp::delete(b"x".to_vec()).key(), b"x");
    }
}
