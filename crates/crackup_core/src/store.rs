//! Encrypting wrapper around a backing ordered store.

use crate::crypto::CryptoEngine;
use crate::error::{CoreError, CoreResult};
use crate::iter::EncryptedIter;
use crate::key::Algorithm;
use crackup_storage::{
    BatchOp, Capabilities, Capability, IterOptions, OrderedStore, Record, RecordIter,
    StorageResult, StoreFactory,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// An ordered store whose values are encrypted at rest.
///
/// Keys are written unmodified, so the backing store's byte-lexicographic
/// ordering, and every range or prefix scan built on it, is unchanged.
/// Values are sealed with the adapter's [`CryptoEngine`] on the way in and
/// authenticated on the way out.
///
/// Created by [`EncryptedAdapter::open_store`](crate::EncryptedAdapter::open_store).
///
/// # Thread Safety
///
/// All methods take `&self`; the store can be shared behind an `Arc`.
/// Conflicting I/O is serialized by the backing store, and batches are the
/// only unit of atomicity.
///
/// Dropping the store closes it. Iterators borrow the store, so they cannot
/// outlive it.
pub struct EncryptedStore {
    raw: Box<dyn OrderedStore>,
    engine: Arc<CryptoEngine>,
    backend: Arc<dyn StoreFactory>,
    location: PathBuf,
}

impl EncryptedStore {
    pub(crate) fn new(
        raw: Box<dyn OrderedStore>,
        engine: Arc<CryptoEngine>,
        backend: Arc<dyn StoreFactory>,
        location: PathBuf,
    ) -> Self {
        Self {
            raw,
            engine,
            backend,
            location,
        }
    }

    /// Returns the location this store was opened at.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Returns the encryption algorithm.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.engine.algorithm()
    }

    /// Returns a read-only view of the backing store, for audits.
    ///
    /// Values read through the view are ciphertext.
    #[must_use]
    pub fn raw(&self) -> RawView<'_> {
        RawView {
            store: self.raw.as_ref(),
        }
    }

    /// Returns the administrative methods the backend provides.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    /// Reads and decrypts the value stored under `key`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the key is absent
    /// - `AuthenticationFailure` if the stored bytes do not authenticate
    ///   under this store's key
    /// - backing store errors, unchanged
    pub fn get(&self, key: &[u8]) -> CoreResult<Vec<u8>> {
        let sealed = self.raw.get(key)?;
        self.engine.open(&sealed).map_err(|e| e.for_record(key))
    }

    /// Encrypts `value` and stores it under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the backing write fails.
    pub fn put(&self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        let sealed = self.engine.seal(value)?;
        self.raw.put(key, &sealed)?;
        Ok(())
    }

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing delete fails.
    pub fn delete(&self, key: &[u8]) -> CoreResult<()> {
        self.raw.delete(key)?;
        Ok(())
    }

    /// Applies `ops` atomically, encrypting every put first.
    ///
    /// Encryption happens before anything reaches the backing store, so a
    /// failure there leaves the store untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails or the backing batch fails; in
    /// both cases none of the operations are applied.
    pub fn batch(&self, ops: Vec<BatchOp>) -> CoreResult<()> {
        let sealed = ops
            .into_iter()
            .map(|op| match op {
                BatchOp::Put { key, value } => {
                    let value = self.engine.seal(&value)?;
                    Ok(BatchOp::Put { key, value })
                }
                delete @ BatchOp::Delete { .. } => Ok(delete),
            })
            .collect::<CoreResult<Vec<_>>>()?;

        debug!(ops = sealed.len(), "applying encrypted batch");
        self.raw.batch(sealed)?;
        Ok(())
    }

    /// Opens a decrypting cursor over the records selected by `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing cursor cannot be opened.
    pub fn iter(&self, options: IterOptions) -> CoreResult<EncryptedIter<'_>> {
        let inner = self.raw.iter(options)?;
        Ok(EncryptedIter::new(inner, &self.engine))
    }

    /// Scans keys only, without decrypting any value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing cursor cannot be opened.
    pub fn keys(
        &self,
        options: IterOptions,
    ) -> CoreResult<impl Iterator<Item = CoreResult<Vec<u8>>> + '_> {
        let inner = self.raw.iter(options)?;
        Ok(inner.map(|record| record.map(|record| record.key).map_err(CoreError::from)))
    }

    /// Flushes the backing store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing flush fails.
    pub fn flush(&self) -> CoreResult<()> {
        self.raw.flush()?;
        Ok(())
    }

    /// Closes the store and destroys its location through the backend.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported(Destroy)` if the backend lacks the capability,
    /// or the backend's own error. The store is closed either way.
    pub fn destroy(self) -> CoreResult<()> {
        let Self {
            raw,
            backend,
            location,
            ..
        } = self;
        drop(raw);

        backend.capabilities().require(Capability::Destroy)?;
        backend.destroy(&location)?;
        info!(location = %location.display(), "destroyed encrypted store");
        Ok(())
    }

    /// Closes the store and repairs its location through the backend.
    ///
    /// Reopen the location afterwards to continue using it.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported(Repair)` if the backend lacks the capability,
    /// or the backend's own error. The store is closed either way.
    pub fn repair(self) -> CoreResult<()> {
        let Self {
            raw,
            backend,
            location,
            ..
        } = self;
        drop(raw);

        backend.capabilities().require(Capability::Repair)?;
        backend.repair(&location)?;
        info!(location = %location.display(), "repaired encrypted store");
        Ok(())
    }
}

/// Read-only access to the records an [`EncryptedStore`] keeps in its
/// backing store, exactly as stored.
#[derive(Clone, Copy)]
pub struct RawView<'a> {
    store: &'a dyn OrderedStore,
}

impl<'a> RawView<'a> {
    /// Reads the stored payload under `key` without decrypting it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key is absent, or the backing store's error.
    pub fn get(&self, key: &[u8]) -> StorageResult<Vec<u8>> {
        self.store.get(key)
    }

    /// Scans stored payloads without decrypting them.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing cursor cannot be opened.
    pub fn iter(&self, options: IterOptions) -> StorageResult<RecordIter<'a>> {
        self.store.iter(options)
    }
}

impl fmt::Debug for RawView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawView").finish_non_exhaustive()
    }
}

impl fmt::Debug for EncryptedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedStore")
            .field("location", &self.location)
            .field("engine", &self.engine)
            .field("capabilities", &self.capabilities())
            .finish_non_exhaustive()
    }
}

/// Lets layers written against the plain store contract run on top of
/// encryption unchanged. Authentication failures surface as
/// `StorageError::Encryption`.
impl OrderedStore for EncryptedStore {
    fn get(&self, key: &[u8]) -> StorageResult<Vec<u8>> {
        Ok(EncryptedStore::get(self, key)?)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        Ok(EncryptedStore::put(self, key, value)?)
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        Ok(EncryptedStore::delete(self, key)?)
    }

    fn batch(&self, ops: Vec<BatchOp>) -> StorageResult<()> {
        Ok(EncryptedStore::batch(self, ops)?)
    }

    fn iter(&self, options: IterOptions) -> StorageResult<RecordIter<'_>> {
        let iter = EncryptedStore::iter(self, options)?;
        Ok(Box::new(iter.map(|item| {
            item.map(|(key, value)| Record { key, value })
                .map_err(Into::into)
        })))
    }

    fn flush(&self) -> StorageResult<()> {
        Ok(EncryptedStore::flush(self)?)
    }
}
