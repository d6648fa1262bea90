//! Adapter facade: validates configuration and opens encrypted stores.

use crate::config::StoreConfig;
use crate::crypto::CryptoEngine;
use crate::error::{CoreError, CoreResult};
use crate::key::Algorithm;
use crate::store::EncryptedStore;
use crackup_storage::{Capabilities, Capability, OrderedStore, StorageResult, StoreFactory};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Opens encrypted stores on top of a backend factory.
///
/// Construction validates the whole configuration up front, in this order:
///
/// 1. a key is present (`MissingKey`)
/// 2. a backend is present (`MissingBackend`)
/// 3. the algorithm, if named, is supported (`UnsupportedAlgorithm`) and
///    matches the key (`MalformedKey`)
///
/// Nothing is opened until [`open_store`](Self::open_store). One adapter can
/// open any number of locations; they all share the same key.
///
/// The adapter is itself a [`StoreFactory`], so it can stand in wherever a
/// plain backend is expected.
pub struct EncryptedAdapter {
    engine: Arc<CryptoEngine>,
    backend: Arc<dyn StoreFactory>,
}

impl EncryptedAdapter {
    /// Validates `config` and builds an adapter.
    ///
    /// # Errors
    ///
    /// See the type-level docs for the validation order.
    pub fn new(config: StoreConfig) -> CoreResult<Self> {
        let StoreConfig {
            key,
            backend,
            algorithm,
        } = config;

        let key = key.ok_or(CoreError::MissingKey)?;
        let backend = backend.ok_or(CoreError::MissingBackend)?;

        if let Some(name) = algorithm {
            let requested: Algorithm = name.parse()?;
            if requested != key.algorithm() {
                return Err(CoreError::malformed_key(format!(
                    "key is {} but {} was requested",
                    key.algorithm(),
                    requested
                )));
            }
        }

        let engine = CryptoEngine::new(&key)?;
        debug!(
            algorithm = %engine.algorithm(),
            capabilities = ?backend.capabilities(),
            "encrypted adapter ready"
        );

        Ok(Self {
            engine: Arc::new(engine),
            backend,
        })
    }

    /// Returns the encryption algorithm.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.engine.algorithm()
    }

    /// Returns the backend's administrative capabilities.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    /// Opens the store at `location`.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the location cannot be opened.
    pub fn open_store(&self, location: &Path) -> CoreResult<EncryptedStore> {
        let raw = self.backend.open(location)?;
        debug!(location = %location.display(), "opened encrypted store");
        Ok(EncryptedStore::new(
            raw,
            Arc::clone(&self.engine),
            Arc::clone(&self.backend),
            location.to_path_buf(),
        ))
    }

    /// Destroys the store at `location` through the backend.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported(Destroy)` if the backend lacks the capability.
    pub fn destroy(&self, location: &Path) -> CoreResult<()> {
        StoreFactory::destroy(self, location)?;
        info!(location = %location.display(), "destroyed encrypted store");
        Ok(())
    }

    /// Repairs the store at `location` through the backend.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported(Repair)` if the backend lacks the capability.
    pub fn repair(&self, location: &Path) -> CoreResult<()> {
        StoreFactory::repair(self, location)?;
        info!(location = %location.display(), "repaired encrypted store");
        Ok(())
    }
}

impl fmt::Debug for EncryptedAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedAdapter")
            .field("engine", &self.engine)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

impl StoreFactory for EncryptedAdapter {
    fn open(&self, location: &Path) -> StorageResult<Box<dyn OrderedStore>> {
        Ok(Box::new(self.open_store(location)?))
    }

    fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    fn destroy(&self, location: &Path) -> StorageResult<()> {
        self.capabilities().require(Capability::Destroy)?;
        self.backend.destroy(location)
    }

    fn repair(&self, location: &Path) -> StorageResult<()> {
        self.capabilities().require(Capability::Repair)?;
        self.backend.repair(location)
    }
}

/// Validates `config` and opens the encrypted store at `location`.
///
/// Shorthand for `EncryptedAdapter::new(config)?.open_store(location)`.
///
/// # Errors
///
/// Any configuration error from [`EncryptedAdapter::new`], then any backend
/// error from opening.
pub fn open(config: StoreConfig, location: &Path) -> CoreResult<EncryptedStore> {
    EncryptedAdapter::new(config)?.open_store(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyManager;
    use crackup_storage::{InMemoryStoreFactory, StorageError};

    fn config() -> StoreConfig {
        StoreConfig::new()
            .key(KeyManager::new().generate_default())
            .backend_factory(InMemoryStoreFactory::new())
    }

    #[test]
    fn missing_key_checked_first() {
        let err = EncryptedAdapter::new(StoreConfig::new()).unwrap_err();
        assert!(matches!(err, CoreError::MissingKey));

        let err = EncryptedAdapter::new(StoreConfig::new().algorithm("A192GCM")).unwrap_err();
        assert!(matches!(err, CoreError::MissingKey));
    }

    #[test]
    fn missing_backend_checked_second() {
        let config = StoreConfig::new()
            .key(KeyManager::new().generate_default())
            .algorithm("bogus");
        assert!(matches!(
            EncryptedAdapter::new(config).unwrap_err(),
            CoreError::MissingBackend
        ));
    }

    #[test]
    fn unsupported_algorithm_rejected() {
        let err = EncryptedAdapter::new(config().algorithm("A192GCM")).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedAlgorithm { ref algorithm } if algorithm == "A192GCM"));
    }

    #[test]
    fn algorithm_must_match_key() {
        let err = EncryptedAdapter::new(config().algorithm("A128GCM")).unwrap_err();
        assert!(matches!(err, CoreError::MalformedKey { .. }));

        let adapter = EncryptedAdapter::new(config().algorithm("A256GCM")).unwrap();
        assert_eq!(adapter.algorithm(), Algorithm::A256Gcm);
    }

    #[test]
    fn unnamed_algorithm_follows_key() {
        let config = StoreConfig::new()
            .key(KeyManager::new().generate(Algorithm::A128Gcm))
            .backend_factory(InMemoryStoreFactory::new());
        let adapter = EncryptedAdapter::new(config).unwrap();
        assert_eq!(adapter.algorithm(), Algorithm::A128Gcm);
    }

    #[test]
    fn adapter_is_a_factory() {
        let adapter = EncryptedAdapter::new(config()).unwrap();
        let factory: &dyn StoreFactory = &adapter;
        assert!(factory.capabilities().contains(Capability::Destroy));

        let store = factory.open(Path::new("nested")).unwrap();
        store.put(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), b"v");
    }

    #[test]
    fn repair_unsupported_in_memory() {
        let adapter = EncryptedAdapter::new(config()).unwrap();
        let err = adapter.repair(Path::new("x")).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Storage(StorageError::Unsupported(Capability::Repair))
        ));
    }

    #[test]
    fn open_shorthand() {
        let store = open(config(), Path::new("db")).unwrap();
        assert_eq!(store.location(), Path::new("db"));
        assert_eq!(store.algorithm(), Algorithm::A256Gcm);
    }
}
