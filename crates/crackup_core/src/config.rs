//! Adapter configuration.

use crate::key::SymmetricKey;
use crackup_storage::StoreFactory;
use std::fmt;
use std::sync::Arc;

/// Configuration for opening an encrypted store.
///
/// `key` and `backend` are required; [`EncryptedAdapter::new`] rejects a
/// config missing either before touching any storage.
///
/// [`EncryptedAdapter::new`]: crate::EncryptedAdapter::new
///
/// # Example
///
/// ```rust
/// use crackup_core::{KeyManager, StoreConfig};
/// use crackup_storage::InMemoryStoreFactory;
///
/// let config = StoreConfig::new()
///     .key(KeyManager::new().generate_default())
///     .backend_factory(InMemoryStoreFactory::new())
///     .algorithm("A256GCM");
/// assert!(config.key.is_some());
/// ```
#[derive(Clone, Default)]
pub struct StoreConfig {
    /// Key used to encrypt every value.
    pub key: Option<SymmetricKey>,

    /// Constructor for the backing stores that hold the ciphertext.
    pub backend: Option<Arc<dyn StoreFactory>>,

    /// Expected algorithm identifier; must match the key when set.
    /// Defaults to the key's own algorithm (A256GCM for generated keys).
    pub algorithm: Option<String>,
}

impl StoreConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the symmetric key.
    #[must_use]
    pub fn key(mut self, key: SymmetricKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Sets a shared backend factory.
    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn StoreFactory>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets an owned backend factory.
    #[must_use]
    pub fn backend_factory<F: StoreFactory + 'static>(self, backend: F) -> Self {
        self.backend(Arc::new(backend))
    }

    /// Sets the expected algorithm identifier.
    #[must_use]
    pub fn algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("key", &self.key)
            .field(
                "backend",
                &self.backend.as_ref().map(|backend| backend.capabilities()),
            )
            .field("algorithm", &self.algorithm)
            .finish()
    }
}
