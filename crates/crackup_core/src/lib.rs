//! # Crackup Core
//!
//! Transparent value encryption for ordered key-value stores.
//!
//! This crate provides:
//! - Key management: generation, JWK-style import/export, password derivation
//! - AES-GCM authenticated encryption of stored values
//! - An encrypting store that keeps the backend's key order intact
//! - An order-preserving decrypting iterator
//! - An adapter facade that validates configuration and forwards
//!   administrative methods to the backend
//!
//! Keys are stored in plaintext; only values are encrypted. Anyone with
//! access to the backing store can therefore see which keys exist and their
//! order, but not what they hold.
//!
//! ## Example
//!
//! ```rust
//! use crackup_core::{open, KeyManager, StoreConfig};
//! use crackup_storage::InMemoryStoreFactory;
//! use std::path::Path;
//!
//! let keys = KeyManager::new();
//! let config = StoreConfig::new()
//!     .key(keys.generate_default())
//!     .backend_factory(InMemoryStoreFactory::new());
//!
//! let store = open(config, Path::new("app")).unwrap();
//! store.put(b"user:1", br#"{"name":"ada"}"#).unwrap();
//! assert_eq!(store.get(b"user:1").unwrap(), br#"{"name":"ada"}"#);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod config;
mod crypto;
mod error;
mod iter;
mod key;
mod store;

pub use adapter::{open, EncryptedAdapter};
pub use config::StoreConfig;
pub use crypto::{CryptoEngine, EncryptedPayload, NONCE_SIZE, PAYLOAD_OVERHEAD, PAYLOAD_VERSION, TAG_SIZE};
pub use error::{CoreError, CoreResult};
pub use iter::EncryptedIter;
pub use key::{Algorithm, KeyDescriptor, KeyManager, SymmetricKey, KEY_TYPE_OCT};
pub use store::{EncryptedStore, RawView};

pub use crackup_storage::{
    BatchOp, Capabilities, Capability, Direction, IterOptions, OrderedStore, StorageError,
    StoreFactory,
};
