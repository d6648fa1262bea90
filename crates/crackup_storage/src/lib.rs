//! # Crackup Storage
//!
//! The ordered byte-store contract that the Crackup encryption layer wraps,
//! plus two reference backends.
//!
//! Backends are **opaque sorted byte stores**. They compare keys
//! byte-lexicographically and never interpret the values they hold, which
//! is what lets an encryption layer sit on top of them without disturbing
//! range scans.
//!
//! ## Design Principles
//!
//! - Stores expose `get`, `put`, `delete`, atomic `batch`, and ordered `iter`
//! - Administrative methods (`destroy`, `repair`) live on the [`StoreFactory`]
//!   and are advertised through an explicit [`Capabilities`] table
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Backends
//!
//! - [`InMemoryStore`] - For testing and ephemeral storage
//! - [`FileStore`] - Log-structured persistent storage
//!
//! ## Example
//!
//! ```rust
//! use crackup_storage::{InMemoryStore, IterOptions, OrderedStore};
//!
//! let store = InMemoryStore::new();
//! store.put(b"b", b"2").unwrap();
//! store.put(b"a", b"1").unwrap();
//!
//! let keys: Vec<Vec<u8>> = store
//!     .iter(IterOptions::new())
//!     .unwrap()
//!     .map(|record| record.unwrap().key)
//!     .collect();
//! assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod error;
mod factory;
mod file;
mod log;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use factory::{Capabilities, Capability, StoreFactory};
pub use file::{FileStore, FileStoreFactory};
pub use memory::{InMemoryStore, InMemoryStoreFactory};
pub use store::{BatchOp, Direction, IterOptions, OrderedStore, Record, RecordIter};
