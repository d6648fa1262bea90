//! Error types for storage operations.

use crate::factory::Capability;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No record is stored under the requested key.
    #[error("key not found: {}", String::from_utf8_lossy(.key))]
    NotFound {
        /// The key that was looked up.
        key: Vec<u8>,
    },

    /// The storage is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Another handle holds the exclusive lock on this location.
    #[error("storage locked: another handle has exclusive access")]
    Locked,

    /// The backend does not provide the requested administrative method.
    #[error("backend does not support {0}")]
    Unsupported(Capability),

    /// A key, value, or batch exceeds what the log format can record.
    #[error("{what} of {len} bytes exceeds the 4 GiB record limit")]
    TooLarge {
        /// Which part of the write was too large.
        what: &'static str,
        /// Its length in bytes.
        len: usize,
    },

    /// Encryption or decryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),
}

impl StorageError {
    /// Creates a not-found error for `key`.
    pub fn not_found(key: &[u8]) -> Self {
        Self::NotFound { key: key.to_vec() }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Returns `true` if this error reports an absent key.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
