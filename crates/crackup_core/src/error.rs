//! Error types for Crackup core.

use crackup_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Crackup core operations.
///
/// Configuration errors (`MissingKey`, `MissingBackend`,
/// `UnsupportedAlgorithm`, `MalformedKey`) are raised while building an
/// adapter and never later. `AuthenticationFailure` is scoped to the single
/// record that triggered it.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Backing store error, passed through unchanged.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// No symmetric key was configured.
    #[error("a symmetric key is required")]
    MissingKey,

    /// No backing store constructor was configured.
    #[error("a backing store constructor is required")]
    MissingBackend,

    /// The algorithm identifier is not supported.
    #[error("unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm {
        /// The identifier that was rejected.
        algorithm: String,
    },

    /// A key descriptor is structurally invalid.
    #[error("malformed key: {message}")]
    MalformedKey {
        /// Description of the defect.
        message: String,
    },

    /// No record is stored under the requested key.
    #[error("key not found: {}", String::from_utf8_lossy(.key))]
    NotFound {
        /// The key that was looked up.
        key: Vec<u8>,
    },

    /// A payload failed authentication: wrong key, corruption, or tampering.
    #[error("authentication failed{}", describe_record(.key))]
    AuthenticationFailure {
        /// The record whose value failed, when known.
        key: Option<Vec<u8>>,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },
}

fn describe_record(key: &Option<Vec<u8>>) -> String {
    key.as_ref()
        .map(|key| format!(" for record {}", String::from_utf8_lossy(key)))
        .unwrap_or_default()
}

impl From<StorageError> for CoreError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound { key } => Self::NotFound { key },
            other => Self::Storage(other),
        }
    }
}

impl From<CoreError> for StorageError {
    /// Maps core errors onto the storage error shapes, for callers that
    /// consume an encrypted store through [`crackup_storage::OrderedStore`].
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Storage(inner) => inner,
            CoreError::NotFound { key } => Self::NotFound { key },
            other => Self::Encryption(other.to_string()),
        }
    }
}

impl CoreError {
    /// Creates an unsupported algorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// Creates a malformed key error.
    pub fn malformed_key(message: impl Into<String>) -> Self {
        Self::MalformedKey {
            message: message.into(),
        }
    }

    /// Creates an authentication failure with no record attached.
    pub fn authentication_failure() -> Self {
        Self::AuthenticationFailure { key: None }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Attaches the record key to an authentication failure.
    #[must_use]
    pub fn for_record(self, record: &[u8]) -> Self {
        match self {
            Self::AuthenticationFailure { key: None } => Self::AuthenticationFailure {
                key: Some(record.to_vec()),
            },
            other => other,
        }
    }

    /// Returns `true` if this error reports an absent key.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this error reports a failed authentication tag.
    #[must_use]
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_lifts_out_of_storage() {
        let error = CoreError::from(StorageError::not_found(b"k"));
        assert!(error.is_not_found());
    }

    #[test]
    fn io_errors_pass_through() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let error = CoreError::from(StorageError::from(io));
        assert!(matches!(error, CoreError::Storage(StorageError::Io(_))));
    }

    #[test]
    fn auth_failure_maps_to_storage_encryption() {
        let error = StorageError::from(CoreError::authentication_failure().for_record(b"doc"));
        match error {
            StorageError::Encryption(message) => assert!(message.contains("doc")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn for_record_keeps_existing_key() {
        let error = CoreError::AuthenticationFailure {
            key: Some(b"first".to_vec()),
        }
        .for_record(b"second");
        assert!(matches!(
            error,
            CoreError::AuthenticationFailure { key: Some(ref k) } if k == b"first"
        ));
    }
}
