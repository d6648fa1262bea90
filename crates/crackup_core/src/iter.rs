//! Order-preserving decrypting iterator.
//!
//! Keys are stored in plaintext, so the backing cursor's order is already
//! the logical order. [`EncryptedIter`] only has to decrypt each value as it
//! is pulled, one raw record per `next()`, with no read-ahead.

use crate::crypto::CryptoEngine;
use crate::error::CoreResult;
use crackup_storage::RecordIter;
use tracing::warn;

/// Iterator over decrypted `(key, value)` pairs in backing-store order.
///
/// # Error Handling
///
/// - A record that fails authentication yields
///   `Err(AuthenticationFailure { key: Some(..) })`. The backing cursor is
///   already past it, so calling `next()` again continues with the
///   following key. Consumers should treat the error as a hard stop unless
///   they opted into [`skip_undecryptable`](Self::skip_undecryptable).
/// - Backing store errors are yielded unchanged and end the scan.
///
/// The iterator is exhausted exactly when the backing cursor is, and it
/// cannot be restarted.
///
/// # Example
///
/// ```rust
/// use crackup_core::{open, IterOptions, KeyManager, StoreConfig};
/// use crackup_storage::InMemoryStoreFactory;
/// use std::path::Path;
///
/// let config = StoreConfig::new()
///     .key(KeyManager::new().generate_default())
///     .backend_factory(InMemoryStoreFactory::new());
/// let store = open(config, Path::new("docs")).unwrap();
/// store.put(b"b", b"second").unwrap();
/// store.put(b"a", b"first").unwrap();
///
/// let pairs: Vec<_> = store
///     .iter(IterOptions::new())
///     .unwrap()
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(pairs[0], (b"a".to_vec(), b"first".to_vec()));
/// ```
pub struct EncryptedIter<'a> {
    inner: RecordIter<'a>,
    engine: &'a CryptoEngine,
    skip_undecryptable: bool,
    skipped: usize,
}

impl<'a> EncryptedIter<'a> {
    pub(crate) fn new(inner: RecordIter<'a>, engine: &'a CryptoEngine) -> Self {
        Self {
            inner,
            engine,
            skip_undecryptable: false,
            skipped: 0,
        }
    }

    /// Silently passes over records that fail authentication instead of
    /// yielding an error for them.
    ///
    /// Skipped records still count toward the scan's `limit`, which the
    /// backing cursor enforces.
    #[must_use]
    pub fn skip_undecryptable(mut self) -> Self {
        self.skip_undecryptable = true;
        self
    }

    /// Returns how many records have been skipped so far.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for EncryptedIter<'_> {
    type Item = CoreResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.inner.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e.into())),
            };

            match self.engine.open(&record.value) {
                Ok(plaintext) => return Some(Ok((record.key, plaintext))),
                Err(e) if self.skip_undecryptable && e.is_authentication_failure() => {
                    warn!(
                        key = %String::from_utf8_lossy(&record.key),
                        "skipping record that failed authentication"
                    );
                    self.skipped += 1;
                }
                Err(e) => return Some(Err(e.for_record(&record.key))),
            }
        }
    }
}

impl std::fmt::Debug for EncryptedIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedIter")
            .field("skip_undecryptable", &self.skip_undecryptable)
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}
