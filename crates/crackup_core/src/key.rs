//! Symmetric key management.
//!
//! Keys are generated, imported, or derived through a [`KeyManager`] value.
//! The only way key bytes leave process memory is [`KeyManager::export`],
//! which produces a JWK-style [`KeyDescriptor`]:
//!
//! ```json
//! { "kty": "oct", "k": "<base64url, no padding>", "alg": "A256GCM", "ext": true }
//! ```

use crate::error::{CoreError, CoreResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// JWK key type for symmetric ("octet sequence") keys.
pub const KEY_TYPE_OCT: &str = "oct";

/// HKDF info string binding derived keys to this layer.
const DERIVE_INFO: &[u8] = b"crackup-value-key-v1";

/// Supported AEAD algorithms, named by their JOSE identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Algorithm {
    /// AES-128 in Galois/Counter Mode.
    A128Gcm,
    /// AES-256 in Galois/Counter Mode.
    #[default]
    A256Gcm,
}

impl Algorithm {
    /// Key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::A128Gcm => 16,
            Self::A256Gcm => 32,
        }
    }

    /// JOSE identifier, e.g. `"A256GCM"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A128Gcm => "A128GCM",
            Self::A256Gcm => "A256GCM",
        }
    }

    /// Returns the algorithm whose keys are `len` bytes long.
    fn for_key_len(len: usize) -> Option<Self> {
        [Self::A128Gcm, Self::A256Gcm]
            .into_iter()
            .find(|alg| alg.key_len() == len)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A128GCM" => Ok(Self::A128Gcm),
            "A256GCM" => Ok(Self::A256Gcm),
            other => Err(CoreError::unsupported_algorithm(other)),
        }
    }
}

/// Symmetric key material plus its algorithm.
///
/// Immutable once created. The bytes are zeroized on drop and never
/// printed; there is deliberately no `Serialize` impl.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    #[zeroize(skip)]
    algorithm: Algorithm,
    bytes: Vec<u8>,
}

impl SymmetricKey {
    /// Wraps existing key bytes.
    ///
    /// # Errors
    ///
    /// Returns `MalformedKey` if `bytes` is not the algorithm's key length.
    pub fn from_bytes(algorithm: Algorithm, bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != algorithm.key_len() {
            return Err(CoreError::malformed_key(format!(
                "{algorithm} requires a {}-byte key, got {}",
                algorithm.key_len(),
                bytes.len()
            )));
        }
        Ok(Self {
            algorithm,
            bytes: bytes.to_vec(),
        })
    }

    /// Returns the algorithm this key is for.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Raw key bytes, for the cipher only.
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("algorithm", &self.algorithm)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Portable, JWK-shaped description of a [`SymmetricKey`].
///
/// `alg` may be absent, as in descriptors produced by JOSE libraries from a
/// bare secret; the algorithm is then inferred from the key length.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyDescriptor {
    /// Key type; always `"oct"` for symmetric keys.
    #[zeroize(skip)]
    pub kty: String,
    /// Key bytes, base64url without padding.
    pub k: String,
    /// Algorithm identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[zeroize(skip)]
    pub alg: Option<String>,
    /// JWK "extractable" flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[zeroize(skip)]
    pub ext: Option<bool>,
}

impl KeyDescriptor {
    /// Serializes the descriptor as JSON text.
    ///
    /// # Errors
    ///
    /// Returns `MalformedKey` if serialization fails.
    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string(self).map_err(|e| CoreError::malformed_key(e.to_string()))
    }

    /// Parses a descriptor from JSON text.
    ///
    /// Only the structure is checked here; [`KeyManager::import`] validates
    /// the contents.
    ///
    /// # Errors
    ///
    /// Returns `MalformedKey` if the text is not a descriptor.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::malformed_key(e.to_string()))
    }
}

impl fmt::Debug for KeyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDescriptor")
            .field("kty", &self.kty)
            .field("k", &"[REDACTED]")
            .field("alg", &self.alg)
            .field("ext", &self.ext)
            .finish()
    }
}

/// Generates, exports, imports, and derives [`SymmetricKey`]s.
///
/// An explicit value rather than process-wide state; pass it (or the keys
/// it makes) to whatever opens a store.
///
/// # Example
///
/// ```rust
/// use crackup_core::{Algorithm, KeyManager};
///
/// let manager = KeyManager::new();
/// let key = manager.generate(Algorithm::A256Gcm);
///
/// let json = manager.export(&key).to_json().unwrap();
/// let restored = manager
///     .import(&crackup_core::KeyDescriptor::from_json(&json).unwrap())
///     .unwrap();
/// assert_eq!(restored.algorithm(), Algorithm::A256Gcm);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyManager {
    default_algorithm: Algorithm,
}

impl KeyManager {
    /// Creates a manager defaulting to A256GCM.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager with a different default algorithm.
    #[must_use]
    pub const fn with_default_algorithm(algorithm: Algorithm) -> Self {
        Self {
            default_algorithm: algorithm,
        }
    }

    /// Returns the algorithm used by [`generate_default`](Self::generate_default).
    #[must_use]
    pub const fn default_algorithm(&self) -> Algorithm {
        self.default_algorithm
    }

    /// Generates fresh random key material for `algorithm`.
    #[must_use]
    pub fn generate(&self, algorithm: Algorithm) -> SymmetricKey {
        let mut bytes = vec![0u8; algorithm.key_len()];
        rand::thread_rng().fill_bytes(&mut bytes);
        SymmetricKey { algorithm, bytes }
    }

    /// Generates a key for the manager's default algorithm.
    #[must_use]
    pub fn generate_default(&self) -> SymmetricKey {
        self.generate(self.default_algorithm)
    }

    /// Generates a key for the algorithm named `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAlgorithm` for unknown identifiers.
    pub fn generate_named(&self, algorithm: &str) -> CoreResult<SymmetricKey> {
        Ok(self.generate(algorithm.parse()?))
    }

    /// Exports `key` as a descriptor.
    #[must_use]
    pub fn export(&self, key: &SymmetricKey) -> KeyDescriptor {
        KeyDescriptor {
            kty: KEY_TYPE_OCT.to_string(),
            k: URL_SAFE_NO_PAD.encode(key.as_bytes()),
            alg: Some(key.algorithm.as_str().to_string()),
            ext: Some(true),
        }
    }

    /// Rebuilds a key from a descriptor.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `MalformedKey` if `kty` is not `"oct"`, `k` is not base64url, or
    ///   the key length does not fit the algorithm
    /// - `UnsupportedAlgorithm` if `alg` is unknown
    pub fn import(&self, descriptor: &KeyDescriptor) -> CoreResult<SymmetricKey> {
        if descriptor.kty != KEY_TYPE_OCT {
            return Err(CoreError::malformed_key(format!(
                "expected key type \"{KEY_TYPE_OCT}\", got \"{}\"",
                descriptor.kty
            )));
        }

        let algorithm = descriptor
            .alg
            .as_deref()
            .map(Algorithm::from_str)
            .transpose()?;

        let bytes = Zeroizing::new(
            URL_SAFE_NO_PAD
                .decode(descriptor.k.trim_end_matches('='))
                .map_err(|e| CoreError::malformed_key(format!("invalid key encoding: {e}")))?,
        );

        let algorithm = match algorithm {
            Some(algorithm) => algorithm,
            None => Algorithm::for_key_len(bytes.len()).ok_or_else(|| {
                CoreError::malformed_key(format!("no algorithm uses {}-byte keys", bytes.len()))
            })?,
        };

        SymmetricKey::from_bytes(algorithm, &bytes)
    }

    /// Derives a key from a password using HKDF-SHA256.
    ///
    /// # Arguments
    ///
    /// * `password` - The password to derive from
    /// * `salt` - A unique salt for this store (should be random and stored)
    /// * `algorithm` - The algorithm the key is for
    ///
    /// # Security Note
    ///
    /// HKDF is a key derivation function, not a password hashing function.
    /// It is appropriate when the input already has high entropy, such as a
    /// randomly generated passphrase.
    ///
    /// # Errors
    ///
    /// Returns `MalformedKey` if the expansion fails.
    pub fn derive_from_password(
        &self,
        password: &[u8],
        salt: &[u8],
        algorithm: Algorithm,
    ) -> CoreResult<SymmetricKey> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), password);
        let mut bytes = vec![0u8; algorithm.key_len()];
        hk.expand(DERIVE_INFO, &mut bytes)
            .map_err(|_| CoreError::malformed_key("HKDF expand failed"))?;

        Ok(SymmetricKey { algorithm, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_sizes_key_for_algorithm() {
        let manager = KeyManager::new();
        assert_eq!(manager.generate(Algorithm::A256Gcm).as_bytes().len(), 32);
        assert_eq!(manager.generate(Algorithm::A128Gcm).as_bytes().len(), 16);
        assert_eq!(manager.generate_default().algorithm(), Algorithm::A256Gcm);
    }

    #[test]
    fn generate_produces_distinct_keys() {
        let manager = KeyManager::new();
        let key1 = manager.generate_default();
        let key2 = manager.generate_default();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn generate_named_rejects_unknown() {
        let manager = KeyManager::new();
        assert!(manager.generate_named("A128GCM").is_ok());
        assert!(matches!(
            manager.generate_named("A192GCM"),
            Err(CoreError::UnsupportedAlgorithm { .. })
        ));
        assert!(matches!(
            manager.generate_named("a256gcm"),
            Err(CoreError::UnsupportedAlgorithm { .. })
        ));
    }

    #[test]
    fn custom_default_algorithm() {
        assert_eq!(KeyManager::new().default_algorithm(), Algorithm::A256Gcm);

        let manager = KeyManager::with_default_algorithm(Algorithm::A128Gcm);
        assert_eq!(manager.default_algorithm(), Algorithm::A128Gcm);
        assert_eq!(manager.generate_default().algorithm(), Algorithm::A128Gcm);
    }

    #[test]
    fn export_import_roundtrip() {
        let manager = KeyManager::new();
        let key = manager.generate_default();

        let descriptor = manager.export(&key);
        assert_eq!(descriptor.kty, "oct");
        assert_eq!(descriptor.alg.as_deref(), Some("A256GCM"));
        assert!(!descriptor.k.contains('='));

        let json = descriptor.to_json().unwrap();
        let restored = manager.import(&KeyDescriptor::from_json(&json).unwrap()).unwrap();
        assert_eq!(restored.as_bytes(), key.as_bytes());
        assert_eq!(restored.algorithm(), key.algorithm());
    }

    #[test]
    fn import_infers_algorithm_from_length() {
        let manager = KeyManager::new();
        let json = format!(r#"{{"kty":"oct","k":"{}"}}"#, URL_SAFE_NO_PAD.encode([7u8; 16]));
        let key = manager.import(&KeyDescriptor::from_json(&json).unwrap()).unwrap();
        assert_eq!(key.algorithm(), Algorithm::A128Gcm);
    }

    #[test]
    fn import_rejects_wrong_key_type() {
        let manager = KeyManager::new();
        let mut descriptor = manager.export(&manager.generate_default());
        descriptor.kty = "RSA".to_string();
        assert!(matches!(
            manager.import(&descriptor),
            Err(CoreError::MalformedKey { .. })
        ));
    }

    #[test]
    fn import_rejects_bad_encoding() {
        let manager = KeyManager::new();
        let mut descriptor = manager.export(&manager.generate_default());
        descriptor.k = "not base64url!".to_string();
        assert!(matches!(
            manager.import(&descriptor),
            Err(CoreError::MalformedKey { .. })
        ));
    }

    #[test]
    fn import_rejects_length_mismatch() {
        let manager = KeyManager::new();
        let mut descriptor = manager.export(&manager.generate(Algorithm::A128Gcm));
        descriptor.alg = Some("A256GCM".to_string());
        assert!(matches!(
            manager.import(&descriptor),
            Err(CoreError::MalformedKey { .. })
        ));
    }

    #[test]
    fn import_rejects_unknown_algorithm() {
        let manager = KeyManager::new();
        let mut descriptor = manager.export(&manager.generate_default());
        descriptor.alg = Some("A256CBC-HS512".to_string());
        assert!(matches!(
            manager.import(&descriptor),
            Err(CoreError::UnsupportedAlgorithm { .. })
        ));
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(matches!(
            KeyDescriptor::from_json("{\"kty\": 5}"),
            Err(CoreError::MalformedKey { .. })
        ));
        assert!(matches!(
            KeyDescriptor::from_json("not json"),
            Err(CoreError::MalformedKey { .. })
        ));
    }

    #[test]
    fn debug_output_is_redacted() {
        let manager = KeyManager::new();
        let key = manager.generate_default();
        let descriptor = manager.export(&key);

        assert!(format!("{key:?}").contains("[REDACTED]"));
        let printed = format!("{descriptor:?}");
        assert!(printed.contains("[REDACTED]"));
        assert!(!printed.contains(&descriptor.k));
    }

    #[test]
    fn derive_key_from_password() {
        let manager = KeyManager::new();
        let password = b"correct horse battery staple";

        let key1 = manager.derive_from_password(password, b"salt", Algorithm::A256Gcm).unwrap();
        let key2 = manager.derive_from_password(password, b"salt", Algorithm::A256Gcm).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());

        let key3 = manager.derive_from_password(password, b"other", Algorithm::A256Gcm).unwrap();
        assert_ne!(key1.as_bytes(), key3.as_bytes());

        let short = manager.derive_from_password(password, b"salt", Algorithm::A128Gcm).unwrap();
        assert_eq!(short.as_bytes().len(), 16);
    }
}
