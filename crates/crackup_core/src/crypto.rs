//! Authenticated encryption of stored values.
//!
//! ## Security Model
//!
//! - AES-GCM (128 or 256 bit, per the key's algorithm)
//! - A fresh random 96-bit nonce per encryption, so equal plaintexts give
//!   different payloads
//! - Authentication is checked before any plaintext is released; wrong key,
//!   truncation, and bit flips all fail closed
//!
//! ## Payload Format
//!
//! ```text
//! | version (1) | nonce (12) | ciphertext | tag (16) |
//! ```
//!
//! The version byte is also bound in as associated data. A payload is
//! self-contained: only the key is needed to open it.

use crate::error::{CoreError, CoreResult};
use crate::key::{Algorithm, SymmetricKey};
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes128Gcm, Aes256Gcm, Nonce,
};
use rand::RngCore;

/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// Current payload format version.
pub const PAYLOAD_VERSION: u8 = 1;
/// Bytes a payload adds on top of its plaintext.
pub const PAYLOAD_OVERHEAD: usize = 1 + NONCE_SIZE + TAG_SIZE;

/// Ciphertext plus everything needed to authenticate and decrypt it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    nonce: [u8; NONCE_SIZE],
    /// Ciphertext with the tag appended.
    sealed: Vec<u8>,
}

impl EncryptedPayload {
    /// Returns the nonce.
    #[must_use]
    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    /// Returns the ciphertext followed by the authentication tag.
    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.sealed
    }

    /// Encodes the payload as stored value bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + NONCE_SIZE + self.sealed.len());
        bytes.push(PAYLOAD_VERSION);
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.sealed);
        bytes
    }

    /// Decodes stored value bytes.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailure` if the bytes are too short or carry an
    /// unknown version; a damaged frame is indistinguishable from tampering.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < PAYLOAD_OVERHEAD || bytes[0] != PAYLOAD_VERSION {
            return Err(CoreError::authentication_failure());
        }
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[1..=NONCE_SIZE]);
        Ok(Self {
            nonce,
            sealed: bytes[1 + NONCE_SIZE..].to_vec(),
        })
    }
}

enum Cipher {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

/// Encrypts and decrypts values under one [`SymmetricKey`].
///
/// The engine holds expanded cipher state, not the key itself, and is
/// shared read-only by every store opened with that key.
pub struct CryptoEngine {
    algorithm: Algorithm,
    cipher: Cipher,
}

impl CryptoEngine {
    /// Creates an engine for `key`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedKey` if the key length does not suit its algorithm.
    pub fn new(key: &SymmetricKey) -> CoreResult<Self> {
        let invalid = |_| CoreError::malformed_key("key length does not match algorithm");
        let cipher = match key.algorithm() {
            Algorithm::A128Gcm => {
                Cipher::Aes128(Box::new(Aes128Gcm::new_from_slice(key.as_bytes()).map_err(invalid)?))
            }
            Algorithm::A256Gcm => {
                Cipher::Aes256(Box::new(Aes256Gcm::new_from_slice(key.as_bytes()).map_err(invalid)?))
            }
        };
        Ok(Self {
            algorithm: key.algorithm(),
            cipher,
        })
    }

    /// Returns the algorithm in use.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns `EncryptionFailed` if the cipher rejects the input (only
    /// possible for plaintexts beyond GCM's length limit).
    pub fn encrypt(&self, plaintext: &[u8]) -> CoreResult<EncryptedPayload> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let payload = Payload {
            msg: plaintext,
            aad: &[PAYLOAD_VERSION],
        };
        let sealed = match &self.cipher {
            Cipher::Aes128(cipher) => cipher.encrypt(nonce, payload),
            Cipher::Aes256(cipher) => cipher.encrypt(nonce, payload),
        }
        .map_err(|_| CoreError::encryption_failed("plaintext rejected by cipher"))?;

        Ok(EncryptedPayload {
            nonce: nonce_bytes,
            sealed,
        })
    }

    /// Verifies and decrypts `payload`.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailure` on a wrong key or any modification.
    pub fn decrypt(&self, payload: &EncryptedPayload) -> CoreResult<Vec<u8>> {
        let nonce = Nonce::from_slice(&payload.nonce);
        let sealed = Payload {
            msg: payload.sealed.as_slice(),
            aad: &[PAYLOAD_VERSION],
        };
        let opened = match &self.cipher {
            Cipher::Aes128(cipher) => cipher.decrypt(nonce, sealed),
            Cipher::Aes256(cipher) => cipher.decrypt(nonce, sealed),
        };
        opened.map_err(|_| CoreError::authentication_failure())
    }

    /// Encrypts `plaintext` straight to stored value bytes.
    ///
    /// # Errors
    ///
    /// See [`encrypt`](Self::encrypt).
    pub fn seal(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        Ok(self.encrypt(plaintext)?.to_bytes())
    }

    /// Decodes and decrypts stored value bytes.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailure` if the bytes do not authenticate.
    pub fn open(&self, bytes: &[u8]) -> CoreResult<Vec<u8>> {
        self.decrypt(&EncryptedPayload::from_bytes(bytes)?)
    }
}

impl std::fmt::Debug for CryptoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoEngine")
            .field("algorithm", &self.algorithm)
            .field("cipher", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyManager;

    fn engine(algorithm: Algorithm) -> CryptoEngine {
        CryptoEngine::new(&KeyManager::new().generate(algorithm)).unwrap()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        for algorithm in [Algorithm::A128Gcm, Algorithm::A256Gcm] {
            let engine = engine(algorithm);
            let plaintext = b"Hello, Crackup!";
            let payload = engine.encrypt(plaintext).unwrap();

            assert_ne!(payload.ciphertext(), plaintext);
            assert_eq!(payload.ciphertext().len(), plaintext.len() + TAG_SIZE);
            assert_eq!(engine.decrypt(&payload).unwrap(), plaintext);
        }
    }

    #[test]
    fn encrypt_produces_different_payloads() {
        let engine = engine(Algorithm::A256Gcm);
        let p1 = engine.encrypt(b"same data").unwrap();
        let p2 = engine.encrypt(b"same data").unwrap();
        assert_ne!(p1.nonce(), p2.nonce());
        assert_ne!(p1.to_bytes(), p2.to_bytes());
    }

    #[test]
    fn payload_bytes_are_lossless() {
        let engine = engine(Algorithm::A256Gcm);
        let payload = engine.encrypt(b"framing").unwrap();
        let bytes = payload.to_bytes();
        assert_eq!(bytes.len(), b"framing".len() + PAYLOAD_OVERHEAD);
        assert_eq!(EncryptedPayload::from_bytes(&bytes).unwrap(), payload);
    }

    #[test]
    fn decrypt_wrong_key_fails() {
        let sealed = engine(Algorithm::A256Gcm).seal(b"secret").unwrap();
        let result = engine(Algorithm::A256Gcm).open(&sealed);
        assert!(result.unwrap_err().is_authentication_failure());
    }

    #[test]
    fn decrypt_wrong_algorithm_fails() {
        let sealed = engine(Algorithm::A256Gcm).seal(b"secret").unwrap();
        let result = engine(Algorithm::A128Gcm).open(&sealed);
        assert!(result.unwrap_err().is_authentication_failure());
    }

    #[test]
    fn every_flipped_byte_is_detected() {
        let engine = engine(Algorithm::A256Gcm);
        let sealed = engine.seal(b"tamper evident").unwrap();
        for i in 0..sealed.len() {
            let mut corrupted = sealed.clone();
            corrupted[i] ^= 0x01;
            assert!(
                engine.open(&corrupted).unwrap_err().is_authentication_failure(),
                "flip at byte {i} went unnoticed"
            );
        }
    }

    #[test]
    fn truncated_payload_fails() {
        let engine = engine(Algorithm::A256Gcm);
        let sealed = engine.seal(b"data").unwrap();
        for len in [0, 1, PAYLOAD_OVERHEAD - 1, sealed.len() - 1] {
            assert!(engine.open(&sealed[..len]).unwrap_err().is_authentication_failure());
        }
    }

    #[test]
    fn empty_plaintext() {
        let engine = engine(Algorithm::A256Gcm);
        let sealed = engine.seal(b"").unwrap();
        assert_eq!(sealed.len(), PAYLOAD_OVERHEAD);
        assert!(engine.open(&sealed).unwrap().is_empty());
    }

    #[test]
    fn large_plaintext() {
        let engine = engine(Algorithm::A256Gcm);
        let plaintext = vec![0xAB; 1024 * 1024];
        let sealed = engine.seal(&plaintext).unwrap();
        assert_eq!(engine.open(&sealed).unwrap(), plaintext);
    }

    #[test]
    fn debug_is_redacted() {
        let printed = format!("{:?}", engine(Algorithm::A256Gcm));
        assert!(printed.contains("[REDACTED]"));
    }
}
