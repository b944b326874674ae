//! Passphrase encryption and password hashing.
//!
//! ## Ciphertext format
//!
//! `hex(salt(16) || nonce(12) || AES-256-GCM ciphertext)`. The AES key is derived from the
//! passphrase with PBKDF2-HMAC-SHA256 over the embedded salt.
//!
//! ## Password hash
//!
//! `hex(HMAC-SHA512(key = salt, msg = password))`. The hash never leaves the process; it is only
//! used as the passphrase protecting session secrets and account keys.

use crate::core::errors::{KeyringError, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Sha256, Sha512};
use std::sync::atomic::{AtomicBool, Ordering};
use zeroize::Zeroizing;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Set once any decryption in this process produced bytes that are not valid UTF-8.
static UTF8_ERROR_SEEN: AtomicBool = AtomicBool::new(false);

pub fn utf8_error_seen() -> bool {
    UTF8_ERROR_SEEN.load(Ordering::SeqCst)
}

pub(crate) fn mark_utf8_error() {
    UTF8_ERROR_SEEN.store(true, Ordering::SeqCst);
}

/// Passphrase-based symmetric encryption port.
pub trait SymmetricCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8], passphrase: &str) -> Result<String>;

    /// Fails with `DecryptionFailed` on a wrong passphrase or corrupted input.
    fn decrypt(&self, ciphertext: &str, passphrase: &str) -> Result<Zeroizing<Vec<u8>>>;
}

/// AES-256-GCM with a PBKDF2 derived key.
#[derive(Debug, Clone)]
pub struct AesGcmCipher {
    pbkdf2_iterations: u32,
}

impl AesGcmCipher {
    pub fn new(pbkdf2_iterations: u32) -> Self {
        Self { pbkdf2_iterations }
    }

    fn derive_key(&self, passphrase: &str, salt: &[u8]) -> Zeroizing<[u8; 32]> {
        let mut key = Zeroizing::new([0u8; 32]);
        pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, self.pbkdf2_iterations, &mut *key);
        key
    }
}

impl Default for AesGcmCipher {
    fn default() -> Self {
        Self::new(crate::core::config::DEFAULT_PBKDF2_ITERATIONS)
    }
}

impl SymmetricCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8], passphrase: &str) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce_bytes);

        let key = self.derive_key(passphrase, &salt);
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|_| KeyringError::EncryptionFailed("invalid key length".to_string()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| KeyringError::EncryptionFailed("aead seal failed".to_string()))?;

        let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(hex::encode(out))
    }

    fn decrypt(&self, ciphertext: &str, passphrase: &str) -> Result<Zeroizing<Vec<u8>>> {
        let data = hex::decode(ciphertext)
            .map_err(|e| KeyringError::DecryptionFailed(format!("ciphertext is not hex: {}", e)))?;
        if data.len() < SALT_LEN + NONCE_LEN {
            return Err(KeyringError::DecryptionFailed("data too short".to_string()));
        }

        let (salt, rest) = data.split_at(SALT_LEN);
        let (nonce_bytes, body) = rest.split_at(NONCE_LEN);
        let key = self.derive_key(passphrase, salt);
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|_| KeyringError::DecryptionFailed("invalid key length".to_string()))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), body)
            .map_err(|_| KeyringError::DecryptionFailed("authentication failed".to_string()))?;
        Ok(Zeroizing::new(plaintext))
    }
}

/// Decrypt and interpret the plaintext as UTF-8, recording the process-wide diagnostic on failure.
pub fn decrypt_to_string(
    cipher: &dyn SymmetricCipher,
    ciphertext: &str,
    passphrase: &str,
) -> Result<Zeroizing<String>> {
    let bytes = cipher.decrypt(ciphertext, passphrase)?;
    match std::str::from_utf8(&bytes) {
        Ok(text) => Ok(Zeroizing::new(text.to_string())),
        Err(e) => {
            mark_utf8_error();
            tracing::warn!("decrypted payload is not valid UTF-8");
            Err(KeyringError::MalformedEncoding(e.to_string()))
        }
    }
}

/// `hex(HMAC-SHA512(key = salt, msg = password))`
pub fn password_hash(password: &str, salt: &str) -> Result<String> {
    let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(salt.as_bytes())
        .map_err(|e| KeyringError::EncryptionFailed(e.to_string()))?;
    mac.update(password.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Random hex salt of `len` bytes.
pub fn generate_salt(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
