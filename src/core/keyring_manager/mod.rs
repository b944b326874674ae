//! Keyring Manager Core Module
//!
//! Owns the unlock session and routes every signing operation to the right backend for the
//! active account.
//!
//! ## Module Structure
//! - `session` - Session lifecycle (initialize, unlock, lock, transfer)
//! - `signer_factory` - Per-call HD signer derivation from the session secret
//! - `accounts` - Account creation, import, switching and network switching
//! - `export` - Password-gated seed/key export and wallet reset
//! - `signing` - EVM signing router
//! - `utxo_signing` - UTXO (PSBT) signing router
//!
//! ## State
//! The manager holds only the session buffers, hardware attachments and the SLIP-44 binding.
//! Accounts and networks are read from the injected [`VaultAccessor`] on every call.

pub mod accounts;
pub mod export;
pub mod session;
pub mod signer_factory;
pub mod signing;
pub mod utxo_signing;

pub use session::{Session, UnlockOutcome};
pub use signer_factory::AccountSigner;
pub use utxo_signing::{InputDerivation, UtxoSignRequest};

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::blockchain::TransactionBroadcaster;
use crate::core::config::KeyringConfig;
use crate::core::domain::{ChainKind, Network};
use crate::core::errors::{KeyringError, Result};
use crate::core::registry::{BuiltinRegistry, CoinParams, CoinRegistry};
use crate::core::validation::ensure_network_compatible;
use crate::core::vault::VaultAccessor;
use crate::hardware::{HardwareDevice, HardwareWallet};
use crate::security::encryption::{self, AesGcmCipher, SymmetricCipher};
use crate::storage::KeyValueStore;

/// Keyring manager
///
/// One instance serves one host wallet. It is bound to at most one UTXO SLIP-44 coin for its
/// whole life; moving to another UTXO coin means a new instance and
/// [`transfer_session_to`](KeyringManager::transfer_session_to).
pub struct KeyringManager {
    pub config: KeyringConfig,
    vault: Arc<dyn VaultAccessor>,
    storage: Arc<dyn KeyValueStore>,
    registry: Arc<dyn CoinRegistry>,
    cipher: Arc<dyn SymmetricCipher>,
    broadcaster: Option<Arc<dyn TransactionBroadcaster>>,
    session: RwLock<Option<Session>>,
    hardware: RwLock<HashMap<HardwareDevice, Arc<dyn HardwareWallet>>>,
    bound_utxo_slip44: RwLock<Option<u32>>,
}

impl KeyringManager {
    /// Create a manager with the built-in coin registry and AES-GCM cipher.
    ///
    /// # Arguments
    /// * `config` - keyring configuration
    /// * `vault` - host state accessor
    /// * `storage` - persisted key-value storage
    pub fn new(config: KeyringConfig, vault: Arc<dyn VaultAccessor>, storage: Arc<dyn KeyValueStore>) -> Self {
        let cipher = AesGcmCipher::new(config.security.pbkdf2_iterations);
        Self {
            config,
            vault,
            storage,
            registry: Arc::new(BuiltinRegistry),
            cipher: Arc::new(cipher),
            broadcaster: None,
            session: RwLock::new(None),
            hardware: RwLock::new(HashMap::new()),
            bound_utxo_slip44: RwLock::new(None),
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn CoinRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn SymmetricCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn TransactionBroadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn registry(&self) -> &dyn CoinRegistry {
        self.registry.as_ref()
    }

    /// UTXO SLIP-44 coin this instance is bound to, if any.
    pub fn bound_slip44(&self) -> Option<u32> {
        *self.bound_utxo_slip44.read()
    }

    /// Register a hardware capability object, replacing any previous one of the same family.
    pub fn attach_hardware(&self, wallet: Arc<dyn HardwareWallet>) {
        let device = wallet.device();
        info!("Attaching hardware wallet: {}", device);
        self.hardware.write().insert(device, wallet);
    }

    pub fn detach_hardware(&self, device: HardwareDevice) {
        if self.hardware.write().remove(&device).is_some() {
            info!("Detached hardware wallet: {}", device);
        }
    }

    pub fn is_hardware_attached(&self, device: HardwareDevice) -> bool {
        self.hardware.read().contains_key(&device)
    }

    pub(crate) fn attached(&self, device: HardwareDevice) -> Result<Arc<dyn HardwareWallet>> {
        self.hardware
            .read()
            .get(&device)
            .cloned()
            .ok_or(KeyringError::HardwareNotConnected(device))
    }

    pub(crate) fn clear_hardware(&self) {
        self.hardware.write().clear();
    }

    /// Check the SLIP-44 binding for `network`, binding the instance on first UTXO use.
    pub(crate) fn bind_network(&self, network: &Network) -> Result<()> {
        let mut bound = self.bound_utxo_slip44.write();
        ensure_network_compatible(*bound, network)?;
        if network.kind == ChainKind::Utxo && bound.is_none() {
            debug!(slip44 = network.slip44, "binding manager to UTXO coin");
            *bound = Some(network.slip44);
        }
        Ok(())
    }

    pub(crate) fn reset_binding(&self) {
        *self.bound_utxo_slip44.write() = None;
    }

    /// Registry entry for `network`, after the binding check.
    pub(crate) fn coin_for(&self, network: &Network) -> Result<CoinParams> {
        self.bind_network(network)?;
        self.registry.for_network(network)
    }

    /// Decrypt text, setting the persisted and in-process UTF-8 diagnostics before re-raising.
    pub(crate) async fn decrypt_text(&self, ciphertext: &str, passphrase: &str) -> Result<Zeroizing<String>> {
        match encryption::decrypt_to_string(self.cipher.as_ref(), ciphertext, passphrase) {
            Err(KeyringError::MalformedEncoding(msg)) => {
                let key = &self.config.storage_keys.utf8_error;
                if let Err(e) = self.storage.set(key, Value::Bool(true)).await {
                    warn!("Failed to persist {} flag: {}", key, e);
                }
                Err(KeyringError::MalformedEncoding(msg))
            }
            other => other,
        }
    }

    pub(crate) fn encrypt_text(&self, plaintext: &str, passphrase: &str) -> Result<String> {
        self.cipher.encrypt(plaintext.as_bytes(), passphrase)
    }

    /// Whether a malformed-encoding decryption was ever recorded in storage.
    pub async fn utf8_error_flag(&self) -> Result<bool> {
        let value = self.storage.get(&self.config.storage_keys.utf8_error).await?;
        Ok(matches!(value, Some(Value::Bool(true))))
    }
}

#[cfg(test)]
pub(crate) mod testing;
