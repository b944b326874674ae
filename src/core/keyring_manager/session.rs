//! Session lifecycle
//!
//! A session is the password hash plus the seed phrase encrypted under that hash, each in its
//! own [`SecretBuffer`]. Both exist or neither does.

use super::KeyringManager;
use crate::core::errors::{KeyringError, Result};
use crate::security::encryption::{generate_salt, password_hash};
use crate::security::SecretBuffer;
use crate::storage::{load_vault_keys, save_vault_keys, VaultKeys};
use bip39::Mnemonic;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// In-memory unlock state.
#[derive(Debug)]
pub struct Session {
    password: SecretBuffer,
    seed: SecretBuffer,
}

impl Session {
    fn new(password_hash: &str, encrypted_seed: String) -> Self {
        Self {
            password: SecretBuffer::from_text(password_hash),
            seed: SecretBuffer::new(encrypted_seed.into_bytes()),
        }
    }

    pub(crate) fn password_hash(&self) -> Result<Zeroizing<String>> {
        self.password.read_string()
    }

    pub(crate) fn encrypted_seed(&self) -> Result<Zeroizing<String>> {
        self.seed.read_string()
    }

    fn clear(&mut self) {
        self.password.clear();
        self.seed.clear();
    }
}

/// Result of [`KeyringManager::unlock`]. A wrong password is `can_login == false`, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockOutcome {
    pub can_login: bool,
    /// The session was rebuilt from the vault's encrypted seed during this call.
    pub session_restored: bool,
}

impl KeyringManager {
    /// Create the session for `seed` and `password`.
    ///
    /// Persists `{hash, salt}` only if none exists. Calling again with the same seed and password
    /// is a no-op; any other combination fails `AlreadyInitializedWithDifferentParameters`.
    ///
    /// # Errors
    /// * `InvalidSeed` - the phrase fails BIP39 checksum validation
    /// * `AlreadyInitializedWithDifferentParameters` - bound to another seed/password
    pub async fn initialize_session(&self, seed: &str, password: &str) -> Result<()> {
        let mnemonic = Mnemonic::parse_normalized(seed).map_err(|e| KeyringError::InvalidSeed(e.to_string()))?;
        let phrase = Zeroizing::new(mnemonic.to_string());

        let keys_key = self.config.storage_keys.vault_keys.clone();
        let stored = load_vault_keys(self.storage.as_ref(), &keys_key).await?;
        let salt = match &stored {
            Some(keys) => keys.salt.clone(),
            None => generate_salt(self.config.security.salt_length),
        };
        let hash = Zeroizing::new(password_hash(password, &salt)?);

        if let Some(keys) = &stored {
            if keys.hash != *hash {
                return Err(KeyringError::AlreadyInitializedWithDifferentParameters);
            }
        }

        let held = {
            let guard = self.session.read();
            match guard.as_ref() {
                Some(session) => Some((session.password_hash()?, session.encrypted_seed()?)),
                None => None,
            }
        };
        if let Some((held_hash, held_seed)) = held {
            if *held_hash != *hash {
                return Err(KeyringError::AlreadyInitializedWithDifferentParameters);
            }
            let held_phrase = self.decrypt_text(&held_seed, &held_hash).await?;
            if *held_phrase != *phrase {
                return Err(KeyringError::AlreadyInitializedWithDifferentParameters);
            }
            debug!("Session already initialized with the same parameters");
            return Ok(());
        }

        let mut vault = self.vault.get_vault().await?;
        if let (Some(_), Some(existing)) = (&stored, &vault.encrypted_mnemonic) {
            let existing_phrase = self.decrypt_text(existing, password).await?;
            if *existing_phrase != *phrase {
                return Err(KeyringError::AlreadyInitializedWithDifferentParameters);
            }
        }
        self.bind_network(&vault.active_network)?;

        if stored.is_none() {
            save_vault_keys(
                self.storage.as_ref(),
                &keys_key,
                &VaultKeys { hash: hash.to_string(), salt },
            )
            .await?;
        }
        vault.encrypted_mnemonic = Some(self.encrypt_text(&phrase, password)?);
        self.vault.set_vault(vault).await?;

        let encrypted_seed = self.encrypt_text(&phrase, &hash)?;
        let previous = self.session.write().replace(Session::new(&hash, encrypted_seed));
        if let Some(mut previous) = previous {
            previous.clear();
        }
        info!("Keyring session initialized");
        Ok(())
    }

    /// Check `password` and restore the session from the vault if none is held.
    pub async fn unlock(&self, password: &str) -> Result<UnlockOutcome> {
        let keys = match load_vault_keys(self.storage.as_ref(), &self.config.storage_keys.vault_keys).await? {
            Some(keys) => keys,
            None => {
                debug!("Unlock attempted before initialization");
                return Ok(UnlockOutcome { can_login: false, session_restored: false });
            }
        };
        let hash = Zeroizing::new(password_hash(password, &keys.salt)?);
        if *hash != keys.hash {
            info!("Unlock rejected: wrong password");
            return Ok(UnlockOutcome { can_login: false, session_restored: false });
        }

        if self.is_unlocked() {
            return Ok(UnlockOutcome { can_login: true, session_restored: false });
        }

        let vault = self.vault.get_vault().await?;
        self.bind_network(&vault.active_network)?;
        let encrypted = vault.encrypted_mnemonic.as_deref().ok_or(KeyringError::SeedNotFound)?;
        let phrase = self.decrypt_text(encrypted, password).await?;
        if phrase.is_empty() {
            return Err(KeyringError::DecryptionFailed("stored seed is empty".to_string()));
        }
        let encrypted_seed = self.encrypt_text(&phrase, &hash)?;

        let mut guard = self.session.write();
        if guard.is_some() {
            // another unlock won the race
            return Ok(UnlockOutcome { can_login: true, session_restored: false });
        }
        *guard = Some(Session::new(&hash, encrypted_seed));
        info!("Keyring unlocked, session restored from vault");
        Ok(UnlockOutcome { can_login: true, session_restored: true })
    }

    /// Clear the session and forget attached hardware. Safe to call when already locked.
    pub fn lock_wallet(&self) {
        let taken = self.session.write().take();
        if let Some(mut session) = taken {
            session.clear();
            info!("Keyring locked");
        }
        self.clear_hardware();
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.read().is_some()
    }

    /// Move this instance's session into `target`. The source ends up locked.
    ///
    /// Any session `target` held is cleared and replaced.
    pub fn transfer_session_to(&self, target: &KeyringManager) -> Result<()> {
        if std::ptr::eq(self, target) {
            return if self.is_unlocked() { Ok(()) } else { Err(KeyringError::SessionUnavailable) };
        }
        let session = self.session.write().take().ok_or(KeyringError::SessionUnavailable)?;
        let replaced = target.session.write().replace(session);
        if let Some(mut old) = replaced {
            old.clear();
        }
        info!("Session transferred to another keyring instance");
        Ok(())
    }

    /// Password hash held by the session.
    pub(crate) fn session_password_hash(&self) -> Result<Zeroizing<String>> {
        let guard = self.session.read();
        let session = guard.as_ref().ok_or(KeyringError::SessionUnavailable)?;
        session.password_hash()
    }

    /// `(password hash, encrypted seed)` copies, so no lock is held while decrypting.
    pub(crate) fn session_material(&self) -> Result<(Zeroizing<String>, Zeroizing<String>)> {
        let guard = self.session.read();
        let session = guard.as_ref().ok_or(KeyringError::SessionUnavailable)?;
        Ok((session.password_hash()?, session.encrypted_seed()?))
    }
}
