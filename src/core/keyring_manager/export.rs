//! Password-gated export and wallet reset.

use super::KeyringManager;
use crate::core::domain::{Account, AccountKind, VaultState};
use crate::core::errors::{KeyringError, Result};
use crate::security::encryption::password_hash;
use crate::storage::load_vault_keys;
use tracing::{info, warn};
use zeroize::Zeroizing;

impl KeyringManager {
    /// Fails `InvalidPassword` unless `password` hashes to the stored value.
    pub async fn verify_password(&self, password: &str) -> Result<()> {
        let keys = load_vault_keys(self.storage.as_ref(), &self.config.storage_keys.vault_keys)
            .await?
            .ok_or(KeyringError::InvalidPassword)?;
        let hash = Zeroizing::new(password_hash(password, &keys.salt)?);
        if *hash != keys.hash {
            warn!("password re-verification failed");
            return Err(KeyringError::InvalidPassword);
        }
        Ok(())
    }

    /// Seed phrase, after re-checking the password.
    pub async fn export_seed(&self, password: &str) -> Result<Zeroizing<String>> {
        self.verify_password(password).await?;
        let phrase = self.decrypt_session_seed().await?;
        info!("seed phrase exported");
        Ok(phrase)
    }

    /// Private key of a software account in its persisted form (zprv or `0x` hex).
    pub async fn export_account_private_key(&self, kind: AccountKind, id: u32, password: &str) -> Result<Zeroizing<String>> {
        self.verify_password(password).await?;
        let vault = self.vault.get_vault().await?;
        let record = match vault.account(kind, id) {
            Some(Account::Hd(record) | Account::Imported(record)) => record,
            Some(_) => return Err(KeyringError::UnsupportedAccountType { kind, operation: "private key export" }),
            None => return Err(KeyringError::AccountNotFound { kind, id }),
        };
        let hash = self.session_password_hash()?;
        let key = self
            .decrypt_text(&record.encrypted_xprv, &hash)
            .await
            .map_err(|e| e.with_account(kind, id))?;
        info!(account = %kind, account_id = id, "account private key exported");
        Ok(key)
    }

    /// Drop every trace of the wallet: session, hardware attachments, stored hash and salt,
    /// diagnostics, and all accounts in the vault.
    pub async fn forget_wallet(&self, password: &str) -> Result<()> {
        self.verify_password(password).await?;
        self.lock_wallet();

        self.storage.delete(&self.config.storage_keys.vault_keys).await?;
        self.storage.delete(&self.config.storage_keys.utf8_error).await?;

        let vault = self.vault.get_vault().await?;
        self.vault.set_vault(VaultState::new(vault.active_network)).await?;
        self.reset_binding();
        info!("wallet forgotten");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{unlocked_manager, MockDevice, PASSWORD, SEED};
    use super::*;
    use crate::core::domain::Network;
    use crate::core::vault::VaultAccessor;
    use crate::hardware::HardwareDevice;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_export_seed_checks_password() {
        let (manager, _) = unlocked_manager(Network::syscoin_mainnet()).await;
        assert!(matches!(manager.export_seed("wrong").await, Err(KeyringError::InvalidPassword)));
        assert_eq!(manager.export_seed(PASSWORD).await.unwrap().as_str(), SEED);
    }

    #[tokio::test]
    async fn test_export_account_key() {
        let (manager, _) = unlocked_manager(Network::ethereum_mainnet()).await;
        let key = manager.export_account_private_key(AccountKind::Hd, 0, PASSWORD).await.unwrap();
        assert!(key.starts_with("0x"));
        assert_eq!(key.len(), 66);

        let missing = manager.export_account_private_key(AccountKind::Hd, 7, PASSWORD).await.unwrap_err();
        assert!(matches!(missing, KeyringError::AccountNotFound { .. }));
    }

    #[tokio::test]
    async fn test_hardware_key_export_unsupported() {
        let (manager, _) = unlocked_manager(Network::ethereum_mainnet()).await;
        let other = "legal winner thank year wave sausage worth useful legal winner thank yellow";
        manager.attach_hardware(Arc::new(MockDevice::new(HardwareDevice::Ledger, other)));
        manager.add_hardware_account(HardwareDevice::Ledger, 0, None).await.unwrap();
        let err = manager.export_account_private_key(AccountKind::Ledger, 0, PASSWORD).await.unwrap_err();
        assert!(matches!(err, KeyringError::UnsupportedAccountType { kind: AccountKind::Ledger, .. }));
    }

    #[tokio::test]
    async fn test_forget_wallet() {
        let (manager, vault) = unlocked_manager(Network::syscoin_mainnet()).await;
        assert!(matches!(manager.forget_wallet("wrong").await, Err(KeyringError::InvalidPassword)));
        assert!(manager.is_unlocked());

        manager.forget_wallet(PASSWORD).await.unwrap();
        assert!(!manager.is_unlocked());
        assert_eq!(manager.bound_slip44(), None);
        let state = vault.get_vault().await.unwrap();
        assert!(state.accounts.values().all(|m| m.is_empty()));
        assert!(state.encrypted_mnemonic.is_none());
        assert!(!manager.unlock(PASSWORD).await.unwrap().can_login);

        // a fresh wallet can be created afterwards
        let other = "legal winner thank year wave sausage worth useful legal winner thank yellow";
        manager.initialize_session(other, "pw2").await.unwrap();
    }
}
