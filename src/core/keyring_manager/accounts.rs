//! Account creation, import, switching and network switching.
//!
//! Every operation works on a fresh vault snapshot and writes the whole snapshot back once all
//! checks have passed, so a failed call leaves the vault untouched.

use super::signer_factory::AccountSigner;
use super::KeyringManager;
use crate::core::bip44::{Bip32Path, DerivationPathResolver};
use crate::core::domain::{
    Account, AccountKind, AccountSummary, ActiveAccount, ChainKind, HardwareAccount, Network, SoftwareAccount,
};
use crate::core::errors::{KeyringError, Result};
use crate::core::registry::CoinParams;
use crate::core::validation::ensure_network_compatible;
use crate::core::vault::active_account;
use crate::hardware::{HardwareDevice, HardwareWallet};
use tracing::{debug, info, warn};

/// Path of the address a hardware account signs with.
///
/// EVM accounts are selected by address index below `m/44'/60'/0'/0`; UTXO accounts by the
/// hardened account level.
pub(crate) fn account_address_path(coin: &CoinParams, id: u32, change: bool, index: u32) -> String {
    match coin.kind {
        ChainKind::Evm => DerivationPathResolver::address_path(coin, 0, false, id),
        ChainKind::Utxo => DerivationPathResolver::address_path(coin, id, change, index),
    }
}

fn default_label(kind: AccountKind, id: u32) -> String {
    match kind {
        AccountKind::Hd => format!("Account {}", id + 1),
        AccountKind::Imported => format!("Imported {}", id + 1),
        AccountKind::Trezor => format!("Trezor {}", id + 1),
        AccountKind::Ledger => format!("Ledger {}", id + 1),
    }
}

impl KeyringManager {
    fn software_record(&self, signer: &AccountSigner, label: String, hash: &str) -> Result<SoftwareAccount> {
        let private_key = signer.export_private_key()?;
        Ok(SoftwareAccount {
            id: signer.account_id,
            label,
            address: signer.address()?,
            xpub: signer.xpub()?,
            encrypted_xprv: self.encrypt_text(&private_key, hash)?,
        })
    }

    /// Derive the next HD account (smallest free id) and make it active.
    pub async fn add_new_account(&self, label: Option<&str>) -> Result<AccountSummary> {
        let mut vault = self.vault.get_vault().await?;
        let coin = self.coin_for(&vault.active_network)?;
        let id = vault.next_account_id(AccountKind::Hd);
        let hash = self.session_password_hash()?;
        let phrase = self.decrypt_session_seed().await?;

        let signer = AccountSigner::from_phrase(&phrase, &vault.active_network, &coin, id)
            .map_err(|e| e.with_account(AccountKind::Hd, id))?;
        let label = label.map_or_else(|| default_label(AccountKind::Hd, id), str::to_string);
        let account = Account::Hd(self.software_record(&signer, label, &hash)?);
        let summary = account.summary();

        vault.insert_account(account);
        vault.active_account = ActiveAccount { id, kind: AccountKind::Hd };
        self.vault.set_vault(vault).await?;
        info!(account_id = id, coin = coin.symbol, "HD account created");
        Ok(summary)
    }

    /// Import a BIP84 account key (UTXO networks) or a raw hex private key (EVM networks).
    ///
    /// # Errors
    /// * validation errors from [`validate_zprv`](crate::core::validation::validate_zprv)
    /// * `AccountAlreadyExists` - an account already owns the derived address
    pub async fn import_account(&self, key: &str, label: Option<&str>) -> Result<AccountSummary> {
        let mut vault = self.vault.get_vault().await?;
        let coin = self.coin_for(&vault.active_network)?;
        let hash = self.session_password_hash()?;
        let id = vault.next_account_id(AccountKind::Imported);

        let signer = AccountSigner::from_imported_key(key, &vault.active_network, &coin, self.registry(), id)?;
        let address = signer.address()?;
        if vault.has_address(&address) {
            return Err(KeyringError::AccountAlreadyExists(address));
        }
        let label = label.map_or_else(|| default_label(AccountKind::Imported, id), str::to_string);
        let account = Account::Imported(self.software_record(&signer, label, &hash)?);
        let summary = account.summary();

        vault.insert_account(account);
        vault.active_account = ActiveAccount { id, kind: AccountKind::Imported };
        self.vault.set_vault(vault).await?;
        info!(account_id = id, coin = coin.symbol, "account imported");
        Ok(summary)
    }

    /// Register account `account_index` of an attached device. The account id is the index.
    pub async fn add_hardware_account(
        &self,
        device: HardwareDevice,
        account_index: u32,
        label: Option<&str>,
    ) -> Result<AccountSummary> {
        let wallet = self.attached(device)?;
        let mut vault = self.vault.get_vault().await?;
        let coin = self.coin_for(&vault.active_network)?;
        let kind = device.account_kind();
        if vault.account(kind, account_index).is_some() {
            return Err(KeyringError::AccountAlreadyExists(format!("{} account {}", device, account_index)));
        }

        let origin_path = DerivationPathResolver::account_path(&coin, account_index);
        let (address, xpub) = hardware_view(wallet.as_ref(), &coin, account_index, &origin_path).await?;
        if vault.has_address(&address) {
            return Err(KeyringError::AccountAlreadyExists(address));
        }
        let fingerprint = wallet.master_fingerprint().await?;

        let record = HardwareAccount {
            id: account_index,
            label: label.map_or_else(|| default_label(kind, account_index), str::to_string),
            address,
            xpub,
            master_fingerprint: hex::encode(fingerprint),
            origin_path,
        };
        let account = match device {
            HardwareDevice::Trezor => Account::Trezor(record),
            HardwareDevice::Ledger => Account::Ledger(record),
        };
        let summary = account.summary();

        vault.insert_account(account);
        vault.active_account = ActiveAccount { id: account_index, kind };
        self.vault.set_vault(vault).await?;
        info!(device = %device, account_id = account_index, "hardware account registered");
        Ok(summary)
    }

    pub async fn set_active_account(&self, kind: AccountKind, id: u32) -> Result<AccountSummary> {
        let mut vault = self.vault.get_vault().await?;
        let summary = vault
            .account(kind, id)
            .map(Account::summary)
            .ok_or(KeyringError::AccountNotFound { kind, id })?;
        let active = ActiveAccount { id, kind };
        vault.active_account = active;
        self.vault.set_vault(vault).await?;
        info!(account = %active, "active account switched");
        Ok(summary)
    }

    /// Point the wallet at `network` and recompute derived account fields for it.
    ///
    /// UTXO networks must share this instance's SLIP-44 coin. HD accounts need an unlocked
    /// session; hardware accounts are refreshed only when their device is attached.
    pub async fn set_active_network(&self, network: Network) -> Result<()> {
        ensure_network_compatible(self.bound_slip44(), &network)?;
        let coin = self.registry.for_network(&network)?;
        let mut vault = self.vault.get_vault().await?;

        let hd_ids: Vec<u32> = vault.accounts_of(AccountKind::Hd).map(Account::id).collect();
        if !hd_ids.is_empty() {
            let hash = self.session_password_hash()?;
            let phrase = self.decrypt_session_seed().await?;
            for id in hd_ids {
                let signer = AccountSigner::from_phrase(&phrase, &network, &coin, id)
                    .map_err(|e| e.with_account(AccountKind::Hd, id))?;
                if let Some(Account::Hd(record)) = vault.accounts.get_mut(&AccountKind::Hd).and_then(|m| m.get_mut(&id)) {
                    let label = std::mem::take(&mut record.label);
                    *record = self.software_record(&signer, label, &hash)?;
                }
            }
        }

        for device in [HardwareDevice::Trezor, HardwareDevice::Ledger] {
            let kind = device.account_kind();
            let ids: Vec<u32> = vault.accounts_of(kind).map(Account::id).collect();
            if ids.is_empty() {
                continue;
            }
            let wallet = match self.attached(device) {
                Ok(wallet) => wallet,
                Err(_) => {
                    warn!(device = %device, "device not attached, keeping stale hardware account fields");
                    continue;
                }
            };
            for id in ids {
                let origin_path = DerivationPathResolver::account_path(&coin, id);
                let (address, xpub) = hardware_view(wallet.as_ref(), &coin, id, &origin_path).await?;
                if let Some(Account::Trezor(record) | Account::Ledger(record)) =
                    vault.accounts.get_mut(&kind).and_then(|m| m.get_mut(&id))
                {
                    record.address = address;
                    record.xpub = xpub;
                    record.origin_path = origin_path;
                }
            }
        }

        vault.networks.entry(network.kind).or_default().insert(network.chain_id, network.clone());
        let chain_id = network.chain_id;
        vault.active_network = network.clone();
        self.vault.set_vault(vault).await?;
        self.bind_network(&network)?;
        info!(chain_id, coin = coin.symbol, "active network switched");
        Ok(())
    }

    /// Address of the active account at `change/index`.
    pub async fn get_address(&self, change: bool, index: u32) -> Result<String> {
        let vault = self.vault.get_vault().await?;
        let account = active_account(&vault)?;
        let (kind, id) = (account.kind(), account.id());

        match HardwareDevice::from_account_kind(kind) {
            Some(device) => {
                let wallet = self.attached(device)?;
                let coin = self.coin_for(&vault.active_network)?;
                let path: Bip32Path = account_address_path(&coin, id, change, index).parse()?;
                debug!(device = %device, account_id = id, "address query delegated to device");
                Ok(wallet.derive_address(&path, &coin).await?)
            }
            None => {
                let signer = self.signer_for(&vault, kind, id).await?;
                signer.receive_address(change, index).map_err(|e| e.with_account(kind, id))
            }
        }
    }

    /// Recorded extended public key of the active account.
    pub async fn get_account_xpub(&self) -> Result<String> {
        let vault = self.vault.get_vault().await?;
        Ok(active_account(&vault)?.xpub().to_string())
    }
}

/// `(first receive address, account xpub)` as reported by a device.
async fn hardware_view(
    wallet: &dyn HardwareWallet,
    coin: &CoinParams,
    id: u32,
    origin_path: &str,
) -> Result<(String, String)> {
    let account_path: Bip32Path = origin_path.parse()?;
    let address_path: Bip32Path = account_address_path(coin, id, false, 0).parse()?;
    let xpub = wallet.get_extended_public_key(&account_path, coin).await?;
    let address = wallet.derive_address(&address_path, coin).await?;
    Ok((address, xpub))
}
