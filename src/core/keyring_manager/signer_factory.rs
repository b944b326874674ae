//! Signer factory
//!
//! Builds a signing handle for one account from the session secret, scoped to the network the
//! vault reports *now*. Handles are returned by value and never stored on the manager; their key
//! material is erased on drop.
//!
//! ```text
//! session seed (encrypted under hash)          account.encrypted_xprv
//!        |  decrypt                                   |  decrypt
//!        v                                            v
//!   BIP39 seed -> master Xpriv -> account node    zprv / raw EVM key
//!        \__________________ AccountSigner __________/
//! ```

use super::KeyringManager;
use crate::blockchain::bitcoin::extended_key::{encode_xpriv, encode_xpub};
use crate::blockchain::bitcoin::UtxoAddress;
use crate::blockchain::ethereum::{self, decode_hex_secret};
use crate::core::bip44::{Bip32Path, DerivationPathResolver};
use crate::core::domain::{Account, AccountKind, ChainKind, Network, VaultState};
use crate::core::errors::{KeyringError, Result};
use crate::core::registry::{CoinParams, CoinRegistry};
use crate::core::validation::validate_zprv;
use crate::core::vault::active_account;
use bip39::Mnemonic;
use bitcoin::bip32::{ChildNumber, DerivationPath, Fingerprint, Xpriv, Xpub};
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::{All, PublicKey, Secp256k1};
use ethers::signers::LocalWallet;
use std::fmt;
use tracing::debug;
use zeroize::Zeroizing;

enum SignerMaterial {
    /// `root` is the node whose fingerprint PSBT key origins refer to: the master key for HD
    /// accounts, the account node itself for imported keys.
    Utxo { root: Xpriv, account: Xpriv, account_path: DerivationPath },
    Evm { secret: Zeroizing<Vec<u8>> },
}

/// Call-scoped signing handle for one account.
pub struct AccountSigner {
    pub kind: AccountKind,
    pub account_id: u32,
    pub coin: CoinParams,
    pub chain_id: u64,
    material: SignerMaterial,
    secp: Secp256k1<All>,
}

impl fmt::Debug for AccountSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSigner")
            .field("kind", &self.kind)
            .field("account_id", &self.account_id)
            .field("coin", &self.coin.symbol)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl Drop for AccountSigner {
    fn drop(&mut self) {
        if let SignerMaterial::Utxo { root, account, .. } = &mut self.material {
            root.private_key.non_secure_erase();
            account.private_key.non_secure_erase();
        }
    }
}

fn child_index(child: ChildNumber) -> u32 {
    match child {
        ChildNumber::Normal { index } | ChildNumber::Hardened { index } => index,
    }
}

fn parse_path(path: &str) -> Result<DerivationPath> {
    Ok(path.parse::<Bip32Path>()?.to_derivation_path())
}

impl AccountSigner {
    /// HD signer for account `id` of `coin`, derived from a BIP39 phrase.
    pub(crate) fn from_phrase(phrase: &str, network: &Network, coin: &CoinParams, id: u32) -> Result<Self> {
        let mnemonic = Mnemonic::parse_normalized(phrase).map_err(|e| KeyringError::InvalidSeed(e.to_string()))?;
        let seed = Zeroizing::new(mnemonic.to_seed(""));
        let secp = Secp256k1::new();
        let btc_network = if coin.is_testnet { bitcoin::Network::Testnet } else { bitcoin::Network::Bitcoin };
        let mut master = Xpriv::new_master(btc_network, &seed[..])?;

        let material = match coin.kind {
            ChainKind::Utxo => {
                let account_path = parse_path(&DerivationPathResolver::account_path(coin, id))?;
                let account = master.derive_priv(&secp, &account_path)?;
                match account.child_number {
                    ChildNumber::Hardened { index } if index == id => {}
                    other => {
                        master.private_key.non_secure_erase();
                        return Err(KeyringError::AccountIndexMismatch { requested: id, derived: child_index(other) });
                    }
                }
                SignerMaterial::Utxo { root: master, account, account_path }
            }
            ChainKind::Evm => {
                let path = parse_path(&DerivationPathResolver::address_path(coin, 0, false, id))?;
                let mut node = master.derive_priv(&secp, &path)?;
                master.private_key.non_secure_erase();
                let derived = node.child_number;
                let secret = Zeroizing::new(node.private_key.secret_bytes().to_vec());
                node.private_key.non_secure_erase();
                if derived != (ChildNumber::Normal { index: id }) {
                    return Err(KeyringError::AccountIndexMismatch { requested: id, derived: child_index(derived) });
                }
                SignerMaterial::Evm { secret }
            }
        };

        debug!(account_id = id, coin = coin.symbol, "derived HD signer");
        Ok(Self { kind: AccountKind::Hd, account_id: id, coin: coin.clone(), chain_id: network.chain_id, material, secp })
    }

    /// Signer for an imported key: a BIP84 account node on UTXO networks, a raw key on EVM.
    pub(crate) fn from_imported_key(
        key: &str,
        network: &Network,
        coin: &CoinParams,
        registry: &dyn CoinRegistry,
        id: u32,
    ) -> Result<Self> {
        let material = match coin.kind {
            ChainKind::Utxo => {
                let validated = validate_zprv(key, network, registry).into_result()?;
                // single-account by construction: the key is the account node
                let account = validated.xpriv;
                SignerMaterial::Utxo { root: account, account, account_path: DerivationPath::master() }
            }
            ChainKind::Evm => SignerMaterial::Evm { secret: decode_hex_secret(key)? },
        };
        Ok(Self {
            kind: AccountKind::Imported,
            account_id: id,
            coin: coin.clone(),
            chain_id: network.chain_id,
            material,
            secp: Secp256k1::new(),
        })
    }

    fn utxo(&self) -> Result<(&Xpriv, &Xpriv, &DerivationPath)> {
        match &self.material {
            SignerMaterial::Utxo { root, account, account_path } => Ok((root, account, account_path)),
            SignerMaterial::Evm { .. } => {
                Err(KeyringError::ChainKindMismatch { expected: ChainKind::Utxo, actual: ChainKind::Evm })
            }
        }
    }

    fn evm_secret(&self) -> Result<&[u8]> {
        match &self.material {
            SignerMaterial::Evm { secret } => Ok(secret.as_slice()),
            SignerMaterial::Utxo { .. } => {
                Err(KeyringError::ChainKindMismatch { expected: ChainKind::Evm, actual: ChainKind::Utxo })
            }
        }
    }

    /// Canonical address: receive index 0 on UTXO, the key's address on EVM.
    pub fn address(&self) -> Result<String> {
        match &self.material {
            SignerMaterial::Utxo { .. } => self.receive_address(false, 0),
            SignerMaterial::Evm { secret } => ethereum::address_of_secret(secret),
        }
    }

    /// Address at `change/index` below the account node. EVM accounts have a single address.
    pub fn receive_address(&self, change: bool, index: u32) -> Result<String> {
        match &self.material {
            SignerMaterial::Utxo { .. } => {
                let (public_key, _, _) = self.input_key(change, index)?;
                UtxoAddress::for_coin(&public_key, &self.coin)
            }
            SignerMaterial::Evm { secret } => ethereum::address_of_secret(secret),
        }
    }

    /// Account extended public key with the coin's versions; `0x` compressed public key on EVM.
    pub fn xpub(&self) -> Result<String> {
        match &self.material {
            SignerMaterial::Utxo { account, .. } => {
                let xpub = Xpub::from_priv(&self.secp, account);
                Ok(encode_xpub(&xpub, self.coin.account_versions().public))
            }
            SignerMaterial::Evm { secret } => {
                let sk = bitcoin::secp256k1::SecretKey::from_slice(secret)
                    .map_err(|e| KeyringError::InvalidKey(e.to_string()))?;
                let pk = PublicKey::from_secret_key(&self.secp, &sk);
                Ok(format!("0x{}", hex::encode(pk.serialize())))
            }
        }
    }

    /// Account private key in its persisted form.
    pub fn export_private_key(&self) -> Result<Zeroizing<String>> {
        match &self.material {
            SignerMaterial::Utxo { account, .. } => Ok(encode_xpriv(account, self.coin.account_versions().private)),
            SignerMaterial::Evm { secret } => Ok(Zeroizing::new(format!("0x{}", hex::encode(secret.as_slice())))),
        }
    }

    /// Public key, full origin path and origin fingerprint of the key at `change/index`.
    pub fn input_key(&self, change: bool, index: u32) -> Result<(PublicKey, DerivationPath, Fingerprint)> {
        let (root, account, account_path) = self.utxo()?;
        let tail = [ChildNumber::from_normal_idx(u32::from(change))?, ChildNumber::from_normal_idx(index)?];
        let mut child = account.derive_priv(&self.secp, &tail)?;
        let public_key = PublicKey::from_secret_key(&self.secp, &child.private_key);
        child.private_key.non_secure_erase();
        Ok((public_key, account_path.extend(tail), root.fingerprint(&self.secp)))
    }

    /// Sign every PSBT input whose BIP32 derivation points at this signer's root.
    ///
    /// Returns the indices of inputs that received a signature.
    pub fn sign_psbt(&self, psbt: &mut Psbt) -> Result<Vec<usize>> {
        let (root, _, _) = self.utxo()?;
        match psbt.sign(root, &self.secp) {
            Ok(used) => Ok(used.into_iter().filter(|(_, keys)| !keys.is_empty()).map(|(i, _)| i).collect()),
            Err((_, errors)) => {
                let detail: Vec<String> = errors.iter().map(|(i, e)| format!("input {}: {}", i, e)).collect();
                Err(KeyringError::SigningFailed(detail.join("; ")))
            }
        }
    }

    /// Local EVM signer bound to `chain_id`.
    pub fn evm_wallet(&self, chain_id: u64) -> Result<LocalWallet> {
        ethereum::local_wallet(self.evm_secret()?, chain_id)
    }
}

impl KeyringManager {
    /// Seed phrase of the current session.
    ///
    /// # Errors
    /// * `SessionUnavailable` - wallet is locked
    /// * `DecryptionFailed` - the seed buffer decrypts to nothing
    pub async fn decrypt_session_seed(&self) -> Result<Zeroizing<String>> {
        let (hash, encrypted_seed) = self.session_material()?;
        let phrase = self.decrypt_text(&encrypted_seed, &hash).await?;
        if phrase.is_empty() {
            return Err(KeyringError::DecryptionFailed("session seed is empty".to_string()));
        }
        Ok(phrase)
    }

    /// Signer for HD account `id` on the active network.
    pub async fn derive_for_main_account(&self, id: u32) -> Result<AccountSigner> {
        let vault = self.vault.get_vault().await?;
        self.signer_for(&vault, AccountKind::Hd, id).await
    }

    /// Signer for imported account `id` on the active network.
    pub async fn derive_for_imported_account(&self, id: u32) -> Result<AccountSigner> {
        let vault = self.vault.get_vault().await?;
        self.signer_for(&vault, AccountKind::Imported, id).await
    }

    /// Signer for whatever account the vault marks active.
    ///
    /// # Errors
    /// * `UnsupportedAccountType` - the active account is hardware backed
    pub async fn derive_for_active_account(&self) -> Result<AccountSigner> {
        let vault = self.vault.get_vault().await?;
        let account = active_account(&vault)?;
        self.signer_for(&vault, account.kind(), account.id()).await
    }

    /// Dispatch on account kind against one vault snapshot.
    pub(crate) async fn signer_for(&self, vault: &VaultState, kind: AccountKind, id: u32) -> Result<AccountSigner> {
        if kind.is_hardware() {
            return Err(KeyringError::UnsupportedAccountType { kind, operation: "software derivation" });
        }
        let network = &vault.active_network;
        let coin = self.coin_for(network)?;
        match kind {
            AccountKind::Hd => {
                let phrase = self.decrypt_session_seed().await?;
                AccountSigner::from_phrase(&phrase, network, &coin, id).map_err(|e| e.with_account(kind, id))
            }
            _ => {
                let record = match vault.account(kind, id) {
                    Some(Account::Imported(record)) => record,
                    _ => return Err(KeyringError::AccountNotFound { kind, id }),
                };
                let hash = self.session_password_hash()?;
                let key = self
                    .decrypt_text(&record.encrypted_xprv, &hash)
                    .await
                    .map_err(|e| e.with_account(kind, id))?;
                AccountSigner::from_imported_key(&key, network, &coin, self.registry(), id)
                    .map_err(|e| e.with_account(kind, id))
            }
        }
    }
}
