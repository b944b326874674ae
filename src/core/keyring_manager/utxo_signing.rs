//! UTXO (PSBT) signing router
//!
//! Callers hand in an unsigned PSBT plus, for every input the active account owns, the
//! `change/index` of the key that locks it. The router writes BIP32 key origins into those
//! inputs and then either signs locally or sends the enriched PSBT to the device.

use super::accounts::account_address_path;
use super::signer_factory::AccountSigner;
use super::signing::verify_signer;
use super::KeyringManager;
use crate::blockchain::bitcoin::extended_key::decode_xpub;
use crate::blockchain::bitcoin::psbt::{add_input_derivation, apply_signatures, unsigned_inputs};
use crate::core::bip44::{Bip32Path, DerivationPathResolver};
use crate::core::domain::{Account, ActiveAccount, ChainKind, HardwareAccount, VaultState};
use crate::core::errors::{KeyringError, Result};
use crate::core::registry::CoinParams;
use crate::core::validation::{ensure_chain_kind, ensure_same_address};
use crate::core::vault::active_account;
use crate::hardware::{HardwareDevice, HardwareWallet, SignatureComponents};
use bitcoin::bip32::{ChildNumber, Fingerprint};
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::Secp256k1;
use tracing::{debug, info};

/// Key that locks one PSBT input, relative to the account node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputDerivation {
    pub input_index: usize,
    pub change: bool,
    pub index: u32,
}

#[derive(Debug, Clone)]
pub struct UtxoSignRequest {
    /// Account address the caller built the transaction for.
    pub claimed_address: String,
    pub psbt: Psbt,
    pub inputs: Vec<InputDerivation>,
}

fn sign_with_signer(signer: &AccountSigner, psbt: &mut Psbt, inputs: &[InputDerivation]) -> Result<Vec<usize>> {
    for input in inputs {
        let (public_key, path, fingerprint) = signer.input_key(input.change, input.index)?;
        add_input_derivation(psbt, input.input_index, public_key, fingerprint, path)?;
    }
    signer.sign_psbt(psbt)
}

impl KeyringManager {
    /// Sign the owned inputs of a PSBT with the active account.
    ///
    /// Returns the PSBT with partial signatures attached; finalization is left to the caller.
    pub async fn sign_utxo_transaction(&self, request: UtxoSignRequest) -> Result<Psbt> {
        let vault = self.vault.get_vault().await?;
        self.sign_utxo_with(&vault, request).await
    }

    /// Sign, then broadcast the serialized PSBT. Returns the transaction id.
    pub async fn send_utxo_transaction(&self, request: UtxoSignRequest) -> Result<String> {
        let broadcaster = self
            .broadcaster
            .clone()
            .ok_or_else(|| KeyringError::Broadcast("no broadcaster configured".to_string()))?;
        let vault = self.vault.get_vault().await?;
        let psbt = self.sign_utxo_with(&vault, request).await?;
        let txid = broadcaster.broadcast(&vault.active_network, &psbt.serialize()).await?;
        info!(chain_id = vault.active_network.chain_id, "UTXO transaction broadcast");
        Ok(txid)
    }

    async fn sign_utxo_with(&self, vault: &VaultState, request: UtxoSignRequest) -> Result<Psbt> {
        ensure_chain_kind(&vault.active_network, ChainKind::Utxo)?;
        let account = active_account(vault)?;
        let (kind, id) = (account.kind(), account.id());
        ensure_same_address(&request.claimed_address, account.address(), vault.active_account)?;
        let coin = self.coin_for(&vault.active_network)?;
        if request.inputs.is_empty() {
            return Err(KeyringError::InvalidTransaction("no inputs to sign".to_string()));
        }

        let UtxoSignRequest { mut psbt, inputs, .. } = request;
        let expected: Vec<usize> = inputs.iter().map(|i| i.input_index).collect();

        match (HardwareDevice::from_account_kind(kind), account) {
            (Some(device), Account::Trezor(record) | Account::Ledger(record)) => {
                let wallet = self.attached(device)?;
                self.enrich_for_device(wallet.as_ref(), record, vault.active_account, &coin, &mut psbt, &inputs)
                    .await?;
                let account_path: Bip32Path = DerivationPathResolver::account_path(&coin, id).parse()?;

                info!(device = %device, account_id = id, inputs = inputs.len(), "delegating PSBT to device");
                match wallet.sign_transaction(&account_path, &psbt.serialize()).await? {
                    SignatureComponents::Inputs(signatures) => apply_signatures(&mut psbt, signatures)?,
                    SignatureComponents::Ecdsa { .. } => {
                        return Err(KeyringError::SigningFailed(format!(
                            "{} returned a bare ECDSA signature for a PSBT",
                            device
                        )))
                    }
                }
            }
            (Some(_), _) => return Err(KeyringError::UnsupportedAccountType { kind, operation: "PSBT signing" }),
            (None, _) => {
                debug!(account = %vault.active_account, "signing PSBT in software");
                let signer = self.signer_for(vault, kind, id).await?;
                verify_signer(&signer, account, vault.active_account)?;
                let signed = sign_with_signer(&signer, &mut psbt, &inputs).map_err(|e| e.with_account(kind, id))?;
                debug!(signed = signed.len(), "PSBT inputs signed locally");
            }
        }

        let missing = unsigned_inputs(&psbt, expected);
        if !missing.is_empty() {
            let err = KeyringError::SigningFailed(format!("inputs left unsigned: {:?}", missing));
            return Err(if kind.is_hardware() { err } else { err.with_account(kind, id) });
        }
        Ok(psbt)
    }

    /// Write key origins for a device account from its recorded xpub and fingerprint.
    async fn enrich_for_device(
        &self,
        wallet: &dyn HardwareWallet,
        record: &HardwareAccount,
        active: ActiveAccount,
        coin: &CoinParams,
        psbt: &mut Psbt,
        inputs: &[InputDerivation],
    ) -> Result<()> {
        let first: Bip32Path = account_address_path(coin, record.id, false, 0).parse()?;
        let device_address = wallet.derive_address(&first, coin).await?;
        ensure_same_address(&record.address, &device_address, active)?;

        let fingerprint: [u8; 4] = hex::decode(&record.master_fingerprint)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| KeyringError::InvalidKey("recorded master fingerprint is not 4 hex bytes".to_string()))?;
        let account_xpub = decode_xpub(&record.xpub, coin.account_versions().public, coin.is_testnet)?;
        let account_path = DerivationPathResolver::account_path(coin, record.id)
            .parse::<Bip32Path>()?
            .to_derivation_path();

        let secp = Secp256k1::verification_only();
        for input in inputs {
            let tail = [
                ChildNumber::from_normal_idx(u32::from(input.change))?,
                ChildNumber::from_normal_idx(input.index)?,
            ];
            let child = account_xpub.derive_pub(&secp, &tail)?;
            add_input_derivation(
                psbt,
                input.input_index,
                child.public_key,
                Fingerprint::from(fingerprint),
                account_path.extend(tail),
            )?;
        }
        Ok(())
    }
}
