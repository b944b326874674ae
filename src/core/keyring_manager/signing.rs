//! EVM signing router
//!
//! ## Dispatch
//! ```text
//! request.from == active account address ?      (AccountStateMismatch otherwise)
//!        |
//!        +-- Hd / Imported -> AccountSigner -> derived address/xpub == record ? -> sign locally
//!        +-- Trezor        -> device.derive_address == record ? -> device.sign_transaction
//!        +-- Ledger        -> same, through the Ledger capability
//! ```
//!
//! Device errors are returned untouched. Software failures carry the account identity.

use super::accounts::account_address_path;
use super::signer_factory::AccountSigner;
use super::KeyringManager;
use crate::blockchain::ethereum::{self, assemble_signed, sign_locally, EvmTransactionRequest};
use crate::core::bip44::Bip32Path;
use crate::core::domain::{Account, ActiveAccount, ChainKind, VaultState};
use crate::core::errors::{KeyringError, Result};
use crate::core::validation::{ensure_chain_id, ensure_chain_kind, ensure_same_address};
use crate::core::vault::active_account;
use crate::hardware::{HardwareDevice, HardwareWallet, SignatureComponents};
use ethers::types::Bytes;
use tracing::{debug, info};

/// The freshly derived signer must reproduce the recorded address and xpub.
pub(crate) fn verify_signer(signer: &AccountSigner, account: &Account, active: ActiveAccount) -> Result<()> {
    let derived = signer.address()?;
    ensure_same_address(account.address(), &derived, active)?;
    let xpub = signer.xpub()?;
    if xpub != account.xpub() {
        return Err(KeyringError::AccountStateMismatch {
            claimed: format!("xpub {}", account.xpub()),
            active: format!("{} (xpub {})", active, xpub),
        });
    }
    Ok(())
}

impl KeyringManager {
    /// Sign an EVM transaction with the active account and return the signed RLP payload.
    ///
    /// # Errors
    /// * `ChainKindMismatch` / `NetworkMismatch` - request does not fit the active network
    /// * `AccountStateMismatch` - `request.from` is not the active account
    /// * `Device` - propagated unchanged from the hardware capability
    pub async fn sign_evm_transaction(&self, request: &EvmTransactionRequest) -> Result<Bytes> {
        let vault = self.vault.get_vault().await?;
        self.sign_evm_with(&vault, request).await
    }

    /// Sign, then hand the payload to the configured broadcaster. Returns the transaction hash.
    pub async fn send_evm_transaction(&self, request: &EvmTransactionRequest) -> Result<String> {
        let broadcaster = self
            .broadcaster
            .clone()
            .ok_or_else(|| KeyringError::Broadcast("no broadcaster configured".to_string()))?;
        let vault = self.vault.get_vault().await?;
        let raw = self.sign_evm_with(&vault, request).await?;
        let hash = broadcaster.broadcast(&vault.active_network, &raw).await?;
        info!(chain_id = vault.active_network.chain_id, "EVM transaction broadcast");
        Ok(hash)
    }

    async fn sign_evm_with(&self, vault: &VaultState, request: &EvmTransactionRequest) -> Result<Bytes> {
        ensure_chain_kind(&vault.active_network, ChainKind::Evm)?;
        ensure_chain_id(request.chain_id, &vault.active_network)?;
        let account = active_account(vault)?;
        let (kind, id) = (account.kind(), account.id());
        ensure_same_address(&request.from, account.address(), vault.active_account)?;
        let tx = request.to_typed_transaction()?;

        match HardwareDevice::from_account_kind(kind) {
            None => {
                debug!(account = %vault.active_account, "signing EVM transaction in software");
                let signer = self.signer_for(vault, kind, id).await?;
                verify_signer(&signer, account, vault.active_account)?;
                let wallet = signer.evm_wallet(request.chain_id).map_err(|e| e.with_account(kind, id))?;
                sign_locally(&wallet, &tx).map_err(|e| e.with_account(kind, id))
            }
            Some(device) => {
                let wallet = self.attached(device)?;
                let coin = self.coin_for(&vault.active_network)?;
                let path: Bip32Path = account_address_path(&coin, id, false, 0).parse()?;
                let device_address = wallet.derive_address(&path, &coin).await?;
                ensure_same_address(account.address(), &device_address, vault.active_account)?;

                info!(device = %device, account_id = id, "delegating EVM signature to device");
                match wallet.sign_transaction(&path, &tx.rlp()).await? {
                    SignatureComponents::Ecdsa { v, r, s } => assemble_signed(&tx, v, &r, &s, request.chain_id),
                    SignatureComponents::Inputs(_) => Err(KeyringError::SigningFailed(format!(
                        "{} returned PSBT signatures for an EVM transaction",
                        device
                    ))),
                }
            }
        }
    }

    /// EIP-191 signature of `message` by the active account, which must be `claimed_address`.
    pub async fn sign_personal_message(&self, claimed_address: &str, message: &[u8]) -> Result<Vec<u8>> {
        let vault = self.vault.get_vault().await?;
        ensure_chain_kind(&vault.active_network, ChainKind::Evm)?;
        let account = active_account(&vault)?;
        let (kind, id) = (account.kind(), account.id());
        ensure_same_address(claimed_address, account.address(), vault.active_account)?;

        match HardwareDevice::from_account_kind(kind) {
            None => {
                let signer = self.signer_for(&vault, kind, id).await?;
                verify_signer(&signer, account, vault.active_account)?;
                let wallet = signer
                    .evm_wallet(vault.active_network.chain_id)
                    .map_err(|e| e.with_account(kind, id))?;
                ethereum::sign_personal_message(&wallet, message)
                    .await
                    .map_err(|e| e.with_account(kind, id))
            }
            Some(device) => {
                let wallet = self.attached(device)?;
                let coin = self.coin_for(&vault.active_network)?;
                let path: Bip32Path = account_address_path(&coin, id, false, 0).parse()?;
                let device_address = wallet.derive_address(&path, &coin).await?;
                ensure_same_address(account.address(), &device_address, vault.active_account)?;

                info!(device = %device, account_id = id, "delegating message signature to device");
                Ok(wallet.sign_message(&path, message).await?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{unlocked_manager, MockDevice, SEED};
    use super::*;
    use crate::blockchain::ethereum::EvmFee;
    use crate::core::domain::Network;
    use crate::core::errors::DeviceError;
    use crate::core::registry::{BuiltinRegistry, CoinRegistry};
    use ethers::types::U256;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    const ETH_ADDR: &str = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94";
    const OTHER: &str = "legal winner thank year wave sausage worth useful legal winner thank yellow";

    fn request(from: &str, chain_id: u64) -> EvmTransactionRequest {
        EvmTransactionRequest {
            from: from.to_string(),
            to: Some("0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string()),
            value: U256::from(1_000u64),
            data: Bytes::default(),
            nonce: U256::zero(),
            gas: U256::from(21_000u64),
            fee: EvmFee::Legacy { gas_price: U256::from(1_000_000_000u64) },
            chain_id,
        }
    }

    /// Same transaction signed locally by account `id` of `phrase`; signatures are deterministic.
    fn expected(phrase: &str, id: u32, req: &EvmTransactionRequest) -> Bytes {
        let network = Network::ethereum_mainnet();
        let coin = BuiltinRegistry.for_network(&network).unwrap();
        let signer = AccountSigner::from_phrase(phrase, &network, &coin, id).unwrap();
        let wallet = signer.evm_wallet(req.chain_id).unwrap();
        sign_locally(&wallet, &req.to_typed_transaction().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_software_signature_recovers_account() {
        let (manager, _) = unlocked_manager(Network::ethereum_mainnet()).await;
        let req = request(ETH_ADDR, 1);
        let raw = manager.sign_evm_transaction(&req).await.unwrap();
        assert_eq!(raw, expected(SEED, 0, &req));
    }

    #[tokio::test]
    async fn test_wrong_chain_id() {
        let (manager, _) = unlocked_manager(Network::ethereum_mainnet()).await;
        let err = manager.sign_evm_transaction(&request(ETH_ADDR, 137)).await.unwrap_err();
        assert!(matches!(err, KeyringError::NetworkMismatch(_)));
    }

    #[tokio::test]
    async fn test_utxo_network_rejected() {
        let (manager, _) = unlocked_manager(Network::syscoin_mainnet()).await;
        let err = manager.sign_evm_transaction(&request(ETH_ADDR, 57)).await.unwrap_err();
        assert!(matches!(err, KeyringError::ChainKindMismatch { expected: ChainKind::Evm, .. }));
    }

    #[tokio::test]
    async fn test_account_switch_race_is_detected() {
        let (manager, _) = unlocked_manager(Network::ethereum_mainnet()).await;
        let pending = request(ETH_ADDR, 1);
        manager.add_new_account(None).await.unwrap();
        let err = manager.sign_evm_transaction(&pending).await.unwrap_err();
        assert!(matches!(err, KeyringError::AccountStateMismatch { .. }));
        assert!(err.is_security());
    }

    #[tokio::test]
    async fn test_hardware_branch_and_error_propagation() {
        let (manager, _) = unlocked_manager(Network::ethereum_mainnet()).await;
        let device = Arc::new(MockDevice::new(HardwareDevice::Trezor, OTHER));
        manager.attach_hardware(device.clone());
        let account = manager.add_hardware_account(HardwareDevice::Trezor, 2, None).await.unwrap();

        let req = request(&account.address, 1);
        let raw = manager.sign_evm_transaction(&req).await.unwrap();
        assert_eq!(raw, expected(OTHER, 2, &req));
        assert_eq!(device.last_path.lock().as_ref().unwrap().to_string(), "m/44'/60'/0'/0/2");

        device.fail_with(DeviceError::UserRejected);
        let calls = device.sign_calls.load(Ordering::SeqCst);
        let err = manager.sign_evm_transaction(&request(&account.address, 1)).await.unwrap_err();
        assert!(matches!(err, KeyringError::Device(DeviceError::UserRejected)));
        // derive_address fails first, so no signing attempt and no retry
        assert_eq!(device.sign_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_detached_device() {
        let (manager, _) = unlocked_manager(Network::ethereum_mainnet()).await;
        manager.attach_hardware(Arc::new(MockDevice::new(HardwareDevice::Ledger, OTHER)));
        let account = manager.add_hardware_account(HardwareDevice::Ledger, 0, None).await.unwrap();
        manager.detach_hardware(HardwareDevice::Ledger);
        let err = manager.sign_evm_transaction(&request(&account.address, 1)).await.unwrap_err();
        assert!(matches!(err, KeyringError::HardwareNotConnected(HardwareDevice::Ledger)));
    }

    #[tokio::test]
    async fn test_personal_message() {
        let (manager, _) = unlocked_manager(Network::ethereum_mainnet()).await;
        let sig = manager.sign_personal_message(ETH_ADDR, b"hello").await.unwrap();
        assert_eq!(sig.len(), 65);
        let err = manager.sign_personal_message("0x0000000000000000000000000000000000000001", b"hi").await.unwrap_err();
        assert!(matches!(err, KeyringError::AccountStateMismatch { .. }));
    }

    #[tokio::test]
    async fn test_send_without_broadcaster() {
        let (manager, _) = unlocked_manager(Network::ethereum_mainnet()).await;
        let err = manager.send_evm_transaction(&request(ETH_ADDR, 1)).await.unwrap_err();
        assert!(matches!(err, KeyringError::Broadcast(_)));
    }
}
