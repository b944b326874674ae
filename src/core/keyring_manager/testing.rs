//! Test helpers: in-memory managers and a software-backed hardware wallet double.

use super::KeyringManager;
use crate::blockchain::bitcoin::extended_key::encode_xpub;
use crate::blockchain::bitcoin::UtxoAddress;
use crate::blockchain::ethereum;
use crate::core::bip44::Bip32Path;
use crate::core::config::KeyringConfig;
use crate::core::domain::{ChainKind, Network, VaultState};
use crate::core::errors::DeviceError;
use crate::core::registry::CoinParams;
use crate::core::vault::MemoryVault;
use crate::hardware::{DeviceResult, HardwareDevice, HardwareWallet, InputSignature, SignatureComponents};
use crate::storage::MemoryStore;
use async_trait::async_trait;
use bip39::Mnemonic;
use bitcoin::bip32::{Xpriv, Xpub};
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::{All, Secp256k1};
use ethers::types::H256;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const SEED: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
pub const PASSWORD: &str = "pw1";

pub fn fast_config() -> KeyringConfig {
    let mut config = KeyringConfig::default();
    config.security.pbkdf2_iterations = 1_000;
    config
}

/// Locked manager over a fresh vault pointed at `network`.
pub fn manager_on(network: Network) -> (KeyringManager, MemoryVault, MemoryStore) {
    let vault = MemoryVault::with_state(VaultState::new(network));
    let store = MemoryStore::new();
    let manager = KeyringManager::new(fast_config(), Arc::new(vault.clone()), Arc::new(store.clone()));
    (manager, vault, store)
}

/// Unlocked manager holding HD account 0.
pub async fn unlocked_manager(network: Network) -> (KeyringManager, MemoryVault) {
    let (manager, vault, _) = manager_on(network);
    manager.initialize_session(SEED, PASSWORD).await.expect("initialize");
    manager.add_new_account(None).await.expect("first account");
    (manager, vault)
}

/// Hardware double deriving from a BIP39 seed in memory.
pub struct MockDevice {
    device: HardwareDevice,
    master: Xpriv,
    secp: Secp256k1<All>,
    pub failure: Mutex<Option<DeviceError>>,
    pub sign_calls: AtomicUsize,
    pub last_path: Mutex<Option<Bip32Path>>,
}

impl MockDevice {
    pub fn new(device: HardwareDevice, phrase: &str) -> Self {
        let seed = Mnemonic::parse_normalized(phrase).expect("mnemonic").to_seed("");
        Self {
            device,
            master: Xpriv::new_master(bitcoin::Network::Bitcoin, &seed).expect("master"),
            secp: Secp256k1::new(),
            failure: Mutex::new(None),
            sign_calls: AtomicUsize::new(0),
            last_path: Mutex::new(None),
        }
    }

    pub fn fail_with(&self, error: DeviceError) {
        *self.failure.lock() = Some(error);
    }

    fn check(&self) -> DeviceResult<()> {
        match self.failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn node(&self, path: &Bip32Path) -> DeviceResult<Xpriv> {
        self.master
            .derive_priv(&self.secp, &path.to_derivation_path())
            .map_err(|e| DeviceError::Transport(e.to_string()))
    }
}

#[async_trait]
impl HardwareWallet for MockDevice {
    fn device(&self) -> HardwareDevice {
        self.device
    }

    async fn master_fingerprint(&self) -> DeviceResult<[u8; 4]> {
        self.check()?;
        Ok(self.master.fingerprint(&self.secp).to_bytes())
    }

    async fn derive_address(&self, path: &Bip32Path, coin: &CoinParams) -> DeviceResult<String> {
        self.check()?;
        let node = self.node(path)?;
        let result = match coin.kind {
            ChainKind::Utxo => UtxoAddress::for_coin(&node.private_key.public_key(&self.secp), coin),
            ChainKind::Evm => ethereum::address_of_secret(&node.private_key.secret_bytes()),
        };
        result.map_err(|e| DeviceError::Transport(e.to_string()))
    }

    async fn get_extended_public_key(&self, path: &Bip32Path, coin: &CoinParams) -> DeviceResult<String> {
        self.check()?;
        let xpub = Xpub::from_priv(&self.secp, &self.node(path)?);
        Ok(encode_xpub(&xpub, coin.account_versions().public))
    }

    async fn sign_transaction(&self, path: &Bip32Path, payload: &[u8]) -> DeviceResult<SignatureComponents> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_path.lock() = Some(path.clone());
        self.check()?;

        if let Ok(mut psbt) = Psbt::deserialize(payload) {
            psbt.sign(&self.master, &self.secp)
                .map_err(|_| DeviceError::Transport("psbt signing failed".to_string()))?;
            let signatures = psbt
                .inputs
                .iter()
                .enumerate()
                .flat_map(|(input_index, input)| {
                    input.partial_sigs.iter().map(move |(pk, sig)| InputSignature {
                        input_index,
                        public_key: *pk,
                        signature: *sig,
                    })
                })
                .collect();
            return Ok(SignatureComponents::Inputs(signatures));
        }

        let node = self.node(path)?;
        let wallet = ethereum::local_wallet(&node.private_key.secret_bytes(), 1)
            .map_err(|e| DeviceError::Transport(e.to_string()))?;
        let digest = H256::from(ethers::utils::keccak256(payload));
        let sig = wallet.sign_hash(digest).map_err(|e| DeviceError::Transport(e.to_string()))?;
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        sig.r.to_big_endian(&mut r);
        sig.s.to_big_endian(&mut s);
        Ok(SignatureComponents::Ecdsa { v: sig.v, r, s })
    }

    async fn sign_message(&self, path: &Bip32Path, message: &[u8]) -> DeviceResult<Vec<u8>> {
        self.check()?;
        let node = self.node(path)?;
        let wallet = ethereum::local_wallet(&node.private_key.secret_bytes(), 1)
            .map_err(|e| DeviceError::Transport(e.to_string()))?;
        ethereum::sign_personal_message(&wallet, message)
            .await
            .map_err(|e| DeviceError::Transport(e.to_string()))
    }
}
