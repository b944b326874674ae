#![allow(dead_code)]
//! Shared fixtures for the integration suites.

use async_trait::async_trait;
use bip39::Mnemonic;
use bitcoin::absolute::LockTime;
use bitcoin::bip32::{Xpriv, Xpub};
use bitcoin::hashes::{hash160, Hash};
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::{All, PublicKey, Secp256k1};
use bitcoin::{transaction, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, WPubkeyHash, Witness};
use ethers::types::H256;
use multichain_keyring::blockchain::bitcoin::extended_key::encode_xpub;
use multichain_keyring::blockchain::bitcoin::UtxoAddress;
use multichain_keyring::blockchain::ethereum;
use multichain_keyring::blockchain::TransactionBroadcaster;
use multichain_keyring::core::bip44::Bip32Path;
use multichain_keyring::core::config::KeyringConfig;
use multichain_keyring::core::domain::{ChainKind, Network, VaultState};
use multichain_keyring::core::errors::{DeviceError, Result};
use multichain_keyring::core::registry::CoinParams;
use multichain_keyring::core::vault::MemoryVault;
use multichain_keyring::core::KeyringManager;
use multichain_keyring::hardware::{DeviceResult, HardwareDevice, HardwareWallet, InputSignature, SignatureComponents};
use multichain_keyring::storage::MemoryStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const SEED: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
pub const OTHER_SEED: &str = "legal winner thank year wave sausage worth useful legal winner thank yellow";
pub const PASSWORD: &str = "pw1";

pub const BTC_ACCOUNT0: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";
pub const ETH_ACCOUNT0: &str = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94";

pub fn fast_config() -> KeyringConfig {
    let mut config = KeyringConfig::default();
    config.security.pbkdf2_iterations = 1_000;
    config
}

pub struct Harness {
    pub manager: KeyringManager,
    pub vault: MemoryVault,
    pub store: MemoryStore,
}

pub fn harness(network: Network) -> Harness {
    let vault = MemoryVault::with_state(VaultState::new(network));
    let store = MemoryStore::new();
    let manager = KeyringManager::new(fast_config(), Arc::new(vault.clone()), Arc::new(store.clone()));
    Harness { manager, vault, store }
}

/// Initialized session holding HD account 0.
pub async fn unlocked(network: Network) -> Harness {
    let h = harness(network);
    h.manager.initialize_session(SEED, PASSWORD).await.expect("initialize");
    h.manager.add_new_account(None).await.expect("account 0");
    h
}

pub fn p2wpkh_script(public_key: &PublicKey) -> ScriptBuf {
    let hash = hash160::Hash::hash(&public_key.serialize());
    ScriptBuf::new_v0_p2wpkh(&WPubkeyHash::from_raw_hash(hash))
}

/// One-input PSBT spending a P2WPKH output locked to `spent_by`.
pub fn single_input_psbt(spent_by: &PublicKey, value: u64) -> Psbt {
    let tx = Transaction {
        version: transaction::Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        }],
        output: vec![TxOut { value: Amount::from_sat(value - 1_000), script_pubkey: p2wpkh_script(spent_by) }],
    };
    let mut psbt = Psbt::from_unsigned_tx(tx).expect("unsigned tx");
    psbt.inputs[0].witness_utxo = Some(TxOut { value: Amount::from_sat(value), script_pubkey: p2wpkh_script(spent_by) });
    psbt
}

/// Hardware double deriving from a BIP39 seed held in memory.
pub struct SoftDevice {
    device: HardwareDevice,
    master: Xpriv,
    secp: Secp256k1<All>,
    failure: Mutex<Option<DeviceError>>,
    pub sign_calls: AtomicUsize,
    pub last_path: Mutex<Option<String>>,
}

impl SoftDevice {
    pub fn new(device: HardwareDevice, phrase: &str) -> Arc<Self> {
        let seed = Mnemonic::parse_normalized(phrase).expect("mnemonic").to_seed("");
        Arc::new(Self {
            device,
            master: Xpriv::new_master(bitcoin::Network::Bitcoin, &seed).expect("master"),
            secp: Secp256k1::new(),
            failure: Mutex::new(None),
            sign_calls: AtomicUsize::new(0),
            last_path: Mutex::new(None),
        })
    }

    pub fn fail_with(&self, error: DeviceError) {
        *self.failure.lock() = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    pub fn signatures(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
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

    fn evm_wallet(&self, path: &Bip32Path) -> DeviceResult<ethers::signers::LocalWallet> {
        let node = self.node(path)?;
        ethereum::local_wallet(&node.private_key.secret_bytes(), 1).map_err(|e| DeviceError::Transport(e.to_string()))
    }
}

#[async_trait]
impl HardwareWallet for SoftDevice {
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
        *self.last_path.lock() = Some(path.to_string());
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

        let wallet = self.evm_wallet(path)?;
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
        let wallet = self.evm_wallet(path)?;
        ethereum::sign_personal_message(&wallet, message)
            .await
            .map_err(|e| DeviceError::Transport(e.to_string()))
    }
}

/// Broadcaster that records payloads and answers with a fixed id.
#[derive(Default)]
pub struct RecordingBroadcaster {
    pub sent: Mutex<Vec<(u64, Vec<u8>)>>,
}

#[async_trait]
impl TransactionBroadcaster for RecordingBroadcaster {
    async fn broadcast(&self, network: &Network, payload: &[u8]) -> Result<String> {
        self.sent.lock().push((network.chain_id, payload.to_vec()));
        Ok(format!("0x{}", hex::encode(ethers::utils::keccak256(payload))))
    }
}
