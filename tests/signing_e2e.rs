mod common;

use common::{harness, single_input_psbt, unlocked, RecordingBroadcaster, BTC_ACCOUNT0, ETH_ACCOUNT0, OTHER_SEED, PASSWORD};
use ethers::types::{Bytes, U256};
use multichain_keyring::blockchain::ethereum::{self, EvmFee, EvmTransactionRequest};
use multichain_keyring::core::domain::{AccountKind, ChainKind, Network};
use multichain_keyring::{InputDerivation, KeyringError, UtxoSignRequest};
use pretty_assertions::assert_eq;
use std::str::FromStr;
use std::sync::Arc;

const ZPRV: &str = "zprvAdG4iTXWBoARxkkzNpNh8r6Qag3irQB8PzEMkAFeTRXxHpbF9z4QgEvBRmfvqWvGp42t42nvgGpNgYSJA9iefm1yYNZKEm7z6qUWCroSQnE";
const ZPUB: &str = "zpub6rFR7y4Q2AijBEqTUquhVz398htDFrtymD9xYYfG1m4wAcvPhXNfE3EfH1r1ADqtfSdVCToUG868RvUUkgDKf31mGDtKsAYz2oz2AGutZYs";
const SYS_ACCOUNT0: &str = "sys1q2fs58xaj4tp7qrr3slpdsm65j3nw030d246lmx";
const SYS_ZPUB: &str = "zpub6rgSqgvARBgddt6ChVvd5xRJqHTYyRp6uEHgVKRvY7YwnojMTCaUiTHrc1hV6CivZZg4Gt9RCEf4bC4GAm829vR1b18fMbF5iLDmZ5ffN8M";
const TSYS_ACCOUNT0: &str = "tsys1q6rz28mcfaxtmd6v789l9rrlrusdprr9p4ugvp5";
const TSYS_VPUB: &str = "vpub5Y6cjg78GGuNLsaPhmYsiw4gYX3HoQiRBiSwDaBXKUafCt9bNwWQiitDk5VZ5BVxYnQdwoTyXSs2JHRPAgjAvtbBrf8ZhDYe2jWAqvZVnsc";
const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const DEV_ADDR: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

fn evm_request(from: &str, chain_id: u64, nonce: u64) -> EvmTransactionRequest {
    EvmTransactionRequest {
        from: from.to_string(),
        to: Some("0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string()),
        value: U256::from(10u64).pow(U256::from(15u64)),
        data: Bytes::default(),
        nonce: U256::from(nonce),
        gas: U256::from(21_000u64),
        fee: EvmFee::Eip1559 {
            max_fee_per_gas: U256::from(30_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
        },
        chain_id,
    }
}

fn utxo_request(claimed: &str, psbt: bitcoin::psbt::Psbt) -> UtxoSignRequest {
    UtxoSignRequest {
        claimed_address: claimed.to_string(),
        psbt,
        inputs: vec![InputDerivation { input_index: 0, change: false, index: 0 }],
    }
}

/// Public key of `address`'s owner, read back from a signed PSBT's key origin.
fn origin_key(psbt: &bitcoin::psbt::Psbt) -> (bitcoin::secp256k1::PublicKey, String) {
    let (pk, (_, path)) = psbt.inputs[0].bip32_derivation.iter().next().expect("key origin");
    (*pk, path.to_string())
}

#[tokio::test]
async fn test_bitcoin_account_zero_vector() {
    let h = unlocked(Network::bitcoin_mainnet()).await;
    assert_eq!(h.manager.get_address(false, 0).await.unwrap(), BTC_ACCOUNT0);
    assert_eq!(h.manager.get_account_xpub().await.unwrap(), ZPUB);

    let exported = h.manager.export_account_private_key(AccountKind::Hd, 0, PASSWORD).await.unwrap();
    assert_eq!(exported.as_str(), ZPRV);
}

#[tokio::test]
async fn test_bitcoin_psbt_signed_end_to_end() {
    let h = unlocked(Network::bitcoin_mainnet()).await;
    let signer = h.manager.derive_for_active_account().await.unwrap();
    let (pk, path, fingerprint) = signer.input_key(false, 0).unwrap();
    assert_eq!(path.to_string(), "m/84'/0'/0'/0/0");
    drop(signer);

    let signed = h.manager.sign_utxo_transaction(utxo_request(BTC_ACCOUNT0, single_input_psbt(&pk, 120_000))).await.unwrap();
    assert_eq!(signed.inputs[0].partial_sigs.len(), 1);
    let (origin_pk, origin_path) = origin_key(&signed);
    assert_eq!(origin_pk, pk);
    assert_eq!(origin_path, "m/84'/0'/0'/0/0");
    let (recorded_fp, _) = &signed.inputs[0].bip32_derivation[&pk];
    assert_eq!(*recorded_fp, fingerprint);
}

#[tokio::test]
async fn test_ethereum_account_zero_vector() {
    let h = unlocked(Network::ethereum_mainnet()).await;
    assert_eq!(h.manager.get_address(false, 0).await.unwrap(), ETH_ACCOUNT0);

    let req = evm_request(ETH_ACCOUNT0, 1, 0);
    let raw = h.manager.sign_evm_transaction(&req).await.unwrap();

    let key = h.manager.export_account_private_key(AccountKind::Hd, 0, PASSWORD).await.unwrap();
    let secret = ethereum::decode_hex_secret(&key).unwrap();
    assert_eq!(ethereum::address_of_secret(&secret).unwrap(), ETH_ACCOUNT0);
    let wallet = ethereum::local_wallet(&secret, 1).unwrap();
    let expected = ethereum::sign_locally(&wallet, &req.to_typed_transaction().unwrap()).unwrap();
    assert_eq!(raw, expected);
    // EIP-1559 envelope
    assert_eq!(raw[0], 0x02);
}

#[tokio::test]
async fn test_evm_import_and_send() {
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let mut h = harness(Network::ethereum_mainnet());
    h.manager = h.manager.with_broadcaster(broadcaster.clone());
    h.manager.initialize_session(OTHER_SEED, PASSWORD).await.unwrap();

    let imported = h.manager.import_account(DEV_KEY, Some("dev")).await.unwrap();
    assert_eq!(imported.address, DEV_ADDR);
    assert_eq!(imported.kind, AccountKind::Imported);
    assert_eq!(imported.label, "dev");

    let tx_hash = h.manager.send_evm_transaction(&evm_request(DEV_ADDR, 1, 4)).await.unwrap();
    assert!(tx_hash.starts_with("0x"));
    let sent = broadcaster.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, 1);
}

#[tokio::test]
async fn test_syscoin_mainnet_and_testnet_instances() {
    let main = unlocked(Network::syscoin_mainnet()).await;
    assert_eq!(main.manager.get_address(false, 0).await.unwrap(), SYS_ACCOUNT0);
    assert_eq!(main.manager.get_account_xpub().await.unwrap(), SYS_ZPUB);

    // one instance per UTXO coin
    let err = main.manager.set_active_network(Network::syscoin_testnet()).await.unwrap_err();
    assert!(matches!(err, KeyringError::Slip44Mismatch { bound: 57, requested: 1 }));
    assert!(err.is_compatibility());

    let test = harness(Network::syscoin_testnet());
    main.manager.transfer_session_to(&test.manager).unwrap();
    let account = test.manager.add_new_account(None).await.unwrap();
    assert_eq!(account.address, TSYS_ACCOUNT0);
    assert_eq!(account.xpub, TSYS_VPUB);
    assert_ne!(account.address, SYS_ACCOUNT0);
    assert_ne!(account.xpub, SYS_ZPUB);
    assert_eq!(test.manager.bound_slip44(), Some(1));
}

#[tokio::test]
async fn test_network_switch_to_evm_and_back() {
    let h = unlocked(Network::syscoin_mainnet()).await;
    let sys_address = h.manager.get_address(false, 0).await.unwrap();

    h.manager.set_active_network(Network::ethereum_mainnet()).await.unwrap();
    assert_eq!(h.manager.get_address(false, 0).await.unwrap(), ETH_ACCOUNT0);
    let raw = h.manager.sign_evm_transaction(&evm_request(ETH_ACCOUNT0, 1, 0)).await.unwrap();
    assert!(!raw.is_empty());

    h.manager.set_active_network(Network::syscoin_mainnet()).await.unwrap();
    assert_eq!(h.manager.get_address(false, 0).await.unwrap(), sys_address);
}

#[tokio::test]
async fn test_account_switch_race_is_rejected() {
    let h = unlocked(Network::ethereum_mainnet()).await;
    let pending = evm_request(ETH_ACCOUNT0, 1, 0);

    let second = h.manager.add_new_account(None).await.unwrap();
    assert_eq!(second.id, 1);
    let err = h.manager.sign_evm_transaction(&pending).await.unwrap_err();
    assert!(matches!(err, KeyringError::AccountStateMismatch { .. }));

    h.manager.set_active_account(AccountKind::Hd, 0).await.unwrap();
    h.manager.sign_evm_transaction(&pending).await.unwrap();
}

#[tokio::test]
async fn test_chain_kind_and_chain_id_checks() {
    let h = unlocked(Network::ethereum_mainnet()).await;
    let err = h.manager.sign_evm_transaction(&evm_request(ETH_ACCOUNT0, 137, 0)).await.unwrap_err();
    assert!(matches!(err, KeyringError::NetworkMismatch(_)));

    let psbt = single_input_psbt(&bitcoin::secp256k1::PublicKey::from_str(
        "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
    )
    .unwrap(), 10_000);
    let err = h.manager.sign_utxo_transaction(utxo_request(ETH_ACCOUNT0, psbt)).await.unwrap_err();
    assert!(matches!(err, KeyringError::ChainKindMismatch { expected: ChainKind::Utxo, actual: ChainKind::Evm }));
}

#[tokio::test]
async fn test_zprv_import_follows_network() {
    let h = harness(Network::syscoin_testnet());
    h.manager.initialize_session(OTHER_SEED, PASSWORD).await.unwrap();
    let err = h.manager.import_account(ZPRV, None).await.unwrap_err();
    assert!(matches!(err.root(), KeyringError::NetworkMismatch(_)), "{:?}", err);

    let h = harness(Network::bitcoin_mainnet());
    h.manager.initialize_session(OTHER_SEED, PASSWORD).await.unwrap();
    let imported = h.manager.import_account(ZPRV, None).await.unwrap();
    assert_eq!(imported.address, BTC_ACCOUNT0);
    assert_eq!(imported.xpub, ZPUB);

    let err = h.manager.import_account(ZPRV, None).await.unwrap_err();
    assert!(matches!(err, KeyringError::AccountAlreadyExists(_)));

    let xprv = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi";
    let err = h.manager.import_account(xprv, None).await.unwrap_err();
    assert!(matches!(err.root(), KeyringError::UnsupportedKeyScheme(_)));
}

#[tokio::test]
async fn test_imported_zprv_signs_psbt() {
    let h = harness(Network::bitcoin_mainnet());
    h.manager.initialize_session(OTHER_SEED, PASSWORD).await.unwrap();
    h.manager.import_account(ZPRV, None).await.unwrap();

    let signer = h.manager.derive_for_imported_account(0).await.unwrap();
    let (pk, path, _) = signer.input_key(false, 0).unwrap();
    assert_eq!(path.to_string(), "m/0/0");
    drop(signer);

    let signed = h.manager.sign_utxo_transaction(utxo_request(BTC_ACCOUNT0, single_input_psbt(&pk, 64_000))).await.unwrap();
    assert_eq!(signed.inputs[0].partial_sigs.len(), 1);
}
