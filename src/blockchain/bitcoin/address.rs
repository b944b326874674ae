//! UTXO address encoding driven by registry parameters.
//!
//! Supported types:
//! - SegWit (P2WPKH): `<hrp>1q...`, for coins with a bech32 prefix
//! - Legacy (P2PKH): base58check with the coin's pubkey-hash byte

use crate::core::errors::{KeyringError, Result};
use crate::core::registry::CoinParams;
use bech32::{ToBase32, Variant};
use bitcoin::hashes::{hash160, Hash};
use bitcoin::secp256k1::PublicKey;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Legacy,
    SegWit,
}

impl AddressType {
    pub fn for_coin(coin: &CoinParams) -> Self {
        if coin.segwit && coin.bech32_hrp.is_some() {
            AddressType::SegWit
        } else {
            AddressType::Legacy
        }
    }
}

pub struct UtxoAddress;

impl UtxoAddress {
    /// Native SegWit v0 address for a compressed public key.
    pub fn segwit(public_key: &PublicKey, hrp: &str) -> Result<String> {
        let program = hash160::Hash::hash(&public_key.serialize());
        let version = bech32::u5::try_from_u8(0)
            .map_err(|e| KeyringError::InvalidKey(format!("witness version: {}", e)))?;
        let mut data = vec![version];
        data.extend(program.as_byte_array().to_base32());
        bech32::encode(hrp, data, Variant::Bech32)
            .map_err(|e| KeyringError::InvalidKey(format!("bech32 encoding failed: {}", e)))
    }

    /// Base58check P2PKH address.
    pub fn legacy(public_key: &PublicKey, pubkey_hash: u8) -> String {
        let program = hash160::Hash::hash(&public_key.serialize());
        let mut payload = Vec::with_capacity(21);
        payload.push(pubkey_hash);
        payload.extend_from_slice(program.as_byte_array());
        bitcoin::base58::encode_check(&payload)
    }

    /// Receiving address for `coin`.
    pub fn for_coin(public_key: &PublicKey, coin: &CoinParams) -> Result<String> {
        let address = match (AddressType::for_coin(coin), coin.bech32_hrp) {
            (AddressType::SegWit, Some(hrp)) => Self::segwit(public_key, hrp)?,
            _ => Self::legacy(public_key, coin.pubkey_hash),
        };
        debug!(coin = coin.symbol, "derived address");
        Ok(address)
    }
}
