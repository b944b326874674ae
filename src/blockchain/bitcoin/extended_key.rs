//! Extended key serialization with coin-specific version bytes.
//!
//! `bitcoin::bip32` only understands `xpub/xprv/tpub/tprv`. Keys using other versions (`zprv`,
//! `vpub`, `Ltub`, ...) are re-labelled to the standard versions before parsing, and the
//! standard versions are swapped out for the coin's versions when encoding.

use crate::core::errors::{KeyringError, Result};
use crate::core::registry::{TPUB_TPRV, XPUB_XPRV};
use bitcoin::base58;
use bitcoin::bip32::{Xpriv, Xpub};
use zeroize::{Zeroize, Zeroizing};

pub const EXTENDED_KEY_LEN: usize = 78;

/// Base58check payload of an extended key. Fails on bad checksum or wrong length.
pub fn decode_payload(encoded: &str) -> Result<Zeroizing<Vec<u8>>> {
    let bytes = Zeroizing::new(
        base58::decode_check(encoded)
            .map_err(|e| KeyringError::InvalidKey(format!("base58check decode failed: {}", e)))?,
    );
    if bytes.len() != EXTENDED_KEY_LEN {
        return Err(KeyringError::InvalidKey(format!(
            "extended key payload must be {} bytes, got {}",
            EXTENDED_KEY_LEN,
            bytes.len()
        )));
    }
    Ok(bytes)
}

pub fn version_of(payload: &[u8]) -> [u8; 4] {
    let mut version = [0u8; 4];
    version.copy_from_slice(&payload[..4]);
    version
}

pub fn encode_xpub(xpub: &Xpub, version: [u8; 4]) -> String {
    let mut bytes = xpub.encode();
    bytes[..4].copy_from_slice(&version);
    base58::encode_check(&bytes)
}

pub fn encode_xpriv(xpriv: &Xpriv, version: [u8; 4]) -> Zeroizing<String> {
    let mut bytes = xpriv.encode();
    bytes[..4].copy_from_slice(&version);
    let encoded = Zeroizing::new(base58::encode_check(&bytes));
    bytes.zeroize();
    encoded
}

/// Parse a private extended key whose payload is already checked, using standard versions for
/// the given network class.
pub fn parse_xpriv_payload(payload: &[u8], is_testnet: bool) -> Result<Xpriv> {
    let mut bytes = Zeroizing::new(payload.to_vec());
    let standard = if is_testnet { TPUB_TPRV.private } else { XPUB_XPRV.private };
    bytes[..4].copy_from_slice(&standard);
    Ok(Xpriv::decode(&bytes)?)
}

/// Parse a private extended key carrying `expected_version`.
pub fn decode_xpriv(encoded: &str, expected_version: [u8; 4], is_testnet: bool) -> Result<Xpriv> {
    let payload = decode_payload(encoded)?;
    if version_of(&payload) != expected_version {
        return Err(KeyringError::IncompatibleKey(format!(
            "unexpected version bytes {}",
            hex::encode(version_of(&payload))
        )));
    }
    parse_xpriv_payload(&payload, is_testnet)
}

/// Parse a public extended key carrying `expected_version`.
pub fn decode_xpub(encoded: &str, expected_version: [u8; 4], is_testnet: bool) -> Result<Xpub> {
    let mut payload = decode_payload(encoded)?;
    if version_of(&payload) != expected_version {
        return Err(KeyringError::IncompatibleKey(format!(
            "unexpected version bytes {}",
            hex::encode(version_of(&payload))
        )));
    }
    let standard = if is_testnet { TPUB_TPRV.public } else { XPUB_XPRV.public };
    payload[..4].copy_from_slice(&standard);
    Ok(Xpub::decode(&payload)?)
}
