//! Key import validation and network/account compatibility checks.
//!
//! ## Extended key import
//!
//! [`validate_zprv`] never returns an error: "this string is not an importable key" is an
//! expected outcome, reported through [`ZprvValidation`] so callers can fall back to another
//! format. Checks run in a fixed order:
//!
//! 1. prefix: known but unsupported schemes (`xprv`, `yprv`, ...) are rejected outright
//! 2. base58check payload of exactly 78 bytes
//! 3. network class from the prefix against the target network's testnet flag
//! 4. version bytes against the target coin's BIP84 entry, then a structural parse
//! 5. the private key must be a valid secp256k1 scalar
//!
//! Several coins share the same version bytes, so a key's coin cannot be read from the key.
//! The result names the network class and lists every registry coin it could belong to.

use crate::blockchain::bitcoin::extended_key::{decode_payload, parse_xpriv_payload, version_of};
use crate::core::domain::{ChainKind, Network};
use crate::core::errors::{KeyringError, Result};
use crate::core::registry::{CoinParams, CoinRegistry};
use bitcoin::bip32::Xpriv;
use bitcoin::secp256k1::SecretKey;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkClass {
    Mainnet,
    Testnet,
}

impl NetworkClass {
    pub fn is_testnet(self) -> bool {
        matches!(self, NetworkClass::Testnet)
    }
}

impl fmt::Display for NetworkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkClass::Mainnet => f.write_str("mainnet"),
            NetworkClass::Testnet => f.write_str("testnet"),
        }
    }
}

/// Why a candidate string was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZprvRejection {
    /// Recognised extended-key prefix of a scheme other than BIP84.
    UnsupportedKeyScheme,
    InvalidPrefix,
    InvalidEncoding,
    NetworkMismatch,
    IncompatibleKey,
    InvalidScalar,
    /// The target network cannot hold extended-key accounts.
    UnsupportedNetwork,
}

/// Accepted key plus the network context it was validated against.
pub struct ValidatedZprv {
    pub xpriv: Xpriv,
    pub network_class: NetworkClass,
    /// Registry entry of the target network.
    pub coin: CoinParams,
    /// Every registry coin of this network class sharing the key's version bytes.
    pub candidate_coins: Vec<&'static str>,
}

impl fmt::Debug for ValidatedZprv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedZprv")
            .field("network_class", &self.network_class)
            .field("coin", &self.coin.symbol)
            .field("candidate_coins", &self.candidate_coins)
            .finish_non_exhaustive()
    }
}

impl Drop for ValidatedZprv {
    fn drop(&mut self) {
        self.xpriv.private_key.non_secure_erase();
    }
}

#[derive(Debug)]
pub struct ZprvValidation {
    pub is_valid: bool,
    pub message: String,
    pub rejection: Option<ZprvRejection>,
    pub node: Option<ValidatedZprv>,
}

impl ZprvValidation {
    fn accepted(node: ValidatedZprv) -> Self {
        let message = format!(
            "valid {} extended private key (candidate coins: {})",
            node.network_class,
            node.candidate_coins.join(", ")
        );
        Self { is_valid: true, message, rejection: None, node: Some(node) }
    }

    fn rejected(reason: ZprvRejection, message: impl Into<String>) -> Self {
        Self { is_valid: false, message: message.into(), rejection: Some(reason), node: None }
    }

    /// Convert into a thrown error, for callers where an invalid key is misuse.
    pub fn into_result(mut self) -> Result<ValidatedZprv> {
        if let Some(node) = self.node.take() {
            return Ok(node);
        }
        let message = std::mem::take(&mut self.message);
        Err(match self.rejection {
            Some(ZprvRejection::UnsupportedKeyScheme) => KeyringError::UnsupportedKeyScheme(message),
            Some(ZprvRejection::NetworkMismatch) => KeyringError::NetworkMismatch(message),
            Some(ZprvRejection::IncompatibleKey) | Some(ZprvRejection::UnsupportedNetwork) => {
                KeyringError::IncompatibleKey(message)
            }
            _ => KeyringError::InvalidKey(message),
        })
    }
}

const UNSUPPORTED_PREFIXES: &[&str] = &["xprv", "tprv", "yprv", "uprv", "Yprv", "Zprv", "Uprv", "Vprv"];

fn class_from_prefix(prefix: &str) -> Option<NetworkClass> {
    match prefix {
        "zprv" => Some(NetworkClass::Mainnet),
        "vprv" => Some(NetworkClass::Testnet),
        _ => None,
    }
}

/// Validate `candidate` as a BIP84 account private key importable on `network`.
pub fn validate_zprv(candidate: &str, network: &Network, registry: &dyn CoinRegistry) -> ZprvValidation {
    let candidate = candidate.trim();
    let prefix = candidate.get(..4).unwrap_or(candidate);

    if UNSUPPORTED_PREFIXES.contains(&prefix) {
        return ZprvValidation::rejected(
            ZprvRejection::UnsupportedKeyScheme,
            format!("'{}' keys are not supported, only native SegWit (zprv/vprv) keys can be imported", prefix),
        );
    }
    let class = match class_from_prefix(prefix) {
        Some(class) => class,
        None => {
            return ZprvValidation::rejected(
                ZprvRejection::InvalidPrefix,
                "not an extended private key prefix",
            )
        }
    };

    let payload = match decode_payload(candidate) {
        Ok(payload) => payload,
        Err(e) => return ZprvValidation::rejected(ZprvRejection::InvalidEncoding, e.to_string()),
    };

    if class.is_testnet() != network.is_testnet {
        let target = if network.is_testnet { "testnet" } else { "mainnet" };
        return ZprvValidation::rejected(
            ZprvRejection::NetworkMismatch,
            format!("{} key cannot be imported on {} network {}", class, target, network.label),
        );
    }

    let coin = match registry.for_network(network) {
        Ok(coin) if coin.kind == ChainKind::Utxo => coin,
        Ok(_) => {
            return ZprvValidation::rejected(
                ZprvRejection::UnsupportedNetwork,
                format!("{} is not a UTXO network", network.label),
            )
        }
        Err(e) => return ZprvValidation::rejected(ZprvRejection::UnsupportedNetwork, e.to_string()),
    };
    let expected = match coin.bip84 {
        Some(versions) => versions.private,
        None => {
            return ZprvValidation::rejected(
                ZprvRejection::IncompatibleKey,
                format!("{} has no native SegWit key versions", coin.name),
            )
        }
    };
    let version = version_of(&payload);
    if version != expected {
        return ZprvValidation::rejected(
            ZprvRejection::IncompatibleKey,
            format!("version bytes {} do not match {}", hex::encode(version), coin.name),
        );
    }

    let xpriv = match parse_xpriv_payload(&payload, class.is_testnet()) {
        Ok(xpriv) => xpriv,
        Err(KeyringError::InvalidKey(_)) if SecretKey::from_slice(&payload[46..]).is_err() => {
            return ZprvValidation::rejected(ZprvRejection::InvalidScalar, "private key is not a valid secp256k1 scalar")
        }
        Err(e) => return ZprvValidation::rejected(ZprvRejection::IncompatibleKey, e.to_string()),
    };
    if payload[45] != 0 || SecretKey::from_slice(&xpriv.private_key.secret_bytes()).is_err() {
        return ZprvValidation::rejected(ZprvRejection::InvalidScalar, "private key is not a valid secp256k1 scalar");
    }

    let candidate_coins = registry
        .by_private_version(version)
        .into_iter()
        .filter(|c| c.is_testnet == class.is_testnet())
        .map(|c| c.symbol)
        .collect();

    debug!(class = %class, coin = coin.symbol, "extended private key accepted");
    ZprvValidation::accepted(ValidatedZprv { xpriv, network_class: class, coin, candidate_coins })
}

/// Fails `ChainKindMismatch` unless `network` belongs to `expected`.
pub fn ensure_chain_kind(network: &Network, expected: ChainKind) -> Result<()> {
    if network.kind != expected {
        return Err(KeyringError::ChainKindMismatch { expected, actual: network.kind });
    }
    Ok(())
}

/// A manager stays on one SLIP-44 coin for UTXO networks; EVM networks share coin type 60.
pub fn ensure_network_compatible(bound_utxo_slip44: Option<u32>, requested: &Network) -> Result<()> {
    match (requested.kind, bound_utxo_slip44) {
        (ChainKind::Utxo, Some(bound)) if bound != requested.slip44 => {
            Err(KeyringError::Slip44Mismatch { bound, requested: requested.slip44 })
        }
        _ => Ok(()),
    }
}

/// Fails `NetworkMismatch` if a request targets another chain id than the active network.
pub fn ensure_chain_id(requested: u64, active: &Network) -> Result<()> {
    if requested != active.chain_id {
        return Err(KeyringError::NetworkMismatch(format!(
            "request is for chain {}, active network is {} ({})",
            requested, active.label, active.chain_id
        )));
    }
    Ok(())
}

/// Case-insensitive address comparison raising `AccountStateMismatch`.
pub fn ensure_same_address(claimed: &str, actual: &str, active: impl fmt::Display) -> Result<()> {
    if !claimed.eq_ignore_ascii_case(actual) {
        return Err(KeyringError::AccountStateMismatch {
            claimed: claimed.to_string(),
            active: format!("{} ({})", active, actual),
        });
    }
    Ok(())
}
