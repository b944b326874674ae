//! Derivation path resolution
//!
//! Path format: m/purpose'/coin_type'/account'/change/address_index
//!
//! - EVM chains: purpose 44, coin 60, account level fixed at 0, change fixed at 0; the address
//!   index selects the account.
//! - UTXO chains: purpose 84 when the coin supports native SegWit, 44 otherwise.
//!
//! Outputs are pure functions of their inputs. Hardware devices derive from the same strings, so
//! the format must never drift.

use crate::core::domain::ChainKind;
use crate::core::errors::{KeyringError, Result};
use crate::core::registry::CoinParams;
use bitcoin::bip32::{ChildNumber, DerivationPath};
use std::fmt;
use std::str::FromStr;

/// Hardened index offset.
pub const HARDENED: u32 = 0x8000_0000;

/// Stateless path calculator.
pub struct DerivationPathResolver;

impl DerivationPathResolver {
    /// BIP purpose number for `coin`.
    pub fn bip_standard(coin: &CoinParams) -> u32 {
        match coin.kind {
            ChainKind::Evm => 44,
            ChainKind::Utxo if coin.segwit => 84,
            ChainKind::Utxo => 44,
        }
    }

    /// `m/<bip>'/<slip44>'/<account>'`
    pub fn account_path(coin: &CoinParams, account_index: u32) -> String {
        let bip = Self::bip_standard(coin);
        match coin.kind {
            ChainKind::Evm => format!("m/{}'/{}'/0'", bip, coin.slip44),
            ChainKind::Utxo => format!("m/{}'/{}'/{}'", bip, coin.slip44, account_index),
        }
    }

    /// Full address path. EVM ignores `account_index` and `is_change`.
    pub fn address_path(
        coin: &CoinParams,
        account_index: u32,
        is_change: bool,
        address_index: u32,
    ) -> String {
        let bip = Self::bip_standard(coin);
        match coin.kind {
            ChainKind::Evm => format!("m/{}'/{}'/0'/0/{}", bip, coin.slip44, address_index),
            ChainKind::Utxo => format!(
                "m/{}'/{}'/{}'/{}/{}",
                bip,
                coin.slip44,
                account_index,
                u32::from(is_change),
                address_index
            ),
        }
    }
}

/// Parsed BIP32 path as raw child indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bip32Path {
    pub path: Vec<u32>,
}

impl Bip32Path {
    pub fn new(path: Vec<u32>) -> Self {
        Self { path }
    }

    /// Device wire layout: depth byte followed by big-endian indices.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let depth = u8::try_from(self.path.len()).map_err(|_| {
            KeyringError::InvalidDerivationPath(format!("depth {} does not fit in one byte", self.path.len()))
        })?;
        let mut bytes = Vec::with_capacity(1 + self.path.len() * 4);
        bytes.push(depth);
        for index in &self.path {
            bytes.extend_from_slice(&index.to_be_bytes());
        }
        Ok(bytes)
    }

    pub fn to_derivation_path(&self) -> DerivationPath {
        self.path.iter().map(|i| ChildNumber::from(*i)).collect::<Vec<_>>().into()
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

impl FromStr for Bip32Path {
    type Err = KeyringError;

    fn from_str(path_str: &str) -> Result<Self> {
        let rest = path_str
            .strip_prefix("m/")
            .ok_or_else(|| KeyringError::InvalidDerivationPath(format!("must start with m/: {}", path_str)))?;
        if rest.is_empty() {
            return Err(KeyringError::InvalidDerivationPath(format!(
                "path has no components: {}",
                path_str
            )));
        }

        let mut path = Vec::new();
        for part in rest.split('/') {
            let hardened = part.ends_with('\'') || part.ends_with('h');
            let num_str = part.trim_end_matches('\'').trim_end_matches('h');
            let num: u32 = num_str
                .parse()
                .map_err(|_| KeyringError::InvalidDerivationPath(format!("bad component '{}' in {}", part, path_str)))?;
            if num >= HARDENED {
                return Err(KeyringError::InvalidDerivationPath(format!(
                    "index out of range in {}",
                    path_str
                )));
            }
            path.push(if hardened { HARDENED | num } else { num });
        }

        Ok(Self { path })
    }
}

impl fmt::Display for Bip32Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for index in &self.path {
            if index & HARDENED != 0 {
                write!(f, "/{}'", index & !HARDENED)?;
            } else {
                write!(f, "/{}", index)?;
            }
        }
        Ok(())
    }
}
