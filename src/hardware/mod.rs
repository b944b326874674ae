//! Hardware wallet capability objects.
//!
//! The keyring talks to Trezor and Ledger devices only through [`HardwareWallet`]. Transport,
//! timeouts and cancellation are the implementation's business; the keyring forwards whatever
//! result or [`DeviceError`] comes back without retrying.
//!
//! Paths handed to a device are always produced by
//! [`DerivationPathResolver`](crate::core::bip44::DerivationPathResolver) so both sides agree.

use crate::core::bip44::Bip32Path;
use crate::core::domain::AccountKind;
use crate::core::errors::DeviceError;
use crate::core::registry::CoinParams;
use async_trait::async_trait;
use bitcoin::ecdsa;
use std::fmt;

/// Device-layer result; errors are never re-wrapped by the keyring.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareDevice {
    Trezor,
    Ledger,
}

impl HardwareDevice {
    pub fn account_kind(self) -> AccountKind {
        match self {
            HardwareDevice::Trezor => AccountKind::Trezor,
            HardwareDevice::Ledger => AccountKind::Ledger,
        }
    }

    pub fn from_account_kind(kind: AccountKind) -> Option<Self> {
        match kind {
            AccountKind::Trezor => Some(HardwareDevice::Trezor),
            AccountKind::Ledger => Some(HardwareDevice::Ledger),
            AccountKind::Hd | AccountKind::Imported => None,
        }
    }
}

impl fmt::Display for HardwareDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareDevice::Trezor => f.write_str("Trezor"),
            HardwareDevice::Ledger => f.write_str("Ledger"),
        }
    }
}

/// One input signature returned by a device for a PSBT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSignature {
    pub input_index: usize,
    pub public_key: bitcoin::PublicKey,
    pub signature: ecdsa::Signature,
}

/// Signature material returned by [`HardwareWallet::sign_transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureComponents {
    /// EVM transaction signature; `v` is already EIP-155 adjusted when the device does so.
    Ecdsa { v: u64, r: [u8; 32], s: [u8; 32] },
    /// Per-input signatures for a PSBT.
    Inputs(Vec<InputSignature>),
}

#[async_trait]
pub trait HardwareWallet: Send + Sync {
    fn device(&self) -> HardwareDevice;

    async fn master_fingerprint(&self) -> DeviceResult<[u8; 4]>;

    /// Address at `path`, encoded for `coin`.
    async fn derive_address(&self, path: &Bip32Path, coin: &CoinParams) -> DeviceResult<String>;

    /// Extended public key at `path`, using `coin`'s account version bytes.
    async fn get_extended_public_key(&self, path: &Bip32Path, coin: &CoinParams) -> DeviceResult<String>;

    /// Sign a serialized transaction (RLP for EVM, PSBT bytes for UTXO).
    async fn sign_transaction(&self, path: &Bip32Path, payload: &[u8]) -> DeviceResult<SignatureComponents>;

    /// 65-byte `r || s || v` personal message signature.
    async fn sign_message(&self, path: &Bip32Path, message: &[u8]) -> DeviceResult<Vec<u8>>;
}
