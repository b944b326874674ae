#![allow(clippy::needless_return)]
#![allow(clippy::len_zero)]
// src/lib.rs

pub mod blockchain;
pub mod cli;
pub mod core;
pub mod hardware;
pub mod security;
pub mod storage;

pub use crate::core::bip44::{Bip32Path, DerivationPathResolver};
pub use crate::core::domain::{Account, AccountKind, ChainKind, Network, VaultState};
pub use crate::core::errors::{DeviceError, KeyringError, Result};
pub use crate::core::keyring_manager::{AccountSigner, InputDerivation, KeyringManager, UnlockOutcome, UtxoSignRequest};
pub use crate::core::validation::{validate_zprv, ZprvValidation};
pub use crate::security::SecretBuffer;
