//! Keyring error taxonomy
//!
//! Every failure the signing core can raise. Expected negative outcomes (wrong password on
//! unlock, "this string is not an extended key") are *not* errors; they are returned as plain
//! result structs by the operations that produce them.

use crate::core::domain::{AccountKind, ChainKind};
use crate::hardware::HardwareDevice;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, KeyringError>;

/// Errors raised by a hardware capability object.
///
/// These are produced by the device layer and travel through the core untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("device not connected")]
    NotConnected,
    #[error("request rejected on device")]
    UserRejected,
    #[error("device did not answer in time")]
    Timeout,
    #[error("device transport failure: {0}")]
    Transport(String),
}

/// Custom error type for keyring operations.
#[derive(Debug, Error)]
pub enum KeyringError {
    // ---- secret / session state ----
    /// A cleared `SecretBuffer` was read.
    #[error("secret is no longer available")]
    SecretUnavailable,
    /// Operation needs an unlocked session.
    #[error("wallet is locked")]
    SessionUnavailable,
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("wallet already initialized with different seed or password")]
    AlreadyInitializedWithDifferentParameters,
    #[error("invalid password")]
    InvalidPassword,
    #[error("no encrypted seed found in vault")]
    SeedNotFound,
    #[error("decrypted data is not valid UTF-8: {0}")]
    MalformedEncoding(String),

    // ---- vault / account state ----
    #[error("vault accessor not configured: {0}")]
    VaultNotConfigured(String),
    #[error("vault is incomplete: {0}")]
    IncompleteVault(String),
    #[error("account {kind}:{id} not found")]
    AccountNotFound { kind: AccountKind, id: u32 },
    #[error("account already exists: {0}")]
    AccountAlreadyExists(String),
    #[error("account type {kind} does not support {operation}")]
    UnsupportedAccountType { kind: AccountKind, operation: &'static str },
    /// Derivation silently produced a different account than requested.
    #[error("requested account index {requested} but derivation produced {derived}")]
    AccountIndexMismatch { requested: u32, derived: u32 },
    /// The signing request was built for a different account than the active one.
    #[error("account state mismatch: request targets {claimed}, active account is {active}")]
    AccountStateMismatch { claimed: String, active: String },

    // ---- validation ----
    #[error("invalid seed phrase: {0}")]
    InvalidSeed(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("unsupported key scheme: {0}")]
    UnsupportedKeyScheme(String),
    #[error("incompatible key: {0}")]
    IncompatibleKey(String),
    #[error("invalid derivation path: {0}")]
    InvalidDerivationPath(String),
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    // ---- compatibility ----
    #[error("network mismatch: {0}")]
    NetworkMismatch(String),
    #[error("manager is bound to slip44 {bound}, cannot switch to slip44 {requested}")]
    Slip44Mismatch { bound: u32, requested: u32 },
    #[error("expected a {expected} network, active network is {actual}")]
    ChainKindMismatch { expected: ChainKind, actual: ChainKind },
    #[error("unknown coin: slip44 {slip44} ({symbol})")]
    UnknownCoin { slip44: u32, symbol: String },

    // ---- external collaborators ----
    #[error("{0} is not attached")]
    HardwareNotConnected(HardwareDevice),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("broadcast failed: {0}")]
    Broadcast(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("configuration error: {0}")]
    Config(String),

    // ---- signing ----
    #[error("signing failed: {0}")]
    SigningFailed(String),
    /// Software signing failure annotated with the account it happened on.
    #[error("account {kind}:{id}: {source}")]
    AccountContext {
        kind: AccountKind,
        id: u32,
        #[source]
        source: Box<KeyringError>,
    },
}

impl KeyringError {
    /// Wrap with account identity. Already-wrapped and device errors are returned unchanged.
    pub fn with_account(self, kind: AccountKind, id: u32) -> Self {
        match self {
            err @ (KeyringError::AccountContext { .. } | KeyringError::Device(_)) => err,
            other => KeyringError::AccountContext { kind, id, source: Box::new(other) },
        }
    }

    /// Innermost error, looking through account context.
    pub fn root(&self) -> &KeyringError {
        match self {
            KeyringError::AccountContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Decryption failures and derived-address mismatches.
    pub fn is_security(&self) -> bool {
        matches!(
            self.root(),
            KeyringError::DecryptionFailed(_)
                | KeyringError::AccountStateMismatch { .. }
                | KeyringError::AccountIndexMismatch { .. }
                | KeyringError::InvalidPassword
        )
    }

    /// Network/chain/key-class incompatibilities raised before any signer exists.
    pub fn is_compatibility(&self) -> bool {
        matches!(
            self.root(),
            KeyringError::NetworkMismatch(_)
                | KeyringError::Slip44Mismatch { .. }
                | KeyringError::ChainKindMismatch { .. }
                | KeyringError::UnknownCoin { .. }
        )
    }

    /// Errors coming from a hardware capability object.
    pub fn is_device(&self) -> bool {
        matches!(self.root(), KeyringError::Device(_) | KeyringError::HardwareNotConnected(_))
    }
}

impl From<serde_json::Error> for KeyringError {
    fn from(err: serde_json::Error) -> Self {
        KeyringError::Serialization(err.to_string())
    }
}

impl From<bitcoin::bip32::Error> for KeyringError {
    fn from(err: bitcoin::bip32::Error) -> Self {
        KeyringError::InvalidKey(err.to_string())
    }
}
