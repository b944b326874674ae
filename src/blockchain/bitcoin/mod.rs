//! UTXO chain plumbing
//!
//! - address encoding from registry parameters (P2WPKH with a coin hrp, P2PKH)
//! - extended key (de)serialization with coin-specific version bytes
//! - PSBT derivation metadata and signature assembly

pub mod address;
pub mod extended_key;
pub mod psbt;

pub use address::{AddressType, UtxoAddress};
