//! PSBT helpers used by the UTXO signing router.

use crate::core::errors::{KeyringError, Result};
use crate::hardware::InputSignature;
use bitcoin::bip32::{DerivationPath, Fingerprint};
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::PublicKey;
use std::str::FromStr;

/// Parse a PSBT from base64.
pub fn from_base64(encoded: &str) -> Result<Psbt> {
    Psbt::from_str(encoded).map_err(|e| KeyringError::InvalidTransaction(format!("invalid PSBT: {}", e)))
}

pub fn to_base64(psbt: &Psbt) -> String {
    psbt.to_string()
}

pub fn from_bytes(bytes: &[u8]) -> Result<Psbt> {
    Psbt::deserialize(bytes).map_err(|e| KeyringError::InvalidTransaction(format!("invalid PSBT: {}", e)))
}

/// Record which key signs `input_index`: master fingerprint, full path and public key.
pub fn add_input_derivation(
    psbt: &mut Psbt,
    input_index: usize,
    public_key: PublicKey,
    fingerprint: Fingerprint,
    path: DerivationPath,
) -> Result<()> {
    let input_count = psbt.inputs.len();
    let input = psbt.inputs.get_mut(input_index).ok_or_else(|| {
        KeyringError::InvalidTransaction(format!(
            "input {} out of range ({} inputs)",
            input_index, input_count
        ))
    })?;
    input.bip32_derivation.insert(public_key, (fingerprint, path));
    Ok(())
}

/// Attach device-produced signatures as partial signatures.
pub fn apply_signatures(psbt: &mut Psbt, signatures: Vec<InputSignature>) -> Result<()> {
    for sig in signatures {
        let input_count = psbt.inputs.len();
        let input = psbt.inputs.get_mut(sig.input_index).ok_or_else(|| {
            KeyringError::SigningFailed(format!(
                "device returned signature for input {} but PSBT has {} inputs",
                sig.input_index, input_count
            ))
        })?;
        input.partial_sigs.insert(sig.public_key, sig.signature);
    }
    Ok(())
}

/// Inputs in `expected` that still have no partial signature.
pub fn unsigned_inputs(psbt: &Psbt, expected: impl IntoIterator<Item = usize>) -> Vec<usize> {
    expected
        .into_iter()
        .filter(|i| psbt.inputs.get(*i).map_or(true, |input| input.partial_sigs.is_empty()))
        .collect()
}
