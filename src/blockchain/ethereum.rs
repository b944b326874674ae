//! EVM transaction plumbing: request parsing, local signing and signature assembly.

use crate::core::errors::{KeyringError, Result};
use ethers::core::k256::ecdsa::SigningKey;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Bytes, Eip1559TransactionRequest, NameOrAddress, Signature, TransactionRequest, U256,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;
use zeroize::Zeroizing;

/// Fee model of an EVM transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EvmFee {
    Legacy { gas_price: U256 },
    Eip1559 { max_fee_per_gas: U256, max_priority_fee_per_gas: U256 },
}

/// Unsigned EVM transaction as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmTransactionRequest {
    /// Address the caller believes is signing.
    pub from: String,
    /// `None` for contract creation.
    pub to: Option<String>,
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
    pub nonce: U256,
    pub gas: U256,
    pub fee: EvmFee,
    pub chain_id: u64,
}

impl EvmTransactionRequest {
    pub fn to_typed_transaction(&self) -> Result<TypedTransaction> {
        let from = parse_address(&self.from)?;
        let to = self.to.as_deref().map(parse_address).transpose()?;

        let tx: TypedTransaction = match &self.fee {
            EvmFee::Legacy { gas_price } => {
                let mut req = TransactionRequest::new()
                    .from(from)
                    .value(self.value)
                    .data(self.data.clone())
                    .nonce(self.nonce)
                    .gas(self.gas)
                    .gas_price(*gas_price)
                    .chain_id(self.chain_id);
                if let Some(to) = to {
                    req = req.to(NameOrAddress::Address(to));
                }
                req.into()
            }
            EvmFee::Eip1559 { max_fee_per_gas, max_priority_fee_per_gas } => {
                let mut req = Eip1559TransactionRequest::new()
                    .from(from)
                    .value(self.value)
                    .data(self.data.clone())
                    .nonce(self.nonce)
                    .gas(self.gas)
                    .max_fee_per_gas(*max_fee_per_gas)
                    .max_priority_fee_per_gas(*max_priority_fee_per_gas)
                    .chain_id(self.chain_id);
                if let Some(to) = to {
                    req = req.to(NameOrAddress::Address(to));
                }
                req.into()
            }
        };
        Ok(tx)
    }
}

pub fn parse_address(input: &str) -> Result<Address> {
    Address::from_str(input)
        .map_err(|e| KeyringError::InvalidTransaction(format!("invalid address '{}': {}", input, e)))
}

/// EIP-55 checksummed form.
pub fn checksum_address(address: &Address) -> String {
    ethers::utils::to_checksum(address, None)
}

/// Local signer from a raw 32-byte secret key.
pub fn local_wallet(secret: &[u8], chain_id: u64) -> Result<LocalWallet> {
    let secret_key = k256::SecretKey::from_slice(secret)
        .map_err(|e| KeyringError::InvalidKey(format!("invalid secp256k1 secret key: {}", e)))?;
    let signing_key = SigningKey::from(secret_key);
    Ok(LocalWallet::from(signing_key).with_chain_id(chain_id))
}

pub fn address_of_secret(secret: &[u8]) -> Result<String> {
    let wallet = local_wallet(secret, 1)?;
    Ok(checksum_address(&wallet.address()))
}

/// Sign `tx` locally and return the signed RLP payload.
pub fn sign_locally(wallet: &LocalWallet, tx: &TypedTransaction) -> Result<Bytes> {
    let signature = wallet
        .sign_transaction_sync(tx)
        .map_err(|e| KeyringError::SigningFailed(format!("local signing failed: {}", e)))?;
    debug!(chain_id = wallet.chain_id(), "transaction signed locally");
    Ok(tx.rlp_signed(&signature))
}

/// Put a device `v` into EIP-155 form: accepts `0/1`, `27/28` or an already EIP-155 value.
pub fn normalize_device_v(v: u64, chain_id: u64) -> Result<u64> {
    let parity = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        _ => return Ok(v),
    };
    chain_id
        .checked_mul(2)
        .and_then(|base| base.checked_add(35 + parity))
        .ok_or_else(|| KeyringError::SigningFailed(format!("chain id {} out of EIP-155 range", chain_id)))
}

/// Attach externally produced signature components to `tx`.
pub fn assemble_signed(tx: &TypedTransaction, v: u64, r: &[u8; 32], s: &[u8; 32], chain_id: u64) -> Result<Bytes> {
    let signature = Signature {
        r: U256::from_big_endian(r),
        s: U256::from_big_endian(s),
        v: normalize_device_v(v, chain_id)?,
    };
    Ok(tx.rlp_signed(&signature))
}

/// EIP-191 personal message signature, `r || s || v`.
pub async fn sign_personal_message(wallet: &LocalWallet, message: &[u8]) -> Result<Vec<u8>> {
    let signature = wallet
        .sign_message(message)
        .await
        .map_err(|e| KeyringError::SigningFailed(format!("message signing failed: {}", e)))?;
    Ok(signature.to_vec())
}

/// Zeroizing copy of a hex-encoded secret key, `0x` prefix optional.
pub fn decode_hex_secret(input: &str) -> Result<Zeroizing<Vec<u8>>> {
    let trimmed = input.trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = Zeroizing::new(
        hex::decode(stripped).map_err(|_| KeyringError::InvalidKey("private key is not hex".to_string()))?,
    );
    if bytes.len() != 32 {
        return Err(KeyringError::InvalidKey(format!(
            "private key must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}
