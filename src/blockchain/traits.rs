use async_trait::async_trait;

use crate::core::domain::Network;
use crate::core::errors::Result;

/// Hands a signed payload to the network.
///
/// EVM payloads are signed RLP transactions. UTXO payloads are serialized signed PSBTs; the
/// broadcaster finalizes and extracts the transaction.
#[async_trait]
pub trait TransactionBroadcaster: Send + Sync {
    /// Returns the transaction id reported by the endpoint.
    async fn broadcast(&self, network: &Network, payload: &[u8]) -> Result<String>;
}
