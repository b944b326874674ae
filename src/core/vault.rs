//! Vault accessor port.
//!
//! The host owns accounts and networks. The keyring fetches a snapshot on every call and writes
//! back whole snapshots when it changes derived fields; nothing is cached between calls.

use crate::core::domain::{Account, VaultState};
use crate::core::errors::{KeyringError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

#[async_trait]
pub trait VaultAccessor: Send + Sync {
    /// Current snapshot. Fails `VaultNotConfigured` before the host has provided any state.
    async fn get_vault(&self) -> Result<VaultState>;

    async fn set_vault(&self, vault: VaultState) -> Result<()>;
}

/// Checks required sub-fields; an incomplete vault is a host bug.
pub fn ensure_complete(vault: &VaultState) -> Result<()> {
    if vault.active_network.url.is_empty() {
        return Err(KeyringError::IncompleteVault("active network has no endpoint url".to_string()));
    }
    let registered = vault
        .networks
        .get(&vault.active_network.kind)
        .map_or(false, |m| m.contains_key(&vault.active_network.chain_id));
    if !registered {
        return Err(KeyringError::IncompleteVault(format!(
            "active network {} is not registered",
            vault.active_network.chain_id
        )));
    }
    Ok(())
}

/// Active account record; fails `AccountNotFound` if the descriptor points nowhere.
pub fn active_account(vault: &VaultState) -> Result<&Account> {
    let active = vault.active_account;
    vault
        .account(active.kind, active.id)
        .ok_or(KeyringError::AccountNotFound { kind: active.kind, id: active.id })
}

/// In-memory accessor.
#[derive(Clone, Default)]
pub struct MemoryVault {
    state: Arc<Mutex<Option<VaultState>>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: VaultState) -> Self {
        Self { state: Arc::new(Mutex::new(Some(state))) }
    }
}

#[async_trait]
impl VaultAccessor for MemoryVault {
    async fn get_vault(&self) -> Result<VaultState> {
        let guard = self.state.lock().await;
        let vault = guard
            .clone()
            .ok_or_else(|| KeyringError::VaultNotConfigured("no vault state has been set".to_string()))?;
        ensure_complete(&vault)?;
        Ok(vault)
    }

    async fn set_vault(&self, vault: VaultState) -> Result<()> {
        let mut guard = self.state.lock().await;
        *guard = Some(vault);
        Ok(())
    }
}
