//! Account and network records shared with the host application.
//!
//! The host owns these collections; the core reads them through the vault accessor and only
//! writes back fields it derives itself (addresses, xpubs, encrypted account keys).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Variant tag of an account. Ids are unique per kind, not globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Hd,
    Imported,
    Trezor,
    Ledger,
}

impl AccountKind {
    pub fn is_hardware(self) -> bool {
        matches!(self, AccountKind::Trezor | AccountKind::Ledger)
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountKind::Hd => "hd",
            AccountKind::Imported => "imported",
            AccountKind::Trezor => "trezor",
            AccountKind::Ledger => "ledger",
        };
        f.write_str(s)
    }
}

/// Account backed by key material the core can decrypt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareAccount {
    pub id: u32,
    pub label: String,
    /// Canonical receiving address for the active network.
    pub address: String,
    pub xpub: String,
    /// Account private key (extended key on UTXO, raw hex key on EVM) encrypted under the
    /// session password hash.
    pub encrypted_xprv: String,
}

/// Account whose keys live on a device. There is deliberately no private key field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareAccount {
    pub id: u32,
    pub label: String,
    pub address: String,
    pub xpub: String,
    /// Hex encoded master key fingerprint reported by the device.
    pub master_fingerprint: String,
    /// Account-level derivation path the xpub was read from.
    pub origin_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Account {
    Hd(SoftwareAccount),
    Imported(SoftwareAccount),
    Trezor(HardwareAccount),
    Ledger(HardwareAccount),
}

impl Account {
    pub fn kind(&self) -> AccountKind {
        match self {
            Account::Hd(_) => AccountKind::Hd,
            Account::Imported(_) => AccountKind::Imported,
            Account::Trezor(_) => AccountKind::Trezor,
            Account::Ledger(_) => AccountKind::Ledger,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            Account::Hd(a) | Account::Imported(a) => a.id,
            Account::Trezor(a) | Account::Ledger(a) => a.id,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Account::Hd(a) | Account::Imported(a) => &a.label,
            Account::Trezor(a) | Account::Ledger(a) => &a.label,
        }
    }

    pub fn address(&self) -> &str {
        match self {
            Account::Hd(a) | Account::Imported(a) => &a.address,
            Account::Trezor(a) | Account::Ledger(a) => &a.address,
        }
    }

    pub fn xpub(&self) -> &str {
        match self {
            Account::Hd(a) | Account::Imported(a) => &a.xpub,
            Account::Trezor(a) | Account::Ledger(a) => &a.xpub,
        }
    }

    /// Public view without the encrypted key; what the core hands back to callers.
    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id(),
            kind: self.kind(),
            label: self.label().to_string(),
            address: self.address().to_string(),
            xpub: self.xpub().to_string(),
        }
    }
}

/// Account-shaped record returned by create/import/switch operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: u32,
    pub kind: AccountKind,
    pub label: String,
    pub address: String,
    pub xpub: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveAccount {
    pub id: u32,
    pub kind: AccountKind,
}

impl fmt::Display for ActiveAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Chain family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Utxo,
    Evm,
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKind::Utxo => f.write_str("UTXO"),
            ChainKind::Evm => f.write_str("EVM"),
        }
    }
}

/// A chain the wallet can be pointed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub chain_id: u64,
    /// SLIP-44 coin type.
    pub slip44: u32,
    pub kind: ChainKind,
    pub url: String,
    pub label: String,
    /// Currency symbol, used with `slip44` to look the coin up in the registry.
    pub currency: String,
    pub is_testnet: bool,
}

impl Network {
    pub fn syscoin_mainnet() -> Self {
        Self {
            chain_id: 57,
            slip44: 57,
            kind: ChainKind::Utxo,
            url: "https://blockbook.elint.services".to_string(),
            label: "Syscoin Mainnet".to_string(),
            currency: "sys".to_string(),
            is_testnet: false,
        }
    }

    pub fn syscoin_testnet() -> Self {
        Self {
            chain_id: 5700,
            slip44: 1,
            kind: ChainKind::Utxo,
            url: "https://explorer-blockbook-dev.syscoin.org".to_string(),
            label: "Syscoin Testnet".to_string(),
            currency: "tsys".to_string(),
            is_testnet: true,
        }
    }

    pub fn bitcoin_mainnet() -> Self {
        Self {
            chain_id: 0,
            slip44: 0,
            kind: ChainKind::Utxo,
            url: "https://btc1.trezor.io".to_string(),
            label: "Bitcoin".to_string(),
            currency: "btc".to_string(),
            is_testnet: false,
        }
    }

    pub fn ethereum_mainnet() -> Self {
        Self {
            chain_id: 1,
            slip44: 60,
            kind: ChainKind::Evm,
            url: "https://eth.llamarpc.com".to_string(),
            label: "Ethereum Mainnet".to_string(),
            currency: "eth".to_string(),
            is_testnet: false,
        }
    }

    pub fn sepolia() -> Self {
        Self {
            chain_id: 11155111,
            slip44: 60,
            kind: ChainKind::Evm,
            url: "https://rpc.sepolia.org".to_string(),
            label: "Sepolia Testnet".to_string(),
            currency: "eth".to_string(),
            is_testnet: true,
        }
    }

    pub fn polygon() -> Self {
        Self {
            chain_id: 137,
            slip44: 60,
            kind: ChainKind::Evm,
            url: "https://polygon-rpc.com".to_string(),
            label: "Polygon".to_string(),
            currency: "matic".to_string(),
            is_testnet: false,
        }
    }

    /// Built-in presets by short name, used by the CLI.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "sys" | "syscoin" => Some(Self::syscoin_mainnet()),
            "tsys" | "syscoin-testnet" => Some(Self::syscoin_testnet()),
            "btc" | "bitcoin" => Some(Self::bitcoin_mainnet()),
            "eth" | "ethereum" => Some(Self::ethereum_mainnet()),
            "sepolia" => Some(Self::sepolia()),
            "polygon" => Some(Self::polygon()),
            _ => None,
        }
    }
}

/// Host-owned wallet state the core reads per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    pub accounts: BTreeMap<AccountKind, BTreeMap<u32, Account>>,
    pub active_account: ActiveAccount,
    pub active_network: Network,
    pub networks: BTreeMap<ChainKind, BTreeMap<u64, Network>>,
    /// Seed phrase encrypted under the raw password; read back on unlock.
    pub encrypted_mnemonic: Option<String>,
}

impl VaultState {
    /// Empty vault pointed at `network`, with every built-in network registered.
    pub fn new(network: Network) -> Self {
        let mut networks: BTreeMap<ChainKind, BTreeMap<u64, Network>> = BTreeMap::new();
        for preset in [
            Network::syscoin_mainnet(),
            Network::syscoin_testnet(),
            Network::bitcoin_mainnet(),
            Network::ethereum_mainnet(),
            Network::sepolia(),
            Network::polygon(),
        ] {
            networks.entry(preset.kind).or_default().insert(preset.chain_id, preset);
        }
        networks.entry(network.kind).or_default().insert(network.chain_id, network.clone());

        Self {
            accounts: BTreeMap::new(),
            active_account: ActiveAccount { id: 0, kind: AccountKind::Hd },
            active_network: network,
            networks,
            encrypted_mnemonic: None,
        }
    }

    pub fn account(&self, kind: AccountKind, id: u32) -> Option<&Account> {
        self.accounts.get(&kind).and_then(|m| m.get(&id))
    }

    pub fn accounts_of(&self, kind: AccountKind) -> impl Iterator<Item = &Account> {
        self.accounts.get(&kind).into_iter().flat_map(|m| m.values())
    }

    pub fn insert_account(&mut self, account: Account) {
        self.accounts.entry(account.kind()).or_default().insert(account.id(), account);
    }

    pub fn remove_account(&mut self, kind: AccountKind, id: u32) -> Option<Account> {
        self.accounts.get_mut(&kind).and_then(|m| m.remove(&id))
    }

    /// Smallest unused id in the `kind` namespace.
    pub fn next_account_id(&self, kind: AccountKind) -> u32 {
        let used = self.accounts.get(&kind);
        (0u32..)
            .find(|id| used.map_or(true, |m| !m.contains_key(id)))
            .unwrap_or(0)
    }

    /// True if any account of any kind already uses `address` (case-insensitive).
    pub fn has_address(&self, address: &str) -> bool {
        self.accounts
            .values()
            .flat_map(|m| m.values())
            .any(|a| a.address().eq_ignore_ascii_case(address))
    }
}
