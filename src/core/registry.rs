//! Coin / network registry
//!
//! Maps a SLIP-44 coin type and currency symbol to the magic numbers needed for derivation and
//! encoding: extended-key version bytes, address prefixes, SegWit support and curve.

use crate::core::domain::{ChainKind, Network};
use crate::core::errors::{KeyringError, Result};

/// Four-byte extended key version prefixes for one derivation scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionBytes {
    pub public: [u8; 4],
    pub private: [u8; 4],
}

impl VersionBytes {
    pub const fn new(public: u32, private: u32) -> Self {
        Self { public: public.to_be_bytes(), private: private.to_be_bytes() }
    }
}

/// Standard BIP32 mainnet versions (`xpub`/`xprv`).
pub const XPUB_XPRV: VersionBytes = VersionBytes::new(0x0488_b21e, 0x0488_ade4);
/// Standard BIP32 testnet versions (`tpub`/`tprv`).
pub const TPUB_TPRV: VersionBytes = VersionBytes::new(0x0435_87cf, 0x0435_8394);
/// BIP84 mainnet versions (`zpub`/`zprv`).
pub const ZPUB_ZPRV: VersionBytes = VersionBytes::new(0x04b2_4746, 0x04b2_430c);
/// BIP84 testnet versions (`vpub`/`vprv`).
pub const VPUB_VPRV: VersionBytes = VersionBytes::new(0x045f_1cf6, 0x045f_18bc);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    Secp256k1,
}

/// Registry entry for one coin on one network class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinParams {
    pub name: &'static str,
    pub symbol: &'static str,
    pub slip44: u32,
    pub kind: ChainKind,
    pub is_testnet: bool,
    pub segwit: bool,
    pub bech32_hrp: Option<&'static str>,
    pub pubkey_hash: u8,
    pub script_hash: u8,
    pub wif: u8,
    /// BIP44 extended key versions.
    pub bip32: VersionBytes,
    /// Native SegWit (BIP84) extended key versions, if the coin supports them.
    pub bip84: Option<VersionBytes>,
    pub curve: Curve,
}

impl CoinParams {
    /// Version bytes matching the purpose this coin derives under.
    pub fn account_versions(&self) -> VersionBytes {
        match (self.segwit, self.bip84) {
            (true, Some(v)) => v,
            _ => self.bip32,
        }
    }
}

/// Lookup port for coin parameters.
pub trait CoinRegistry: Send + Sync {
    fn lookup(&self, slip44: u32, symbol: &str) -> Option<CoinParams>;

    /// All entries whose private extended-key version equals `version`, in any scheme.
    fn by_private_version(&self, version: [u8; 4]) -> Vec<CoinParams>;

    /// Parameters for `network`, failing with `UnknownCoin` when the registry has no entry.
    fn for_network(&self, network: &Network) -> Result<CoinParams> {
        self.lookup(network.slip44, &network.currency).ok_or_else(|| KeyringError::UnknownCoin {
            slip44: network.slip44,
            symbol: network.currency.clone(),
        })
    }
}

const ETHEREUM: CoinParams = CoinParams {
    name: "Ethereum",
    symbol: "eth",
    slip44: 60,
    kind: ChainKind::Evm,
    is_testnet: false,
    segwit: false,
    bech32_hrp: None,
    pubkey_hash: 0,
    script_hash: 0,
    wif: 0x80,
    bip32: XPUB_XPRV,
    bip84: None,
    curve: Curve::Secp256k1,
};

const BUILTIN: &[CoinParams] = &[
    CoinParams {
        name: "Syscoin",
        symbol: "sys",
        slip44: 57,
        kind: ChainKind::Utxo,
        is_testnet: false,
        segwit: true,
        bech32_hrp: Some("sys"),
        pubkey_hash: 0x3f,
        script_hash: 0x05,
        wif: 0x80,
        bip32: XPUB_XPRV,
        bip84: Some(ZPUB_ZPRV),
        curve: Curve::Secp256k1,
    },
    CoinParams {
        name: "Syscoin Testnet",
        symbol: "tsys",
        slip44: 1,
        kind: ChainKind::Utxo,
        is_testnet: true,
        segwit: true,
        bech32_hrp: Some("tsys"),
        pubkey_hash: 0x41,
        script_hash: 0xc4,
        wif: 0xef,
        bip32: TPUB_TPRV,
        bip84: Some(VPUB_VPRV),
        curve: Curve::Secp256k1,
    },
    CoinParams {
        name: "Bitcoin",
        symbol: "btc",
        slip44: 0,
        kind: ChainKind::Utxo,
        is_testnet: false,
        segwit: true,
        bech32_hrp: Some("bc"),
        pubkey_hash: 0x00,
        script_hash: 0x05,
        wif: 0x80,
        bip32: XPUB_XPRV,
        bip84: Some(ZPUB_ZPRV),
        curve: Curve::Secp256k1,
    },
    CoinParams {
        name: "Bitcoin Testnet",
        symbol: "tbtc",
        slip44: 1,
        kind: ChainKind::Utxo,
        is_testnet: true,
        segwit: true,
        bech32_hrp: Some("tb"),
        pubkey_hash: 0x6f,
        script_hash: 0xc4,
        wif: 0xef,
        bip32: TPUB_TPRV,
        bip84: Some(VPUB_VPRV),
        curve: Curve::Secp256k1,
    },
    CoinParams {
        name: "Litecoin",
        symbol: "ltc",
        slip44: 2,
        kind: ChainKind::Utxo,
        is_testnet: false,
        segwit: true,
        bech32_hrp: Some("ltc"),
        pubkey_hash: 0x30,
        script_hash: 0x32,
        wif: 0xb0,
        bip32: VersionBytes::new(0x019d_a462, 0x019d_9cfe),
        bip84: Some(ZPUB_ZPRV),
        curve: Curve::Secp256k1,
    },
    CoinParams {
        name: "Dogecoin",
        symbol: "doge",
        slip44: 3,
        kind: ChainKind::Utxo,
        is_testnet: false,
        segwit: false,
        bech32_hrp: None,
        pubkey_hash: 0x1e,
        script_hash: 0x16,
        wif: 0x9e,
        bip32: VersionBytes::new(0x02fa_cafd, 0x02fa_c398),
        bip84: None,
        curve: Curve::Secp256k1,
    },
];

/// Registry backed by a static table.
#[derive(Debug, Clone, Default)]
pub struct BuiltinRegistry;

impl CoinRegistry for BuiltinRegistry {
    fn lookup(&self, slip44: u32, symbol: &str) -> Option<CoinParams> {
        // every EVM chain derives under coin type 60
        if slip44 == ETHEREUM.slip44 {
            return Some(ETHEREUM);
        }
        BUILTIN
            .iter()
            .find(|c| c.slip44 == slip44 && c.symbol.eq_ignore_ascii_case(symbol))
            .cloned()
    }

    fn by_private_version(&self, version: [u8; 4]) -> Vec<CoinParams> {
        BUILTIN
            .iter()
            .filter(|c| {
                c.bip32.private == version || c.bip84.map_or(false, |v| v.private == version)
            })
            .cloned()
            .collect()
    }
}
