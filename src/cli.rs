use crate::core::config::KeyringConfig;
use crate::core::domain::Network;
use crate::core::errors::{KeyringError, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Environment variable the `derive` command reads the mnemonic from.
pub const MNEMONIC_ENV: &str = "KEYRING_MNEMONIC";

/// Multi-chain keyring CLI (library-facing definitions)
#[derive(Debug, Parser)]
#[command(name = "keyring-cli", about = "Multi-chain keyring CLI", disable_help_subcommand = true)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the account and address paths used for a network.
    Paths {
        #[arg(long, default_value = "sys")]
        network: String,
        #[arg(long, default_value_t = 0)]
        account: u32,
        #[arg(long)]
        change: bool,
        #[arg(long, default_value_t = 0)]
        index: u32,
    },
    /// Check whether an extended private key can be imported on a network.
    ValidateKey {
        #[arg(long, default_value = "sys")]
        network: String,
        key: String,
    },
    /// Derive address and xpub of an HD account from the mnemonic in KEYRING_MNEMONIC.
    Derive {
        #[arg(long, default_value = "sys")]
        network: String,
        #[arg(long, default_value_t = 0)]
        account: u32,
    },
}

impl Cli {
    /// Defaults, overlaid with `--config` and then the environment.
    pub fn load_config(&self) -> Result<KeyringConfig> {
        let config = match &self.config {
            Some(path) => KeyringConfig::from_file(path)?,
            None => KeyringConfig::default(),
        };
        config.with_env_overrides()
    }
}

/// Built-in network by preset name.
pub fn resolve_network(name: &str) -> Result<Network> {
    Network::preset(name).ok_or_else(|| KeyringError::Config(format!("unknown network preset '{}'", name)))
}
