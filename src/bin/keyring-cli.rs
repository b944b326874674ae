use anyhow::Context;
use clap::Parser;
use multichain_keyring::cli::{resolve_network, Cli, Commands, MNEMONIC_ENV};
use multichain_keyring::core::bip44::DerivationPathResolver;
use multichain_keyring::core::domain::VaultState;
use multichain_keyring::core::registry::{BuiltinRegistry, CoinRegistry};
use multichain_keyring::core::validation::validate_zprv;
use multichain_keyring::core::vault::MemoryVault;
use multichain_keyring::core::KeyringManager;
use multichain_keyring::security::encryption::generate_salt;
use multichain_keyring::storage::MemoryStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.load_config().context("loading configuration")?;

    match cli.command {
        Commands::Paths { network, account, change, index } => {
            let network = resolve_network(&network)?;
            let coin = BuiltinRegistry.for_network(&network)?;
            println!("purpose: {}", DerivationPathResolver::bip_standard(&coin));
            println!("account: {}", DerivationPathResolver::account_path(&coin, account));
            println!("address: {}", DerivationPathResolver::address_path(&coin, account, change, index));
        }
        Commands::ValidateKey { network, key } => {
            let network = resolve_network(&network)?;
            let outcome = validate_zprv(key.trim(), &network, &BuiltinRegistry);
            tracing::info!(network = %network.label, valid = outcome.is_valid, "extended key checked");
            if !outcome.is_valid {
                anyhow::bail!("rejected: {}", outcome.message);
            }
            println!("{}", outcome.message);
        }
        Commands::Derive { network, account } => {
            let network = resolve_network(&network)?;
            let mnemonic = Zeroizing::new(
                std::env::var(MNEMONIC_ENV).with_context(|| format!("{} is not set", MNEMONIC_ENV))?,
            );

            // throwaway session over in-memory collaborators
            let vault = MemoryVault::with_state(VaultState::new(network));
            let manager = KeyringManager::new(config, Arc::new(vault), Arc::new(MemoryStore::new()));
            let password = Zeroizing::new(generate_salt(32));
            manager
                .initialize_session(mnemonic.trim(), &password)
                .await
                .context("initializing session")?;

            let mut summary = manager.add_new_account(None).await?;
            while summary.id < account {
                summary = manager.add_new_account(None).await?;
            }
            manager.lock_wallet();

            println!("account: {}", summary.id);
            println!("address: {}", summary.address);
            println!("xpub:    {}", summary.xpub);
        }
    }
    Ok(())
}
