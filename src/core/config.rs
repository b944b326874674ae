use crate::core::errors::{KeyringError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Env var overriding `security.pbkdf2_iterations`.
pub const ENV_PBKDF2_ITERATIONS: &str = "KEYRING_PBKDF2_ITERATIONS";

const MIN_SALT_LENGTH: usize = 16;

/// Security configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// PBKDF2 iteration count for passphrase encryption
    #[serde(default = "SecurityConfig::default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,

    /// Password salt length in bytes
    #[serde(default = "SecurityConfig::default_salt_length")]
    pub salt_length: usize,
}

impl SecurityConfig {
    fn default_pbkdf2_iterations() -> u32 { DEFAULT_PBKDF2_ITERATIONS }
    fn default_salt_length() -> usize { 32 }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: Self::default_pbkdf2_iterations(),
            salt_length: Self::default_salt_length(),
        }
    }
}

/// Keys used in persisted storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageKeys {
    #[serde(default = "StorageKeys::default_vault_keys")]
    pub vault_keys: String,

    #[serde(default = "StorageKeys::default_utf8_error")]
    pub utf8_error: String,
}

impl StorageKeys {
    fn default_vault_keys() -> String { "vault-keys".to_string() }
    fn default_utf8_error() -> String { "utf8Error".to_string() }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            vault_keys: Self::default_vault_keys(),
            utf8_error: Self::default_utf8_error(),
        }
    }
}

/// Keyring configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyringConfig {
    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub storage_keys: StorageKeys,
}

impl KeyringConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: KeyringConfig =
            toml::from_str(input).map_err(|e| KeyringError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| KeyringError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// Apply environment overrides on top of file/default values.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(raw) = std::env::var(ENV_PBKDF2_ITERATIONS) {
            self.security.pbkdf2_iterations = raw.trim().parse().map_err(|_| {
                KeyringError::Config(format!("{} must be a positive integer", ENV_PBKDF2_ITERATIONS))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.security.pbkdf2_iterations == 0 {
            return Err(KeyringError::Config("pbkdf2_iterations must be greater than zero".to_string()));
        }
        if self.security.salt_length < MIN_SALT_LENGTH {
            return Err(KeyringError::Config(format!(
                "salt_length must be at least {} bytes",
                MIN_SALT_LENGTH
            )));
        }
        if self.storage_keys.vault_keys.is_empty() || self.storage_keys.utf8_error.is_empty() {
            return Err(KeyringError::Config("storage keys must not be empty".to_string()));
        }
        Ok(())
    }
}
