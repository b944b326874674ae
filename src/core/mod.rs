pub mod bip44;
pub mod config;
pub mod domain;
pub mod errors;
pub mod keyring_manager;
pub mod registry;
pub mod validation;
pub mod vault;

// 重新导出关键结构
pub use errors::{KeyringError, Result};
pub use keyring_manager::KeyringManager;
