//! Secret handling: clearable buffers and passphrase encryption.

pub mod encryption;
pub mod secret;

pub use encryption::{AesGcmCipher, SymmetricCipher};
pub use secret::{SecretBuffer, SecretVec};
