//! Clearable secret holder.
//!
//! A `SecretBuffer` is either `Live` (holding bytes) or `Cleared`. Reads hand out a copy that
//! zeroizes itself on drop; once cleared, every read fails with `SecretUnavailable`. Clearing
//! overwrites the storage with random bytes, then zeroes it, then releases it.

use crate::core::errors::{KeyringError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

/// Secret byte copy which is zeroed when dropped.
pub type SecretVec = Zeroizing<Vec<u8>>;

enum BufferState {
    Live(Vec<u8>),
    Cleared,
}

pub struct SecretBuffer {
    state: BufferState,
}

impl SecretBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { state: BufferState::Live(bytes) }
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(text.as_bytes().to_vec())
    }

    /// Copy of the stored bytes.
    pub fn read(&self) -> Result<SecretVec> {
        match &self.state {
            BufferState::Live(bytes) => Ok(Zeroizing::new(bytes.clone())),
            BufferState::Cleared => Err(KeyringError::SecretUnavailable),
        }
    }

    /// Copy of the stored bytes as UTF-8 text.
    pub fn read_string(&self) -> Result<Zeroizing<String>> {
        let bytes = self.read()?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| KeyringError::MalformedEncoding(e.to_string()))?;
        Ok(Zeroizing::new(text.to_string()))
    }

    pub fn is_cleared(&self) -> bool {
        matches!(self.state, BufferState::Cleared)
    }

    /// Wipe and release the secret. Calling it again is a no-op.
    pub fn clear(&mut self) {
        if let BufferState::Live(bytes) = &mut self.state {
            OsRng.fill_bytes(bytes);
            bytes.zeroize();
        }
        self.state = BufferState::Cleared;
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_cleared() { "cleared" } else { "live" };
        f.debug_struct("SecretBuffer").field("state", &state).finish()
    }
}
