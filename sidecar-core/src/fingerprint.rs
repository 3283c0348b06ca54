/*!
Base save fingerprinting.

A fingerprint is the lowercase hex SHA-256 of the base save's decrypted bytes.
It changes exactly when the logical content of the base save changes, which is
what decides whether a custom store still belongs to the loaded base save.
*/

use crate::error::BoxError;
use crate::{Result, SidecarError};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// The host's decryption transform for its own save format
///
/// Opaque to this crate: it only has to turn the raw base save bytes into the
/// plaintext that gets hashed.
#[cfg_attr(test, mockall::automock)]
pub trait SaveDecryptor: Send + Sync {
    fn decrypt(&self, bytes: &[u8]) -> std::result::Result<Vec<u8>, BoxError>;
}

/// Decryptor for base saves stored in plaintext
#[derive(Debug, Clone, Default)]
pub struct PlaintextDecryptor;

impl SaveDecryptor for PlaintextDecryptor {
    fn decrypt(&self, bytes: &[u8]) -> std::result::Result<Vec<u8>, BoxError> {
        Ok(bytes.to_vec())
    }
}

/// Derives and compares base save fingerprints
#[derive(Clone)]
pub struct FingerprintValidator {
    decryptor: Arc<dyn SaveDecryptor>,
}

impl FingerprintValidator {
    pub fn new<D: SaveDecryptor + 'static>(decryptor: D) -> Self {
        Self {
            decryptor: Arc::new(decryptor),
        }
    }

    pub fn from_shared(decryptor: Arc<dyn SaveDecryptor>) -> Self {
        Self { decryptor }
    }

    /// Fingerprint the base save at `base_save_path`
    ///
    /// # Errors
    /// * `SidecarError::BaseSaveUnavailable` - If the file cannot be read or decrypted
    pub fn fingerprint_of(&self, base_save_path: &Path) -> Result<String> {
        let raw = fs::read(base_save_path).map_err(|e| {
            SidecarError::base_save_unavailable(base_save_path, format!("read failed: {e}"))
        })?;
        let plain = self.decryptor.decrypt(&raw).map_err(|e| {
            SidecarError::base_save_unavailable(base_save_path, format!("decrypt failed: {e}"))
        })?;
        Ok(Self::compute_hash(&plain))
    }

    /// Compare `stored_fingerprint` with the base save's current fingerprint
    ///
    /// # Errors
    /// * `SidecarError::BaseSaveUnavailable` - If the base save cannot be fingerprinted
    pub fn verify(&self, stored_fingerprint: &str, base_save_path: &Path) -> Result<bool> {
        Ok(self.fingerprint_of(base_save_path)? == stored_fingerprint)
    }

    /// True iff the base save currently hashes to `stored_fingerprint`
    ///
    /// An unreadable base save never matches.
    pub fn matches(&self, stored_fingerprint: &str, base_save_path: &Path) -> bool {
        match self.verify(stored_fingerprint, base_save_path) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot fingerprint base save; treating as mismatch");
                false
            }
        }
    }

    /// Lowercase hex SHA-256 of `data`
    pub fn compute_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }
}

impl Default for FingerprintValidator {
    fn default() -> Self {
        Self::new(PlaintextDecryptor)
    }
}

impl std::fmt::Debug for FingerprintValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintValidator").finish_non_exhaustive()
    }
}
