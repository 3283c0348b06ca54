/*!
Error types for the Sidecar core engine.
*/

use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the Sidecar core.
pub type Result<T> = std::result::Result<T, SidecarError>;

/// Boxed error returned by host-supplied collaborators (decryptors, callbacks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while registering values or moving the store to and from disk.
#[derive(Error, Debug)]
pub enum SidecarError {
    /// A value cell was registered twice under the same key
    #[error("A saved value with the same key already exists: {key}")]
    DuplicateKey { key: String },

    /// The base save could not be read or decrypted, so no fingerprint exists
    #[error("Base save unavailable at {}: {reason}", path.display())]
    BaseSaveUnavailable { path: PathBuf, reason: String },

    /// The custom store file is not a valid encoded record
    #[error("Malformed store: {0}")]
    MalformedStore(String),

    /// A stored entry could not be coerced into the registered cell's type
    #[error("Type mismatch for key '{key}' (expected {expected}): {reason}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        reason: String,
    },

    /// A value failed to serialize
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Storage adapter errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl SidecarError {
    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new malformed store error
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedStore(msg.into())
    }

    /// Create a new base save error for the given path
    pub fn base_save_unavailable<P, S>(path: P, reason: S) -> Self
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        Self::BaseSaveUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that concern the file system rather than the store contents
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::BaseSaveUnavailable { .. })
    }
}
