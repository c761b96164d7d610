//! Key lifecycle error types.

use thiserror::Error;

/// Result type for key operations.
pub type KeyResult<T> = Result<T, KeyError>;

/// Errors that can occur in key lifecycle operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keys were never initialized for couple {0}")]
    NotInitialized(String),

    #[error("key material unavailable in this session for couple {0}")]
    KeysUnavailable(String),

    #[error("invalid key backup: {0}")]
    InvalidBackup(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] couplet_crypto::CryptoError),

    #[error("metadata store error: {0}")]
    Store(#[from] couplet_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
