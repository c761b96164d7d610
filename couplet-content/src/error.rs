//! Content service error types.

use thiserror::Error;

/// Result type for content operations.
pub type ContentResult<T> = Result<T, ContentError>;

/// Errors that can occur when encrypting or decrypting content.
#[derive(Debug, Error)]
pub enum ContentError {
    /// No key is present for the couple. A valid, expected state — the
    /// caller decides whether to fall back to plaintext or block.
    #[error("encryption unavailable: no key for couple {0}")]
    EncryptionUnavailable(String),

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] couplet_crypto::CryptoError),

    #[error("key error: {0}")]
    Keys(#[from] couplet_keys::KeyError),

    #[error("store error: {0}")]
    Store(#[from] couplet_store::StoreError),
}
