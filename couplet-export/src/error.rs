//! Export/import error types.

use thiserror::Error;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Errors that can occur assembling or importing an export bundle.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Caller input problem, surfaced directly to the UI.
    #[error("validation error: {0}")]
    Validation(String),

    /// The payload is encrypted and no password was supplied.
    #[error("password required to import this export")]
    PasswordRequired,

    /// The payload does not match the expected bundle structure. Nothing is
    /// partially imported.
    #[error("invalid export format: {0}")]
    InvalidFormat(String),

    #[error("checksum mismatch: export corrupted or tampered")]
    ChecksumMismatch,

    #[error("crypto error: {0}")]
    Crypto(#[from] couplet_crypto::CryptoError),

    #[error("key error: {0}")]
    Keys(#[from] couplet_keys::KeyError),

    #[error("store error: {0}")]
    Store(#[from] couplet_store::StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
