//! Archival error types.

use thiserror::Error;

/// Result type for archival operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors that can occur in breakup-mode flows.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive not found: {0}")]
    NotFound(String),

    /// The recovery window has lapsed or recovery was never allowed.
    #[error("archive recovery expired or disallowed")]
    RecoveryExpired,

    /// No archive password available from the argument or session cache.
    #[error("archive password required")]
    PasswordRequired,

    #[error("archive payload corrupted: checksum mismatch")]
    ChecksumMismatch,

    #[error("export error: {0}")]
    Export(#[from] couplet_export::ExportError),

    #[error("key error: {0}")]
    Keys(#[from] couplet_keys::KeyError),

    #[error("crypto error: {0}")]
    Crypto(#[from] couplet_crypto::CryptoError),

    #[error("store error: {0}")]
    Store(#[from] couplet_store::StoreError),
}
