//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in the crypto layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The AEAD tag did not verify: wrong key, tampered ciphertext, or a
    /// corrupted nonce. Definitive — never retried with the same inputs.
    #[error("authentication failed (wrong key or tampered data)")]
    Authentication,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("invalid key length: expected {expected}, actual {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
}
