//! Encryption primitives for the Couplet core.
//!
//! The only place raw cryptographic operations occur — the AEAD mode, nonce
//! policy, and KDF cost factor are defined exactly once here:
//! - ChaCha20-Poly1305 for authenticated encryption
//! - Argon2id for key derivation from passwords
//! - SHA-256 for content checksums
//!
//! Higher layers (key management, content, export, archival) compose these
//! into lifecycle flows and never touch cipher APIs directly.

mod digest;
mod envelope;
mod error;
mod key;
mod password;

pub use digest::{checksum, checksum_hex};
pub use envelope::{
    Envelope, NONCE_SIZE, decrypt, decrypt_string, encrypt, encrypt_string,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{
    KEY_SIZE, KdfParams, SALT_SIZE, Salt, SymmetricKey, derive_key, derive_password_key,
    generate_key,
};
pub use password::{generate_password, shape_hint};
