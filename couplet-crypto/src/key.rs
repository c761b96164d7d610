//! Symmetric key material and Argon2id derivation.

use crate::error::{CryptoError, CryptoResult};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key length in bytes (256-bit security level).
pub const KEY_SIZE: usize = 32;

/// Argon2id salt length in bytes.
pub const SALT_SIZE: usize = 16;

/// A 256-bit symmetric key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Reconstructs a key from a byte slice, rejecting wrong lengths.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey([redacted])")
    }
}

/// Argon2id salt, carried alongside any ciphertext produced from a
/// password-derived key. Serializes as base64.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }

    pub fn to_b64(&self) -> String {
        B64.encode(self.0)
    }

    pub fn from_b64(encoded: &str) -> CryptoResult<Self> {
        let bytes = B64
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidEnvelope(format!("bad salt encoding: {e}")))?;
        if bytes.len() != SALT_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: SALT_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; SALT_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl Serialize for Salt {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_b64())
    }
}

impl<'de> Deserialize<'de> for Salt {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Salt::from_b64(&s).map_err(serde::de::Error::custom)
    }
}

/// Argon2id cost parameters. Defined once here and audited once; every
/// password-derived key in the system uses the same profile.
#[derive(Clone, Copy, Debug)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Parallelism lanes.
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

/// Generates a fresh random symmetric key.
///
/// CSPRNG absence is a fatal environment error, so this is infallible.
pub fn generate_key() -> SymmetricKey {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    SymmetricKey::from_bytes(bytes)
}

/// Derives a 256-bit key from a password and salt using Argon2id.
///
/// Deterministic: the same password, salt, and params always produce the
/// same key. The salt must be persisted alongside any resulting ciphertext.
pub fn derive_key(password: &str, salt: &Salt, params: &KdfParams) -> CryptoResult<SymmetricKey> {
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut out = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut out)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(SymmetricKey::from_bytes(out))
}

/// Derives a key from a password, minting a fresh salt when none is given.
///
/// Returns the salt used either way — the caller must persist it, since the
/// identical salt is required to re-derive the same key later.
pub fn derive_password_key(
    password: &str,
    salt: Option<Salt>,
) -> CryptoResult<(SymmetricKey, Salt)> {
    let salt = salt.unwrap_or_else(Salt::random);
    let key = derive_key(password, &salt, &KdfParams::default())?;
    Ok((key, salt))
}
