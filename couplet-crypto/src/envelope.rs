//! The self-describing ciphertext envelope and AEAD operations.
//!
//! ChaCha20-Poly1305 with a fresh random 96-bit nonce per call. The Poly1305
//! tag is appended to the ciphertext, so the envelope carries only
//! `ciphertext`, `iv`, and (for password-derived keys) the Argon2id salt.
//! All binary fields travel base64-encoded inside JSON — this is the wire
//! format persisted stores and export files must treat as an opaque blob.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{Salt, SymmetricKey};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// AEAD nonce length in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// A ciphertext envelope. Only ever decrypted with the exact key that
/// produced it; the nonce is unique per encryption call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(with = "b64_vec")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64_nonce")]
    pub iv: [u8; NONCE_SIZE],
    /// Present only when the key was password-derived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<Salt>,
}

impl Envelope {
    /// Attaches the KDF salt for password-derived flows.
    pub fn with_salt(mut self, salt: Salt) -> Self {
        self.salt = Some(salt);
        self
    }

    pub fn to_json(&self) -> CryptoResult<String> {
        serde_json::to_string(self).map_err(|e| CryptoError::InvalidEnvelope(e.to_string()))
    }

    pub fn from_json(data: &str) -> CryptoResult<Self> {
        serde_json::from_str(data).map_err(|e| CryptoError::InvalidEnvelope(e.to_string()))
    }

    /// Structural detection: does this JSON value look like an envelope?
    ///
    /// Import paths use this to distinguish encrypted payloads from plain
    /// JSON without attempting a decrypt.
    pub fn is_envelope_shaped(value: &serde_json::Value) -> bool {
        value
            .as_object()
            .is_some_and(|obj| obj.contains_key("ciphertext") && obj.contains_key("iv"))
    }
}

/// Encrypts plaintext under the given key with a fresh random nonce.
///
/// Encrypting the same plaintext twice yields different envelopes — the
/// nonce is never reused under a key.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> CryptoResult<Envelope> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut iv = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(Envelope {
        ciphertext,
        iv,
        salt: None,
    })
}

/// Decrypts an envelope, failing hard on any tag mismatch.
pub fn decrypt(key: &SymmetricKey, envelope: &Envelope) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(&envelope.iv), envelope.ciphertext.as_ref())
        .map_err(|_| CryptoError::Authentication)
}

/// Encrypts a UTF-8 string.
pub fn encrypt_string(key: &SymmetricKey, plaintext: &str) -> CryptoResult<Envelope> {
    encrypt(key, plaintext.as_bytes())
}

/// Decrypts an envelope into a UTF-8 string.
pub fn decrypt_string(key: &SymmetricKey, envelope: &Envelope) -> CryptoResult<String> {
    let bytes = decrypt(key, envelope)?;
    String::from_utf8(bytes)
        .map_err(|e| CryptoError::InvalidEnvelope(format!("plaintext not UTF-8: {e}")))
}

mod b64_vec {
    use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&B64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        B64.decode(s).map_err(serde::de::Error::custom)
    }
}

mod b64_nonce {
    use super::NONCE_SIZE;
    use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &[u8; NONCE_SIZE],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&B64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u8; NONCE_SIZE], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = B64.decode(s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("iv must be 12 bytes"))
    }
}
