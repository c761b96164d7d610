//! Key lifecycle layer for the Couplet core.
//!
//! `SessionKeyStore` is the single in-memory home of raw key material,
//! scoped to the browsing session. `KeyManager` drives the per-couple
//! lifecycle on top of it: initialization (derived or random), fetch by
//! purpose, rotation with explicit old/new handles, password-wrapped backup
//! export/import, and erasure.

mod error;
mod manager;
mod store;

pub use error::{KeyError, KeyResult};
pub use manager::{ALGORITHM, KeyManager, KeyRotation, PurposeKeySet};
pub use store::SessionKeyStore;
