//! Encrypted content service for the Couplet core.
//!
//! Sits between the UI collaborator and the entry store: bodies and media
//! metadata are encrypted before persistence and decrypted transiently for
//! display. Encryption must succeed before anything is persisted — there is
//! no optimistic plaintext write. Bulk reads and the rotation sweep tolerate
//! partial failure by design; a single bad record never hides the rest.

mod error;
mod service;

pub use error::{ContentError, ContentResult};
pub use service::{EntryUpdate, SecureContentService, SweepFailure, SweepReport};
