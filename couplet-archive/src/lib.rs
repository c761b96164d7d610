//! Breakup mode for the Couplet core.
//!
//! Orchestrates the terminal relationship-data flow: optional export,
//! optional encrypted archival with a time-boxed recovery window, access
//! restriction or deletion, optional irreversible key erasure, and the
//! recovery / permanent-deletion paths. The archive password is generated
//! fresh per archive, cached only ephemerally, and optionally persisted
//! encrypted under a deterministic archive-id-scoped recovery key.

mod error;
mod service;
mod session;

pub use error::{ArchiveError, ArchiveResult};
pub use service::{
    ArchivalService, ArchiveConfig, BreakupOptions, BreakupOutcome, RecoveryOutcome,
};
pub use session::{SessionCache, password_cache_key};
