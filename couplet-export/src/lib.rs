//! Export layer for the Couplet core.
//!
//! Assembles a portable snapshot of a relationship's data, optionally
//! password-encrypts the whole serialized bundle as one envelope, and
//! attaches a checksum over the final bytes. Import reverses the process,
//! validating structure before accepting anything. The payload string is
//! the exact on-disk wire format of the download file.

mod bundle;
mod error;
mod service;

pub use bundle::{
    ExportBundle, ExportMetadata, ExportOptions, ExportOutput, ExportStatistics, FORMAT_VERSION,
    MEDIA_OMITTED,
};
pub use error::{ExportError, ExportResult};
pub use service::ExportService;
