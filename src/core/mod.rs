//! Core data model: records and snapshots.

mod entry;
mod error;
mod snapshot;

pub use entry::{BibEntry, CitationKey, FieldName};
pub use error::CoreError;
pub use snapshot::Snapshot;
