//! Core data model errors.

use thiserror::Error;

use super::entry::CitationKey;
use crate::error::{Effect, Transience};

/// Errors from constructing core value types.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    #[error("duplicate citation key: {0}")]
    DuplicateKey(CitationKey),
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        match self {
            CoreError::DuplicateKey(_) => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            CoreError::DuplicateKey(_) => Effect::None,
        }
    }
}
