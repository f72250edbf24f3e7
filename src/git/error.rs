//! Sync error types.

use std::path::PathBuf;

use git2::Oid;
use thiserror::Error;

use crate::core::CitationKey;
use crate::error::{Effect, Transience};

/// Errors surfaced by the version-control backend.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BackendError {
    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("commit not found: {0}")]
    CommitNotFound(Oid),

    #[error("expected blob but got different object type at {path}")]
    NotABlob { path: String },

    #[error("failed to fetch from remote: {0}")]
    Fetch(#[source] git2::Error),

    #[error("push rejected (non-fast-forward)")]
    NonFastForward,

    #[error("push rejected: {message}")]
    PushRejected { message: String },

    #[error("failed to push: {0}")]
    Push(#[source] git2::Error),

    #[error("failed to move ref {refname}: {source}")]
    MoveRef {
        refname: String,
        #[source]
        source: git2::Error,
    },

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
}

/// Errors that can occur during a sync pipeline run.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SyncError {
    #[error("failed to open repository at {0}: {1}")]
    OpenRepo(PathBuf, #[source] git2::Error),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("ref {refname} moved since classification (expected {expected}, found {found:?})")]
    StaleComputation {
        refname: String,
        expected: Oid,
        found: Option<Oid>,
    },
}

impl SyncError {
    /// Whether retrying this sync may succeed.
    pub fn transience(&self) -> Transience {
        match self {
            // A moved head or rejected push resolves by re-running the
            // pipeline from classification.
            SyncError::StaleComputation { .. } => Transience::Retryable,

            SyncError::Backend(e) => match e {
                BackendError::Fetch(_)
                | BackendError::NonFastForward
                | BackendError::PushRejected { .. }
                | BackendError::Push(_) => Transience::Retryable,

                BackendError::RefNotFound(_)
                | BackendError::CommitNotFound(_)
                | BackendError::NotABlob { .. } => Transience::Permanent,

                BackendError::MoveRef { .. } | BackendError::Git(_) => Transience::Unknown,
            },

            SyncError::OpenRepo(_, _) | SyncError::Wire(_) => Transience::Permanent,
        }
    }

    /// What we know about side effects when this error is returned.
    pub fn effect(&self) -> Effect {
        match self {
            // Push-phase errors occur after a local commit was booked.
            SyncError::Backend(
                BackendError::NonFastForward
                | BackendError::PushRejected { .. }
                | BackendError::Push(_),
            ) => Effect::Some,

            // A failed ref move leaves the ref untouched; a dangling commit
            // object is not observable repository state.
            SyncError::Backend(BackendError::MoveRef { .. }) => Effect::None,

            // Low-level git2 errors can happen at any phase.
            SyncError::Backend(BackendError::Git(_)) => Effect::Unknown,

            // Everything else fails before any write.
            _ => Effect::None,
        }
    }
}

/// Errors from the snapshot wire codec.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WireError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("duplicate citation key in snapshot: {0}")]
    DuplicateKey(CitationKey),
}

impl WireError {
    pub fn transience(&self) -> Transience {
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
