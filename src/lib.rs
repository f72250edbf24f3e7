#![forbid(unsafe_code)]

//! Semantic three-way synchronization of bibliography snapshots over a git
//! commit graph.
//!
//! The pipeline reconciles a local snapshot with a remote one through their
//! nearest common ancestor, separates auto-applicable changes from genuine
//! conflicts, and books the outcome as a fast-forward or a merge commit:
//!
//! ```ignore
//! let backend = Git2Backend::open(&repo_path, &config)?;
//! let service = GitSyncService::new(&backend, config);
//! let result = service.pull(&MergeContext::new("main", "library.jsonl"), &resolver)?;
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod git;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the main types at crate root for convenience
pub use crate::config::SyncConfig;
pub use crate::core::{BibEntry, CitationKey, CoreError, FieldName, Snapshot};
pub use crate::git::{
    ConflictResolver, Decision, EntryConflict, FinalizeResult, Git2Backend, GitBackend,
    GitOperationResult, GitSyncService, MemoryBackend, MergeAnalysis, MergeContext, MergePlan,
    NoConflictsExpected, PullComputation, PullResult, PushResult, Resolution, SyncError,
    SyncStatus,
};
