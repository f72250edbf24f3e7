//! Git sync module.
//!
//! Provides:
//! - GitBackend trait with git2 and in-memory implementations
//! - Sync status classification (up-to-date / ahead / behind / diverged)
//! - Three-way semantic diff + merge planning over record snapshots
//! - Merge bookkeeping (fast-forward vs merge commit)
//! - Pull/push typestate pipeline and result reporting

pub mod backend;
pub mod book;
pub mod diff;
pub mod error;
pub mod memory;
pub mod plan;
pub mod resolve;
pub mod service;
pub mod status;
pub mod wire;

pub use backend::{Git2Backend, GitBackend};
pub use book::{FinalizeResult, PullComputation, finalize};
pub use diff::analyze;
pub use error::{BackendError, SyncError, WireError};
pub use memory::MemoryBackend;
pub use plan::{EntryConflict, MergeAnalysis, MergePlan};
pub use resolve::{ConflictResolver, Decision, NoConflictsExpected, Resolution};
pub use service::{
    ClassifyStep, GitOperationResult, GitSyncService, MergeContext, PullProcess, PullResult,
    PushResult,
};
pub use status::{StatusReport, SyncStatus, classify};
