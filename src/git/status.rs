//! Sync status classification.
//!
//! Compares the local and remote heads through the backend's ancestry
//! queries. `UpToDate` and `Ahead` short-circuit the whole pipeline: no
//! snapshot is read and no diff is computed for them.

use git2::Oid;

use super::backend::GitBackend;
use super::error::SyncError;

/// Relationship between the local and remote head of the synced branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    UpToDate,
    Ahead,
    Behind,
    Diverged,
    /// Repository is mid-conflict; produced upstream of the merge core.
    Conflict,
    /// No tracked counterpart to compare against; produced upstream.
    Untracked,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::UpToDate => "up-to-date",
            SyncStatus::Ahead => "ahead",
            SyncStatus::Behind => "behind",
            SyncStatus::Diverged => "diverged",
            SyncStatus::Conflict => "conflict",
            SyncStatus::Untracked => "untracked",
        }
    }

    /// Statuses the bookkeeper accepts.
    pub fn requires_merge(self) -> bool {
        matches!(self, SyncStatus::Behind | SyncStatus::Diverged)
    }
}

/// Classification outcome: status plus the merge base, where one applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub status: SyncStatus,
    /// Nearest common ancestor. `Some(local)` for `Behind`; for `Diverged`
    /// absent only when histories are unrelated.
    pub base: Option<Oid>,
}

/// Classify the local head against the remote head.
pub fn classify(
    backend: &dyn GitBackend,
    local: Oid,
    remote: Oid,
) -> Result<StatusReport, SyncError> {
    let report = if local == remote {
        StatusReport {
            status: SyncStatus::UpToDate,
            base: None,
        }
    } else if backend.is_ancestor(remote, local)? {
        StatusReport {
            status: SyncStatus::Ahead,
            base: None,
        }
    } else if backend.is_ancestor(local, remote)? {
        StatusReport {
            status: SyncStatus::Behind,
            base: Some(local),
        }
    } else {
        StatusReport {
            status: SyncStatus::Diverged,
            base: backend.nearest_common_ancestor(local, remote)?,
        }
    };

    tracing::debug!(
        status = report.status.as_str(),
        %local,
        %remote,
        base = report.base.map(|b| b.to_string()),
        "classified sync status"
    );
    Ok(report)
}
