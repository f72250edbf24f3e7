//! Merge bookkeeping: booking a merge outcome into the commit graph.
//!
//! Decides fast-forward vs commit creation and performs the writes in an
//! order that can never leave a partially-updated repository: the commit
//! object (if any) is written first, the ref moves last. A failed ref move
//! surfaces as an error with the ref untouched.

use git2::Oid;

use super::backend::GitBackend;
use super::error::SyncError;
use super::plan::MergeAnalysis;
use super::status::SyncStatus;

/// Everything one pull attempt computed before resolution.
///
/// Created once per attempt by the diff step and never mutated; a new
/// attempt produces a new value.
#[derive(Debug)]
pub struct PullComputation {
    status: SyncStatus,
    base: Option<Oid>,
    local_head: Oid,
    remote: Oid,
    analysis: MergeAnalysis,
}

impl PullComputation {
    pub(crate) fn new(
        status: SyncStatus,
        base: Option<Oid>,
        local_head: Oid,
        remote: Oid,
        analysis: MergeAnalysis,
    ) -> Self {
        Self {
            status,
            base,
            local_head,
            remote,
            analysis,
        }
    }

    /// Short-circuit computation for `UpToDate`/`Ahead`: nothing to merge.
    pub(crate) fn noop(status: SyncStatus, local_head: Oid, remote: Oid) -> Self {
        Self::new(status, None, local_head, remote, MergeAnalysis::default())
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// Common ancestor; absent on first-time sync of unrelated histories.
    pub fn base(&self) -> Option<Oid> {
        self.base
    }

    pub fn local_head(&self) -> Oid {
        self.local_head
    }

    pub fn remote(&self) -> Oid {
        self.remote
    }

    pub fn analysis(&self) -> &MergeAnalysis {
        &self.analysis
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.status, SyncStatus::UpToDate | SyncStatus::Ahead)
    }
}

/// How a merge outcome was booked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinalizeResult {
    NoopUpToDate,
    NoopAhead,
    /// Local ref moved to the remote commit; no commit created.
    FastForward,
    /// A merge commit was created and the local ref moved to it.
    NewCommit(Oid),
}

impl FinalizeResult {
    pub fn is_fast_forward(self) -> bool {
        matches!(self, FinalizeResult::FastForward)
    }

    pub fn is_noop(self) -> bool {
        matches!(
            self,
            FinalizeResult::NoopUpToDate | FinalizeResult::NoopAhead
        )
    }

    pub fn new_commit_id(self) -> Option<Oid> {
        match self {
            FinalizeResult::NewCommit(oid) => Some(oid),
            _ => None,
        }
    }
}

/// Book the finalized content into the commit graph.
///
/// Panics if `computation.status()` is anything but `Behind`/`Diverged`;
/// other statuses are filtered upstream and reaching this point with one is
/// a defect in the calling orchestration.
pub fn finalize(
    backend: &dyn GitBackend,
    local_ref: &str,
    remote_ref: &str,
    path: &str,
    computation: &PullComputation,
    merged: &[u8],
) -> Result<FinalizeResult, SyncError> {
    let status = computation.status();
    assert!(
        status.requires_merge(),
        "bookkeeper invoked with status '{}'",
        status.as_str()
    );

    // Stale-computation rejection: the snapshot triple was fixed at
    // classification time, so both heads must still be where we saw them.
    check_unmoved(backend, local_ref, computation.local_head())?;
    check_unmoved(backend, remote_ref, computation.remote())?;

    let remote = computation.remote();
    let result = match status {
        SyncStatus::Behind => {
            let remote_content = backend.read_content_at(remote, path)?;
            if remote_content.as_deref() == Some(merged) {
                backend.move_ref(local_ref, remote, "bibgit: fast-forward to remote")?;
                tracing::info!(%remote, "fast-forwarded local ref");
                FinalizeResult::FastForward
            } else {
                // Content diverged from remote even without a local commit,
                // e.g. conflict edits made during resolution.
                book_commit(backend, local_ref, path, &[remote], computation, merged)?
            }
        }
        SyncStatus::Diverged => book_commit(
            backend,
            local_ref,
            path,
            &[computation.local_head(), remote],
            computation,
            merged,
        )?,
        _ => unreachable!("guarded by requires_merge"),
    };
    Ok(result)
}

fn check_unmoved(backend: &dyn GitBackend, refname: &str, expected: Oid) -> Result<(), SyncError> {
    let found = backend.head_of(refname)?;
    if found != Some(expected) {
        tracing::warn!(
            refname,
            %expected,
            found = found.map(|f| f.to_string()),
            "head moved since classification; rejecting stale computation"
        );
        return Err(SyncError::StaleComputation {
            refname: refname.to_owned(),
            expected,
            found,
        });
    }
    Ok(())
}

fn book_commit(
    backend: &dyn GitBackend,
    local_ref: &str,
    path: &str,
    parents: &[Oid],
    computation: &PullComputation,
    merged: &[u8],
) -> Result<FinalizeResult, SyncError> {
    let message = commit_message(computation.analysis());
    let commit = backend.create_commit(parents, path, merged, &message)?;
    backend.move_ref(local_ref, commit, "bibgit: merge")?;
    tracing::info!(%commit, parents = parents.len(), "booked merge commit");
    Ok(FinalizeResult::NewCommit(commit))
}

/// Commit message from the analysis counts, e.g.
/// "bibgit(sync): +1 added, ~2 patched, -1 deleted, !1 resolved".
fn commit_message(analysis: &MergeAnalysis) -> String {
    const PREFIX: &str = "bibgit(sync):";

    let plan = analysis.auto_plan();
    let mut parts = Vec::new();
    if !plan.new_entries().is_empty() {
        parts.push(format!("+{} added", plan.new_entries().len()));
    }
    if !plan.field_patches().is_empty() {
        parts.push(format!("~{} patched", plan.field_patches().len()));
    }
    if !plan.deleted_entry_keys().is_empty() {
        parts.push(format!("-{} deleted", plan.deleted_entry_keys().len()));
    }
    if analysis.has_conflicts() {
        parts.push(format!("!{} resolved", analysis.conflicts().len()));
    }

    if parts.is_empty() {
        format!("{PREFIX} merge remote changes")
    } else {
        format!("{PREFIX} {}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BibEntry, Snapshot};
    use crate::git::diff::analyze;
    use crate::git::MemoryBackend;

    const PATH: &str = "library.jsonl";
    const LOCAL: &str = "refs/heads/main";
    const REMOTE: &str = "refs/remotes/origin/main";

    fn behind_computation(backend: &MemoryBackend, content: &[u8]) -> (PullComputation, Oid) {
        let base = backend.commit_with(&[], &[(PATH, b"old")], "base");
        let remote = backend.commit_with(&[base], &[(PATH, content)], "remote");
        backend.set_ref(LOCAL, base);
        backend.set_ref(REMOTE, remote);
        let computation = PullComputation::new(
            SyncStatus::Behind,
            Some(base),
            base,
            remote,
            MergeAnalysis::default(),
        );
        (computation, remote)
    }

    #[test]
    fn behind_with_identical_content_fast_forwards() {
        let backend = MemoryBackend::new();
        let (computation, remote) = behind_computation(&backend, b"new");

        let result = finalize(&backend, LOCAL, REMOTE, PATH, &computation, b"new").unwrap();
        assert!(result.is_fast_forward());
        assert_eq!(backend.head_of(LOCAL).unwrap(), Some(remote));
    }

    #[test]
    fn behind_with_differing_content_commits_on_remote() {
        let backend = MemoryBackend::new();
        let (computation, remote) = behind_computation(&backend, b"new");

        let result = finalize(&backend, LOCAL, REMOTE, PATH, &computation, b"edited").unwrap();
        let commit = result.new_commit_id().unwrap();
        assert_eq!(backend.parents_of(commit), vec![remote]);
        assert_eq!(backend.head_of(LOCAL).unwrap(), Some(commit));
        assert_eq!(
            backend.message_of(commit).as_deref(),
            Some("bibgit(sync): merge remote changes")
        );
    }

    #[test]
    fn diverged_commits_with_two_parents() {
        let backend = MemoryBackend::new();
        let base = backend.commit_with(&[], &[(PATH, b"0")], "base");
        let local = backend.commit_with(&[base], &[(PATH, b"l")], "local");
        let remote = backend.commit_with(&[base], &[(PATH, b"r")], "remote");
        backend.set_ref(LOCAL, local);
        backend.set_ref(REMOTE, remote);

        let computation = PullComputation::new(
            SyncStatus::Diverged,
            Some(base),
            local,
            remote,
            MergeAnalysis::default(),
        );
        let result = finalize(&backend, LOCAL, REMOTE, PATH, &computation, b"merged").unwrap();

        let commit = result.new_commit_id().unwrap();
        assert_eq!(backend.parents_of(commit), vec![local, remote]);
        assert_eq!(backend.head_of(LOCAL).unwrap(), Some(commit));
    }

    #[test]
    fn moved_remote_head_is_rejected_as_stale() {
        let backend = MemoryBackend::new();
        let (computation, remote) = behind_computation(&backend, b"new");
        let moved = backend.commit_with(&[remote], &[(PATH, b"newer")], "moved");
        backend.set_ref(REMOTE, moved);

        let err = finalize(&backend, LOCAL, REMOTE, PATH, &computation, b"new").unwrap_err();
        assert!(matches!(err, SyncError::StaleComputation { .. }));
        assert_eq!(backend.head_of(LOCAL).unwrap(), Some(computation.local_head()));
    }

    #[test]
    fn failed_ref_move_leaves_ref_untouched() {
        let backend = MemoryBackend::new();
        let (computation, _) = behind_computation(&backend, b"new");
        let local_before = backend.head_of(LOCAL).unwrap();

        backend.fail_next_move_ref();
        let err = finalize(&backend, LOCAL, REMOTE, PATH, &computation, b"edited").unwrap_err();
        assert_eq!(err.effect(), crate::error::Effect::None);
        assert_eq!(backend.head_of(LOCAL).unwrap(), local_before);
    }

    #[test]
    #[should_panic(expected = "bookkeeper invoked with status")]
    fn up_to_date_status_is_an_invariant_violation() {
        let backend = MemoryBackend::new();
        let commit = backend.commit_with(&[], &[(PATH, b"x")], "c");
        let computation = PullComputation::noop(SyncStatus::UpToDate, commit, commit);
        let _ = finalize(&backend, LOCAL, REMOTE, PATH, &computation, b"x");
    }

    #[test]
    fn commit_message_counts_plan_buckets() {
        let base = Snapshot::from_entries([
            BibEntry::new("a").with_field("title", "T1"),
            BibEntry::new("c").with_field("title", "C"),
        ])
        .unwrap();
        let local = base.clone();
        let remote = Snapshot::from_entries([
            BibEntry::new("a").with_field("title", "T2"),
            BibEntry::new("b").with_field("title", "B"),
        ])
        .unwrap();

        let analysis = analyze(Some(&base), &local, &remote);
        assert_eq!(
            commit_message(&analysis),
            "bibgit(sync): +1 added, ~1 patched, -1 deleted"
        );
        assert_eq!(
            commit_message(&MergeAnalysis::default()),
            "bibgit(sync): merge remote changes"
        );
    }
}
