//! Pull/push orchestration and operation result reporting.
//!
//! The pull pipeline is a typestate machine:
//! - Idle → Classified → Analyzed → Resolved → finalized
//! - Each transition consumes `self`, returns the next phase
//! - Can't book a merge before resolving - enforced at compile time
//!
//! `UpToDate`/`Ahead` short-circuit at classification and never reach the
//! diff step. [`GitSyncService`] drives the machine end to end and wraps the
//! outcome into [`PullResult`]/[`PushResult`].

use git2::Oid;

use crate::config::SyncConfig;
use crate::core::{BibEntry, Snapshot};

use super::backend::GitBackend;
use super::book::{self, FinalizeResult, PullComputation};
use super::diff;
use super::error::{BackendError, SyncError};
use super::plan::EntryConflict;
use super::resolve::{self, ConflictResolver, Resolution};
use super::status::{self, SyncStatus};
use super::wire;

/// Which branch to sync and where the bibliography lives in its tree.
#[derive(Clone, Debug)]
pub struct MergeContext {
    pub branch: String,
    pub file_path: String,
}

impl MergeContext {
    pub fn new(branch: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            file_path: file_path.into(),
        }
    }

    pub fn local_ref(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }

    pub fn remote_tracking_ref(&self, remote_name: &str) -> String {
        format!("refs/remotes/{remote_name}/{}", self.branch)
    }
}

// =============================================================================
// Phase markers
// =============================================================================

/// Initial phase - ready to classify.
pub struct Idle;

/// Classified phase - heads compared, merge required.
pub struct Classified {
    status: SyncStatus,
    base: Option<Oid>,
    local_head: Oid,
    remote: Oid,
}

/// Analyzed phase - three-way diff computed, conflicts known.
pub struct Analyzed {
    computation: PullComputation,
    local_snapshot: Snapshot,
}

/// Resolved phase - merged content finalized, ready to book.
pub struct Resolved {
    computation: PullComputation,
    merged_bytes: Vec<u8>,
    merged_entries: Vec<BibEntry>,
}

/// Outcome of classification: either nothing to merge, or the next phase.
pub enum ClassifyStep {
    /// `UpToDate` or `Ahead`: no-op computation, pipeline over.
    Noop(PullComputation),
    /// Local branch or remote counterpart missing; nothing to compare.
    Untracked,
    /// `Behind` or `Diverged`: proceed to analysis.
    Work(PullProcess<Classified>),
}

/// Pull pipeline with typestate-enforced phases.
pub struct PullProcess<Phase> {
    ctx: MergeContext,
    config: SyncConfig,
    phase: Phase,
}

impl PullProcess<Idle> {
    pub fn new(ctx: MergeContext, config: SyncConfig) -> Self {
        Self {
            ctx,
            config,
            phase: Idle,
        }
    }

    /// Fetch (best-effort) and classify the two heads.
    pub fn classify(self, backend: &dyn GitBackend) -> Result<ClassifyStep, SyncError> {
        if let Err(e) = backend.fetch(&self.ctx.branch) {
            tracing::warn!(error = %e, "fetch failed (best-effort); classifying offline");
        }

        let local = backend.head_of(&self.ctx.local_ref())?;
        let remote = backend.head_of(&self.ctx.remote_tracking_ref(&self.config.remote_name))?;
        let (Some(local), Some(remote)) = (local, remote) else {
            return Ok(ClassifyStep::Untracked);
        };

        let report = status::classify(backend, local, remote)?;
        match report.status {
            SyncStatus::UpToDate | SyncStatus::Ahead => Ok(ClassifyStep::Noop(
                PullComputation::noop(report.status, local, remote),
            )),
            _ => Ok(ClassifyStep::Work(PullProcess {
                ctx: self.ctx,
                config: self.config,
                phase: Classified {
                    status: report.status,
                    base: report.base,
                    local_head: local,
                    remote,
                },
            })),
        }
    }
}

impl PullProcess<Classified> {
    /// Read the snapshot triple and run the three-way diff.
    pub fn analyze(self, backend: &dyn GitBackend) -> Result<PullProcess<Analyzed>, SyncError> {
        let Classified {
            status,
            base,
            local_head,
            remote,
        } = self.phase;
        let path = &self.ctx.file_path;

        let base_snapshot = base
            .map(|commit| snapshot_at(backend, commit, path))
            .transpose()?;
        let local_snapshot = snapshot_at(backend, local_head, path)?;
        let remote_snapshot = snapshot_at(backend, remote, path)?;

        let analysis = diff::analyze(base_snapshot.as_ref(), &local_snapshot, &remote_snapshot);
        Ok(PullProcess {
            ctx: self.ctx,
            config: self.config,
            phase: Analyzed {
                computation: PullComputation::new(status, base, local_head, remote, analysis),
                local_snapshot,
            },
        })
    }
}

impl PullProcess<Analyzed> {
    pub fn computation(&self) -> &PullComputation {
        &self.phase.computation
    }

    pub fn conflicts(&self) -> &[EntryConflict] {
        self.phase.computation.analysis().conflicts()
    }

    /// Apply the auto plan plus the accepted resolutions.
    ///
    /// Panics if a conflict lacks a resolution; the caller must resolve all
    /// of them (or abort) before finalizing.
    pub fn resolve(self, resolutions: &[Resolution]) -> Result<PullProcess<Resolved>, SyncError> {
        let Analyzed {
            computation,
            local_snapshot,
        } = self.phase;

        let analysis = computation.analysis();
        let merged = analysis.auto_plan().apply_to(&local_snapshot);
        let merged = resolve::apply_resolutions(merged, analysis.conflicts(), resolutions);

        let merged_entries: Vec<BibEntry> = merged
            .iter()
            .filter(|entry| local_snapshot.get(entry.citation_key()) != Some(entry))
            .cloned()
            .collect();
        let merged_bytes = wire::serialize_snapshot(&merged)?;

        Ok(PullProcess {
            ctx: self.ctx,
            config: self.config,
            phase: Resolved {
                computation,
                merged_bytes,
                merged_entries,
            },
        })
    }
}

impl PullProcess<Resolved> {
    pub fn merged_entries(&self) -> &[BibEntry] {
        &self.phase.merged_entries
    }

    /// Book the merged content (fast-forward or commit) into the graph.
    pub fn finalize(self, backend: &dyn GitBackend) -> Result<FinalizeResult, SyncError> {
        book::finalize(
            backend,
            &self.ctx.local_ref(),
            &self.ctx.remote_tracking_ref(&self.config.remote_name),
            &self.ctx.file_path,
            &self.phase.computation,
            &self.phase.merged_bytes,
        )
    }
}

fn snapshot_at(backend: &dyn GitBackend, commit: Oid, path: &str) -> Result<Snapshot, SyncError> {
    match backend.read_content_at(commit, path)? {
        Some(bytes) => Ok(wire::parse_snapshot(&bytes)?),
        None => Ok(Snapshot::new()),
    }
}

// =============================================================================
// Operation results
// =============================================================================

/// Outcome of a pull, reported to the caller.
#[derive(Clone, Debug)]
pub struct PullResult {
    successful: bool,
    noop: bool,
    merged_entries: Vec<BibEntry>,
    outcome: Option<FinalizeResult>,
}

impl PullResult {
    pub(crate) fn noop_up_to_date() -> Self {
        Self {
            successful: true,
            noop: true,
            merged_entries: Vec::new(),
            outcome: Some(FinalizeResult::NoopUpToDate),
        }
    }

    pub(crate) fn noop_ahead() -> Self {
        Self {
            successful: true,
            noop: true,
            merged_entries: Vec::new(),
            outcome: Some(FinalizeResult::NoopAhead),
        }
    }

    pub(crate) fn noop_untracked() -> Self {
        Self {
            successful: true,
            noop: true,
            merged_entries: Vec::new(),
            outcome: None,
        }
    }

    pub(crate) fn cancelled() -> Self {
        Self {
            successful: false,
            noop: false,
            merged_entries: Vec::new(),
            outcome: None,
        }
    }

    pub(crate) fn merged(outcome: FinalizeResult, merged_entries: Vec<BibEntry>) -> Self {
        Self {
            successful: true,
            noop: false,
            merged_entries,
            outcome: Some(outcome),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.successful
    }

    pub fn noop(&self) -> bool {
        self.noop
    }

    /// Entries that changed locally as a result of the pull.
    pub fn merged_entries(&self) -> &[BibEntry] {
        &self.merged_entries
    }

    pub fn outcome(&self) -> Option<FinalizeResult> {
        self.outcome
    }
}

/// Outcome of a push, reported to the caller.
#[derive(Clone, Copy, Debug)]
pub struct PushResult {
    successful: bool,
    noop: bool,
}

impl PushResult {
    pub(crate) fn noop_up_to_date() -> Self {
        Self {
            successful: true,
            noop: true,
        }
    }

    pub(crate) fn nothing_to_push() -> Self {
        Self {
            successful: true,
            noop: true,
        }
    }

    pub(crate) fn pushed() -> Self {
        Self {
            successful: true,
            noop: false,
        }
    }

    pub(crate) fn rejected() -> Self {
        Self {
            successful: false,
            noop: false,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.successful
    }

    pub fn noop(&self) -> bool {
        self.noop
    }
}

/// Tagged union over the two operation directions.
#[derive(Clone, Debug)]
pub enum GitOperationResult {
    Pull(PullResult),
    Push(PushResult),
}

impl GitOperationResult {
    pub fn is_successful(&self) -> bool {
        match self {
            GitOperationResult::Pull(r) => r.is_successful(),
            GitOperationResult::Push(r) => r.is_successful(),
        }
    }

    pub fn noop(&self) -> bool {
        match self {
            GitOperationResult::Pull(r) => r.noop(),
            GitOperationResult::Push(r) => r.noop(),
        }
    }
}

impl From<PullResult> for GitOperationResult {
    fn from(result: PullResult) -> Self {
        GitOperationResult::Pull(result)
    }
}

impl From<PushResult> for GitOperationResult {
    fn from(result: PushResult) -> Self {
        GitOperationResult::Push(result)
    }
}

// =============================================================================
// GitSyncService
// =============================================================================

/// Drives the pull/push pipelines over one repository.
///
/// The caller serializes sync attempts; at most one pipeline is in flight
/// per repository.
pub struct GitSyncService<'a, B: GitBackend> {
    backend: &'a B,
    config: SyncConfig,
}

impl<'a, B: GitBackend> GitSyncService<'a, B> {
    pub fn new(backend: &'a B, config: SyncConfig) -> Self {
        Self { backend, config }
    }

    /// Fetch, merge and book remote changes.
    ///
    /// Blocks in `resolver` for as long as the user needs; aborting there
    /// leaves the repository completely unchanged.
    pub fn pull(
        &self,
        ctx: &MergeContext,
        resolver: &dyn ConflictResolver,
    ) -> Result<PullResult, SyncError> {
        let process = PullProcess::new(ctx.clone(), self.config.clone());
        let classified = match process.classify(self.backend)? {
            ClassifyStep::Untracked => {
                tracing::info!(branch = %ctx.branch, "no tracked counterpart; pull is a no-op");
                return Ok(PullResult::noop_untracked());
            }
            ClassifyStep::Noop(computation) => {
                tracing::info!(status = computation.status().as_str(), "pull is a no-op");
                return Ok(match computation.status() {
                    SyncStatus::Ahead => PullResult::noop_ahead(),
                    _ => PullResult::noop_up_to_date(),
                });
            }
            ClassifyStep::Work(classified) => classified,
        };

        let analyzed = classified.analyze(self.backend)?;
        let resolutions = if analyzed.conflicts().is_empty() {
            Vec::new()
        } else {
            match resolver.resolve(analyzed.conflicts()) {
                Some(resolutions) => resolutions,
                None => {
                    tracing::info!("conflict resolution aborted; repository unchanged");
                    return Ok(PullResult::cancelled());
                }
            }
        };

        let resolved = analyzed.resolve(&resolutions)?;
        let merged_entries = resolved.merged_entries().to_vec();
        let outcome = resolved.finalize(self.backend)?;
        tracing::info!(
            fast_forward = outcome.is_fast_forward(),
            merged = merged_entries.len(),
            "pull complete"
        );
        Ok(PullResult::merged(outcome, merged_entries))
    }

    /// Publish local commits, refusing to overwrite unseen remote history.
    pub fn push(&self, ctx: &MergeContext) -> Result<PushResult, SyncError> {
        if let Err(e) = self.backend.fetch(&ctx.branch) {
            tracing::warn!(error = %e, "fetch failed (best-effort); pushing blind");
        }

        let Some(local) = self.backend.head_of(&ctx.local_ref())? else {
            return Ok(PushResult::nothing_to_push());
        };
        let remote = self
            .backend
            .head_of(&ctx.remote_tracking_ref(&self.config.remote_name))?;

        let status = match remote {
            // First publish of the branch.
            None => SyncStatus::Ahead,
            Some(remote) => status::classify(self.backend, local, remote)?.status,
        };

        match status {
            SyncStatus::UpToDate => Ok(PushResult::noop_up_to_date()),
            SyncStatus::Ahead => match self.backend.push(&ctx.branch) {
                Ok(()) => Ok(PushResult::pushed()),
                Err(BackendError::NonFastForward | BackendError::PushRejected { .. }) => {
                    tracing::warn!("push rejected by remote; pull first");
                    Ok(PushResult::rejected())
                }
                Err(e) => Err(e.into()),
            },
            SyncStatus::Behind | SyncStatus::Diverged => {
                tracing::warn!(
                    status = status.as_str(),
                    "remote has unseen history; pull before pushing"
                );
                Ok(PushResult::rejected())
            }
            SyncStatus::Conflict | SyncStatus::Untracked => Ok(PushResult::rejected()),
        }
    }
}
