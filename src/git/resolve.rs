//! Conflict resolution contract.
//!
//! The merge core never resolves conflicts itself: it hands the
//! [`EntryConflict`] values to a [`ConflictResolver`] (a GUI dialog, a CLI
//! prompt, a policy object in tests) and applies whatever came back on top
//! of the auto plan's result.

use std::collections::BTreeMap;

use crate::core::{BibEntry, CitationKey, Snapshot};

use super::plan::EntryConflict;

/// Final value chosen for one conflicted entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Keep the entry as the local side has it (or keep it deleted).
    KeepLocal,
    /// Take the entry as the remote side has it (or accept its deletion).
    KeepRemote,
    /// Replace with a caller-built entry; `None` drops the entry. The custom
    /// entry may carry a different citation key, which is how a key collision
    /// resolves by rename.
    Custom(Option<BibEntry>),
}

/// One resolved conflict, addressed by citation key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    citation_key: CitationKey,
    decision: Decision,
}

impl Resolution {
    pub fn new(citation_key: impl Into<CitationKey>, decision: Decision) -> Self {
        Self {
            citation_key: citation_key.into(),
            decision,
        }
    }

    pub fn keep_local(citation_key: impl Into<CitationKey>) -> Self {
        Self::new(citation_key, Decision::KeepLocal)
    }

    pub fn keep_remote(citation_key: impl Into<CitationKey>) -> Self {
        Self::new(citation_key, Decision::KeepRemote)
    }

    pub fn custom(citation_key: impl Into<CitationKey>, entry: Option<BibEntry>) -> Self {
        Self::new(citation_key, Decision::Custom(entry))
    }

    pub fn citation_key(&self) -> &CitationKey {
        &self.citation_key
    }

    pub fn decision(&self) -> &Decision {
        &self.decision
    }
}

/// Supplied by the caller; blocks for as long as the user needs.
///
/// Returning `None` aborts the pull with the repository untouched.
pub trait ConflictResolver {
    fn resolve(&self, conflicts: &[EntryConflict]) -> Option<Vec<Resolution>>;
}

/// Resolver for conflict-free flows; panics if it is ever consulted.
pub struct NoConflictsExpected;

impl ConflictResolver for NoConflictsExpected {
    fn resolve(&self, conflicts: &[EntryConflict]) -> Option<Vec<Resolution>> {
        panic!(
            "merge produced {} conflict(s) but the caller declared none could occur",
            conflicts.len()
        );
    }
}

/// Fold accepted resolutions into the auto-merged snapshot.
///
/// Panics if any conflict lacks a resolution: the orchestration layer must
/// not let an unresolved conflict reach bookkeeping.
pub(crate) fn apply_resolutions(
    snapshot: Snapshot,
    conflicts: &[EntryConflict],
    resolutions: &[Resolution],
) -> Snapshot {
    let by_key: BTreeMap<&CitationKey, &Decision> = resolutions
        .iter()
        .map(|r| (r.citation_key(), r.decision()))
        .collect();

    let mut entries = snapshot.to_map();
    for conflict in conflicts {
        let key = conflict.citation_key();
        let Some(decision) = by_key.get(key) else {
            panic!("unresolved conflict for '{key}' reached finalize");
        };

        let chosen = match decision {
            Decision::KeepLocal => conflict.local_entry().cloned(),
            Decision::KeepRemote => conflict.remote_entry().cloned(),
            Decision::Custom(entry) => entry.clone(),
        };
        match chosen {
            Some(entry) => {
                // A renamed custom entry replaces the conflicted key.
                if entry.citation_key() != key {
                    entries.remove(key);
                }
                entries.insert(entry.citation_key().clone(), entry);
            }
            None => {
                entries.remove(key);
            }
        }
    }
    Snapshot::from_map(entries)
}
