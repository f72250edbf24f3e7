//! Merge plan and conflict value types.
//!
//! A [`MergePlan`] holds everything that can be applied without asking the
//! user; [`EntryConflict`] holds everything that cannot. Both are immutable
//! once the diff engine has produced them.

use std::collections::BTreeMap;

use crate::core::{BibEntry, CitationKey, FieldName, Snapshot};

/// Auto-applicable outcome of a three-way diff.
///
/// Field patches are absolute target values, never deltas: `Some(v)` sets the
/// field to `v`, `None` deletes it. Applying a plan twice yields the same
/// snapshot as applying it once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergePlan {
    field_patches: BTreeMap<CitationKey, BTreeMap<FieldName, Option<String>>>,
    new_entries: Vec<BibEntry>,
    deleted_entry_keys: Vec<CitationKey>,
}

impl MergePlan {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_patch(&mut self, key: CitationKey, field: FieldName, value: Option<String>) {
        self.field_patches.entry(key).or_default().insert(field, value);
    }

    pub(crate) fn add_new_entry(&mut self, entry: BibEntry) {
        self.new_entries.push(entry);
    }

    pub(crate) fn add_deleted_key(&mut self, key: CitationKey) {
        self.deleted_entry_keys.push(key);
    }

    pub fn field_patches(
        &self,
    ) -> &BTreeMap<CitationKey, BTreeMap<FieldName, Option<String>>> {
        &self.field_patches
    }

    pub fn new_entries(&self) -> &[BibEntry] {
        &self.new_entries
    }

    pub fn deleted_entry_keys(&self) -> &[CitationKey] {
        &self.deleted_entry_keys
    }

    /// Holds iff there is nothing to patch, add, or delete.
    pub fn is_empty(&self) -> bool {
        self.field_patches.is_empty()
            && self.new_entries.is_empty()
            && self.deleted_entry_keys.is_empty()
    }

    /// Apply the plan to a snapshot, producing the merged snapshot.
    ///
    /// A patch addressed at a key absent from the snapshot is skipped; the
    /// diff engine never emits one, and skipping keeps application total.
    pub fn apply_to(&self, snapshot: &Snapshot) -> Snapshot {
        let mut entries = snapshot.to_map();

        for key in &self.deleted_entry_keys {
            entries.remove(key);
        }
        for entry in &self.new_entries {
            entries.insert(entry.citation_key().clone(), entry.clone());
        }
        for (key, patches) in &self.field_patches {
            let Some(current) = entries.get(key) else {
                continue;
            };
            let mut fields = current.fields_map().clone();
            for (field, target) in patches {
                match target {
                    Some(value) => {
                        fields.insert(field.clone(), value.clone());
                    }
                    None => {
                        fields.remove(field);
                    }
                }
            }
            entries.insert(key.clone(), BibEntry::from_parts(key.clone(), fields));
        }

        Snapshot::from_map(entries)
    }
}

/// An unresolved three-way disagreement, scoped to one citation key.
///
/// Carries the full base/local/remote values so a resolver can pick local,
/// remote, or a custom replacement without re-reading any snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryConflict {
    /// Both sides modified the entry and disagree on at least one field.
    Fields {
        citation_key: CitationKey,
        base: BibEntry,
        local: BibEntry,
        remote: BibEntry,
        /// The disagreeing fields.
        fields: Vec<FieldName>,
    },
    /// One side deleted the entry while the other modified it.
    DeleteModify {
        citation_key: CitationKey,
        base: BibEntry,
        local: Option<BibEntry>,
        remote: Option<BibEntry>,
    },
    /// The same key was introduced independently on both sides with
    /// differing content. Structurally different from a field conflict:
    /// resolving it may mean renaming one entry rather than merging fields.
    KeyCollision {
        citation_key: CitationKey,
        local: BibEntry,
        remote: BibEntry,
    },
}

impl EntryConflict {
    pub fn citation_key(&self) -> &CitationKey {
        match self {
            EntryConflict::Fields { citation_key, .. }
            | EntryConflict::DeleteModify { citation_key, .. }
            | EntryConflict::KeyCollision { citation_key, .. } => citation_key,
        }
    }

    /// The entry as the local side sees it, if it still exists there.
    pub fn local_entry(&self) -> Option<&BibEntry> {
        match self {
            EntryConflict::Fields { local, .. } | EntryConflict::KeyCollision { local, .. } => {
                Some(local)
            }
            EntryConflict::DeleteModify { local, .. } => local.as_ref(),
        }
    }

    /// The entry as the remote side sees it, if it still exists there.
    pub fn remote_entry(&self) -> Option<&BibEntry> {
        match self {
            EntryConflict::Fields { remote, .. } | EntryConflict::KeyCollision { remote, .. } => {
                Some(remote)
            }
            EntryConflict::DeleteModify { remote, .. } => remote.as_ref(),
        }
    }
}

/// Full result of diffing: the auto plan plus the conflicts needing a user.
#[derive(Clone, Debug, Default)]
pub struct MergeAnalysis {
    auto_plan: MergePlan,
    conflicts: Vec<EntryConflict>,
}

impl MergeAnalysis {
    pub(crate) fn new(auto_plan: MergePlan, conflicts: Vec<EntryConflict>) -> Self {
        Self {
            auto_plan,
            conflicts,
        }
    }

    pub fn auto_plan(&self) -> &MergePlan {
        &self.auto_plan
    }

    pub fn conflicts(&self) -> &[EntryConflict] {
        &self.conflicts
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn is_noop(&self) -> bool {
        self.auto_plan.is_empty() && self.conflicts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(entries: impl IntoIterator<Item = BibEntry>) -> Snapshot {
        Snapshot::from_entries(entries).unwrap()
    }

    #[test]
    fn empty_plan_is_identity() {
        let local = snapshot([BibEntry::new("a").with_field("title", "T")]);
        let plan = MergePlan::new();
        assert!(plan.is_empty());
        assert_eq!(plan.apply_to(&local), local);
    }

    #[test]
    fn patches_set_and_delete_fields() {
        let local = snapshot([BibEntry::new("a")
            .with_field("title", "T1")
            .with_field("note", "n")]);

        let mut plan = MergePlan::new();
        plan.add_patch("a".into(), "title".into(), Some("T2".into()));
        plan.add_patch("a".into(), "note".into(), None);

        let merged = plan.apply_to(&local);
        let entry = merged.get(&"a".into()).unwrap();
        assert_eq!(entry.field(&"title".into()), Some("T2"));
        assert_eq!(entry.field(&"note".into()), None);
    }

    #[test]
    fn apply_is_idempotent() {
        let local = snapshot([
            BibEntry::new("a").with_field("title", "T1"),
            BibEntry::new("c").with_field("title", "gone"),
        ]);

        let mut plan = MergePlan::new();
        plan.add_patch("a".into(), "title".into(), Some("T2".into()));
        plan.add_new_entry(BibEntry::new("b").with_field("title", "B"));
        plan.add_deleted_key("c".into());

        let once = plan.apply_to(&local);
        let twice = plan.apply_to(&once);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn patch_for_absent_key_is_skipped() {
        let local = snapshot([]);
        let mut plan = MergePlan::new();
        plan.add_patch("ghost".into(), "title".into(), Some("T".into()));
        assert_eq!(plan.apply_to(&local), local);
    }
}
