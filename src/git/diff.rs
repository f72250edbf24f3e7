//! Three-way semantic diff engine and merge planner.
//!
//! Diffs base/local/remote snapshots at the level of entries and fields.
//! Pure function of its inputs: same snapshots always yield the same
//! analysis, which is what makes replaying an aborted merge safe.
//!
//! Presence patterns (B = in base, L = in local, R = in remote):
//! - !B  R !L        new remote entry -> auto plan
//! - !B  L !R        local-only entry, untouched
//! - !B  L  R        key introduced on both sides: per-field classification
//!                   against an empty base; a same-field disagreement is a
//!                   key-collision conflict, anything else auto-merges
//! -  B !L !R        deleted on both sides -> no-op
//! -  B !L  R        remote unchanged -> stays deleted; else conflict
//! -  B  L !R        local unchanged -> auto delete; else conflict
//! -  B  L  R        per-field four-bucket classification

use std::collections::BTreeSet;

use crate::core::{BibEntry, CitationKey, FieldName, Snapshot};

use super::plan::{EntryConflict, MergeAnalysis, MergePlan};

/// Diff local and remote against their common base.
///
/// `base` is absent on first-time sync (unrelated histories); every key then
/// classifies under the no-base patterns.
pub fn analyze(base: Option<&Snapshot>, local: &Snapshot, remote: &Snapshot) -> MergeAnalysis {
    let empty = Snapshot::new();
    let base = base.unwrap_or(&empty);

    let mut plan = MergePlan::new();
    let mut conflicts = Vec::new();

    let keys: BTreeSet<&CitationKey> = base
        .keys()
        .chain(local.keys())
        .chain(remote.keys())
        .collect();

    for key in keys {
        match (base.get(key), local.get(key), remote.get(key)) {
            (None, None, None) => unreachable!("key taken from union of the three snapshots"),

            // New remote entry.
            (None, None, Some(r)) => plan.add_new_entry(r.clone()),

            // Local-only entry: not part of the plan, survives as-is.
            (None, Some(_), None) => {}

            // Independently introduced on both sides. Fields classify against
            // an empty base: remote-only fields patch in, local-only fields
            // stay, only a same-field disagreement collides.
            (None, Some(l), Some(r)) => {
                let empty = BibEntry::new(key.clone());
                let (patches, conflicting) = classify_fields(&empty, l, r);
                if conflicting.is_empty() {
                    for (field, value) in patches {
                        plan.add_patch(key.clone(), field, value);
                    }
                } else {
                    conflicts.push(EntryConflict::KeyCollision {
                        citation_key: key.clone(),
                        local: l.clone(),
                        remote: r.clone(),
                    });
                }
            }

            // Deleted on both sides.
            (Some(_), None, None) => {}

            // Local deleted.
            (Some(b), None, Some(r)) => {
                if r != b {
                    conflicts.push(EntryConflict::DeleteModify {
                        citation_key: key.clone(),
                        base: b.clone(),
                        local: None,
                        remote: Some(r.clone()),
                    });
                }
            }

            // Remote deleted.
            (Some(b), Some(l), None) => {
                if l == b {
                    plan.add_deleted_key(key.clone());
                } else {
                    conflicts.push(EntryConflict::DeleteModify {
                        citation_key: key.clone(),
                        base: b.clone(),
                        local: Some(l.clone()),
                        remote: None,
                    });
                }
            }

            (Some(b), Some(l), Some(r)) => diff_entry(key, b, l, r, &mut plan, &mut conflicts),
        }
    }

    tracing::debug!(
        patched = plan.field_patches().len(),
        added = plan.new_entries().len(),
        deleted = plan.deleted_entry_keys().len(),
        conflicts = conflicts.len(),
        "three-way analysis complete"
    );
    MergeAnalysis::new(plan, conflicts)
}

/// Per-field classification for an entry present on all three sides.
///
/// Every field of the union lands in exactly one bucket: consistent (no-op),
/// remote-only change (patch), local-only change (kept), or conflict. An
/// entry with any conflicting field is surfaced as one [`EntryConflict`]
/// carrying the full three versions, and contributes no patches; its clean
/// remote changes travel inside the conflict for the resolver to keep.
fn diff_entry(
    key: &CitationKey,
    base: &BibEntry,
    local: &BibEntry,
    remote: &BibEntry,
    plan: &mut MergePlan,
    conflicts: &mut Vec<EntryConflict>,
) {
    let (patches, conflicting) = classify_fields(base, local, remote);

    if conflicting.is_empty() {
        for (field, value) in patches {
            plan.add_patch(key.clone(), field, value);
        }
    } else {
        conflicts.push(EntryConflict::Fields {
            citation_key: key.clone(),
            base: base.clone(),
            local: local.clone(),
            remote: remote.clone(),
            fields: conflicting,
        });
    }
}

/// Bucket every field of the union into patches (remote-only changes) and
/// conflicting names; consistent and local-only fields need no output.
fn classify_fields(
    base: &BibEntry,
    local: &BibEntry,
    remote: &BibEntry,
) -> (Vec<(FieldName, Option<String>)>, Vec<FieldName>) {
    let field_names: BTreeSet<&FieldName> = base
        .field_names()
        .chain(local.field_names())
        .chain(remote.field_names())
        .collect();

    let mut patches: Vec<(FieldName, Option<String>)> = Vec::new();
    let mut conflicting: Vec<FieldName> = Vec::new();

    for field in field_names {
        let b = base.field(field);
        let l = local.field(field);
        let r = remote.field(field);

        if l == r {
            // Already consistent, including both-deleted and both-set-same.
        } else if l == b {
            // Remote-only change; None means remote deleted the field.
            patches.push((field.clone(), r.map(str::to_owned)));
        } else if r == b {
            // Local-only change, kept as-is.
        } else {
            conflicting.push(field.clone());
        }
    }

    (patches, conflicting)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(entries: impl IntoIterator<Item = BibEntry>) -> Snapshot {
        Snapshot::from_entries(entries).unwrap()
    }

    fn entry(key: &str, fields: &[(&str, &str)]) -> BibEntry {
        fields
            .iter()
            .fold(BibEntry::new(key), |e, (name, value)| e.with_field(*name, *value))
    }

    #[test]
    fn remote_only_field_change_becomes_patch() {
        let base = snapshot([entry("a", &[("title", "T1")])]);
        let local = base.clone();
        let remote = snapshot([entry("a", &[("title", "T2")])]);

        let analysis = analyze(Some(&base), &local, &remote);
        assert!(analysis.conflicts().is_empty());
        let patch = &analysis.auto_plan().field_patches()[&"a".into()];
        assert_eq!(patch[&"title".into()], Some("T2".to_owned()));
    }

    #[test]
    fn both_sides_changed_same_field_differently_is_conflict() {
        let base = snapshot([entry("a", &[("title", "T1")])]);
        let local = snapshot([entry("a", &[("title", "L2")])]);
        let remote = snapshot([entry("a", &[("title", "R2")])]);

        let analysis = analyze(Some(&base), &local, &remote);
        assert!(analysis.auto_plan().is_empty());
        assert_eq!(analysis.conflicts().len(), 1);
        match &analysis.conflicts()[0] {
            EntryConflict::Fields { fields, .. } => {
                assert_eq!(fields, &vec![FieldName::new("title")]);
            }
            other => panic!("expected field conflict, got {other:?}"),
        }
    }

    #[test]
    fn remote_added_entry_lands_in_new_entries() {
        let base = snapshot([]);
        let local = snapshot([]);
        let remote = snapshot([entry("b", &[("title", "B")])]);

        let analysis = analyze(Some(&base), &local, &remote);
        assert!(analysis.conflicts().is_empty());
        assert_eq!(analysis.auto_plan().new_entries().len(), 1);
        assert_eq!(
            analysis.auto_plan().new_entries()[0].citation_key().as_str(),
            "b"
        );
    }

    #[test]
    fn remote_deleted_unchanged_entry_is_auto_delete() {
        let base = snapshot([entry("c", &[("title", "C")])]);
        let local = base.clone();
        let remote = snapshot([]);

        let analysis = analyze(Some(&base), &local, &remote);
        assert!(analysis.conflicts().is_empty());
        assert_eq!(analysis.auto_plan().deleted_entry_keys(), &["c".into()]);
    }

    #[test]
    fn remote_deleted_locally_modified_entry_is_conflict_not_delete() {
        let base = snapshot([entry("a", &[("author", "base")])]);
        let local = snapshot([entry("a", &[("author", "local")])]);
        let remote = snapshot([]);

        let analysis = analyze(Some(&base), &local, &remote);
        assert_eq!(analysis.conflicts().len(), 1);
        assert!(
            !analysis
                .auto_plan()
                .deleted_entry_keys()
                .contains(&"a".into())
        );
        assert!(matches!(
            &analysis.conflicts()[0],
            EntryConflict::DeleteModify { remote: None, .. }
        ));
    }

    #[test]
    fn independent_identical_additions_merge_silently() {
        let local = snapshot([entry("a", &[("author", "same")])]);
        let remote = local.clone();

        let analysis = analyze(None, &local, &remote);
        assert!(analysis.is_noop());
    }

    #[test]
    fn independent_differing_additions_are_key_collision() {
        let local = snapshot([entry("a", &[("author", "local")])]);
        let remote = snapshot([entry("a", &[("author", "remote")])]);

        let analysis = analyze(None, &local, &remote);
        assert!(analysis.auto_plan().is_empty());
        assert!(matches!(
            &analysis.conflicts()[0],
            EntryConflict::KeyCollision { .. }
        ));
    }

    #[test]
    fn independent_additions_with_disjoint_fields_merge() {
        let local = snapshot([entry("a", &[("author", "local")])]);
        let remote = snapshot([entry("a", &[("journal", "J")])]);

        let analysis = analyze(None, &local, &remote);
        assert!(analysis.conflicts().is_empty());
        let patch = &analysis.auto_plan().field_patches()[&"a".into()];
        assert_eq!(patch[&"journal".into()], Some("J".to_owned()));
        assert!(!patch.contains_key(&"author".into()));
    }

    #[test]
    fn local_only_changes_produce_empty_plan() {
        let base = snapshot([entry("a", &[("author", "base")])]);
        let local = snapshot([entry("a", &[("author", "local")])]);
        let remote = base.clone();

        let analysis = analyze(Some(&base), &local, &remote);
        assert!(analysis.is_noop());
    }

    #[test]
    fn remote_field_deletion_patches_to_none() {
        let base = snapshot([entry("a", &[("author", "base"), ("note", "n")])]);
        let local = base.clone();
        let remote = snapshot([entry("a", &[("author", "base")])]);

        let analysis = analyze(Some(&base), &local, &remote);
        let patch = &analysis.auto_plan().field_patches()[&"a".into()];
        assert_eq!(patch[&"note".into()], None);
    }

    #[test]
    fn disjoint_field_edits_merge_without_conflict() {
        let base = snapshot([entry("a", &[("author", "base"), ("title", "A")])]);
        let local = snapshot([entry("a", &[("author", "local"), ("title", "A")])]);
        let remote = snapshot([entry("a", &[("author", "base"), ("title", "B")])]);

        let analysis = analyze(Some(&base), &local, &remote);
        assert!(analysis.conflicts().is_empty());
        let patch = &analysis.auto_plan().field_patches()[&"a".into()];
        assert_eq!(patch.len(), 1);
        assert_eq!(patch[&"title".into()], Some("B".to_owned()));
    }

    #[test]
    fn analysis_is_referentially_transparent() {
        let base = snapshot([entry("a", &[("author", "base")])]);
        let local = snapshot([entry("a", &[("author", "local")])]);
        let remote = snapshot([entry("a", &[("author", "remote")])]);

        let first = analyze(Some(&base), &local, &remote);
        let second = analyze(Some(&base), &local, &remote);
        assert_eq!(first.auto_plan(), second.auto_plan());
        assert_eq!(first.conflicts(), second.conflicts());
    }
}
