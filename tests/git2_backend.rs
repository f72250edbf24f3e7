//! Git2Backend contract against real temporary repositories.

use bibgit::git::wire::serialize_snapshot;
use bibgit::{
    BibEntry, FinalizeResult, Git2Backend, GitBackend, GitSyncService, MergeContext,
    NoConflictsExpected, Snapshot, SyncConfig,
};
use git2::{Oid, Repository};
use tempfile::TempDir;

const PATH: &str = "library.jsonl";
const LOCAL_REF: &str = "refs/heads/main";
const REMOTE_REF: &str = "refs/remotes/origin/main";

fn repo() -> (TempDir, Git2Backend) {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init_bare(dir.path()).unwrap();
    let backend = Git2Backend::new(repo, &SyncConfig::default());
    (dir, backend)
}

fn entry(key: &str, fields: &[(&str, &str)]) -> BibEntry {
    fields
        .iter()
        .fold(
            BibEntry::new(key).with_entry_type("article"),
            |e, (name, value)| e.with_field(*name, *value),
        )
}

fn bytes(entries: &[BibEntry]) -> Vec<u8> {
    serialize_snapshot(&Snapshot::from_entries(entries.iter().cloned()).unwrap()).unwrap()
}

fn commit(backend: &Git2Backend, parents: &[Oid], entries: &[BibEntry], msg: &str) -> Oid {
    backend
        .create_commit(parents, PATH, &bytes(entries), msg)
        .unwrap()
}

#[test]
fn head_of_missing_ref_is_none() {
    let (_dir, backend) = repo();
    assert_eq!(backend.head_of(LOCAL_REF).unwrap(), None);
}

#[test]
fn move_ref_and_head_of_round_trip() {
    let (_dir, backend) = repo();
    let oid = commit(&backend, &[], &[entry("a", &[("title", "T")])], "init");
    backend.move_ref(LOCAL_REF, oid, "test").unwrap();
    assert_eq!(backend.head_of(LOCAL_REF).unwrap(), Some(oid));
}

#[test]
fn ancestry_and_merge_base_queries() {
    let (_dir, backend) = repo();
    let base = commit(&backend, &[], &[entry("a", &[("title", "0")])], "base");
    let left = commit(&backend, &[base], &[entry("a", &[("title", "l")])], "left");
    let right = commit(&backend, &[base], &[entry("a", &[("title", "r")])], "right");

    assert!(backend.is_ancestor(base, left).unwrap());
    assert!(backend.is_ancestor(left, left).unwrap());
    assert!(!backend.is_ancestor(left, right).unwrap());
    assert_eq!(
        backend.nearest_common_ancestor(left, right).unwrap(),
        Some(base)
    );
}

#[test]
fn read_content_at_returns_blob_bytes() {
    let (_dir, backend) = repo();
    let content = bytes(&[entry("a", &[("title", "T")])]);
    let oid = backend.create_commit(&[], PATH, &content, "init").unwrap();

    assert_eq!(backend.read_content_at(oid, PATH).unwrap(), Some(content));
    assert_eq!(backend.read_content_at(oid, "absent.jsonl").unwrap(), None);
}

#[test]
fn create_commit_preserves_sibling_files() {
    let (_dir, backend) = repo();
    let first = backend.create_commit(&[], "other.txt", b"keep me", "init").unwrap();
    let second = backend
        .create_commit(&[first], PATH, b"library", "add library")
        .unwrap();

    assert_eq!(
        backend.read_content_at(second, "other.txt").unwrap(),
        Some(b"keep me".to_vec())
    );
}

#[test]
fn behind_pull_fast_forwards_real_repository() {
    let (_dir, backend) = repo();
    let base = commit(&backend, &[], &[entry("a", &[("title", "T1")])], "base");
    let remote = commit(&backend, &[base], &[entry("a", &[("title", "T2")])], "remote");
    backend.move_ref(LOCAL_REF, base, "seed").unwrap();
    backend.move_ref(REMOTE_REF, remote, "seed").unwrap();

    // No 'origin' remote exists, so the fetch is a logged best-effort miss.
    let service = GitSyncService::new(&backend, SyncConfig::default());
    let result = service
        .pull(&MergeContext::new("main", PATH), &NoConflictsExpected)
        .unwrap();

    assert!(result.is_successful());
    assert_eq!(result.outcome(), Some(FinalizeResult::FastForward));
    assert_eq!(backend.head_of(LOCAL_REF).unwrap(), Some(remote));
}

#[test]
fn diverged_pull_creates_two_parent_commit_in_real_repository() {
    let (dir, backend) = repo();
    let base = commit(&backend, &[], &[entry("a", &[("title", "T1")])], "base");
    let local = commit(
        &backend,
        &[base],
        &[entry("a", &[("title", "T1"), ("year", "2025")])],
        "local",
    );
    let remote = commit(&backend, &[base], &[entry("a", &[("title", "T2")])], "remote");
    backend.move_ref(LOCAL_REF, local, "seed").unwrap();
    backend.move_ref(REMOTE_REF, remote, "seed").unwrap();

    let service = GitSyncService::new(&backend, SyncConfig::default());
    let result = service
        .pull(&MergeContext::new("main", PATH), &NoConflictsExpected)
        .unwrap();

    let booked = result.outcome().unwrap().new_commit_id().unwrap();
    let reopened = Repository::open_bare(dir.path()).unwrap();
    let commit = reopened.find_commit(booked).unwrap();
    let parents: Vec<_> = commit.parent_ids().collect();
    assert_eq!(parents, vec![local, remote]);
    assert!(commit.message().unwrap().starts_with("bibgit(sync):"));
    assert_eq!(reopened.refname_to_id(LOCAL_REF).unwrap(), booked);
}
