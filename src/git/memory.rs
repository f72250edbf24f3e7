//! In-memory backend for exercising the pipeline without a repository.
//!
//! Mirrors the [`GitBackend`] contract over a plain commit DAG. The "remote"
//! is simulated by a second ref namespace: `fetch` is a no-op (tests place
//! remote tracking refs directly) and `push` copies the local branch ref into
//! `refs/heads/<branch>` on the simulated remote side, rejecting
//! non-fast-forward moves the way a real remote would.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use git2::Oid;

use super::backend::GitBackend;
use super::error::BackendError;

#[derive(Clone, Debug)]
struct MemCommit {
    parents: Vec<Oid>,
    files: BTreeMap<String, Vec<u8>>,
    message: String,
}

#[derive(Default)]
struct Inner {
    commits: HashMap<Oid, MemCommit>,
    refs: BTreeMap<String, Oid>,
    next_oid: u64,
    fail_next_move_ref: bool,
}

/// Deterministic in-memory commit graph plus ref store.
#[derive(Default)]
pub struct MemoryBackend {
    inner: RefCell<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a commit writing `files` on top of the first parent's tree.
    pub fn commit_with(&self, parents: &[Oid], files: &[(&str, &[u8])], message: &str) -> Oid {
        let mut inner = self.inner.borrow_mut();
        let mut tree = parents
            .first()
            .and_then(|p| inner.commits.get(p))
            .map(|c| c.files.clone())
            .unwrap_or_default();
        for (path, content) in files {
            tree.insert((*path).to_owned(), content.to_vec());
        }
        let oid = mint_oid(&mut inner);
        inner.commits.insert(
            oid,
            MemCommit {
                parents: parents.to_vec(),
                files: tree,
                message: message.to_owned(),
            },
        );
        oid
    }

    pub fn set_ref(&self, refname: &str, target: Oid) {
        self.inner
            .borrow_mut()
            .refs
            .insert(refname.to_owned(), target);
    }

    /// Make the next `move_ref` fail, for atomicity tests.
    pub fn fail_next_move_ref(&self) {
        self.inner.borrow_mut().fail_next_move_ref = true;
    }

    pub fn parents_of(&self, commit: Oid) -> Vec<Oid> {
        self.inner
            .borrow()
            .commits
            .get(&commit)
            .map(|c| c.parents.clone())
            .unwrap_or_default()
    }

    pub fn message_of(&self, commit: Oid) -> Option<String> {
        self.inner
            .borrow()
            .commits
            .get(&commit)
            .map(|c| c.message.clone())
    }

    fn ancestors(&self, start: Oid) -> HashSet<Oid> {
        let inner = self.inner.borrow();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(oid) = queue.pop_front() {
            if seen.insert(oid)
                && let Some(commit) = inner.commits.get(&oid)
            {
                queue.extend(commit.parents.iter().copied());
            }
        }
        seen
    }
}

fn mint_oid(inner: &mut Inner) -> Oid {
    inner.next_oid += 1;
    let mut bytes = [0u8; 20];
    bytes[12..].copy_from_slice(&inner.next_oid.to_be_bytes());
    Oid::from_bytes(&bytes).expect("20 bytes form a valid oid")
}

impl GitBackend for MemoryBackend {
    fn head_of(&self, refname: &str) -> Result<Option<Oid>, BackendError> {
        Ok(self.inner.borrow().refs.get(refname).copied())
    }

    fn is_ancestor(&self, a: Oid, b: Oid) -> Result<bool, BackendError> {
        Ok(self.ancestors(b).contains(&a))
    }

    fn nearest_common_ancestor(&self, a: Oid, b: Oid) -> Result<Option<Oid>, BackendError> {
        let from_a = self.ancestors(a);
        // Breadth-first from b: the first commit also reachable from a is the
        // nearest common ancestor.
        let inner = self.inner.borrow();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([b]);
        while let Some(oid) = queue.pop_front() {
            if !seen.insert(oid) {
                continue;
            }
            if from_a.contains(&oid) {
                return Ok(Some(oid));
            }
            if let Some(commit) = inner.commits.get(&oid) {
                queue.extend(commit.parents.iter().copied());
            }
        }
        Ok(None)
    }

    fn read_content_at(&self, commit: Oid, path: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let inner = self.inner.borrow();
        let commit = inner
            .commits
            .get(&commit)
            .ok_or(BackendError::CommitNotFound(commit))?;
        Ok(commit.files.get(path).cloned())
    }

    fn create_commit(
        &self,
        parents: &[Oid],
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<Oid, BackendError> {
        {
            let inner = self.inner.borrow();
            for parent in parents {
                if !inner.commits.contains_key(parent) {
                    return Err(BackendError::CommitNotFound(*parent));
                }
            }
        }
        Ok(self.commit_with(parents, &[(path, content)], message))
    }

    fn move_ref(
        &self,
        refname: &str,
        target: Oid,
        _log_message: &str,
    ) -> Result<(), BackendError> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_next_move_ref {
            inner.fail_next_move_ref = false;
            return Err(BackendError::MoveRef {
                refname: refname.to_owned(),
                source: git2::Error::from_str("injected ref move failure"),
            });
        }
        inner.refs.insert(refname.to_owned(), target);
        Ok(())
    }

    fn fetch(&self, _branch: &str) -> Result<(), BackendError> {
        Ok(())
    }

    fn push(&self, branch: &str) -> Result<(), BackendError> {
        let local_ref = format!("refs/heads/{branch}");
        let remote_ref = format!("refs/memory-remote/{branch}");
        let source = self
            .head_of(&local_ref)?
            .ok_or_else(|| BackendError::RefNotFound(local_ref.clone()))?;
        if let Some(current) = self.head_of(&remote_ref)?
            && !self.is_ancestor(current, source)?
        {
            return Err(BackendError::NonFastForward);
        }
        self.inner.borrow_mut().refs.insert(remote_ref, source);
        Ok(())
    }
}
