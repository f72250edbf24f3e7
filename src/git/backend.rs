//! Version-control backend contract and its git2 implementation.
//!
//! The merge pipeline only ever touches the repository through [`GitBackend`]:
//! ancestry queries, content reads at a commit, and the two write primitives
//! "create commit" and "move ref". Keeping the surface this small is what
//! lets the pipeline run unchanged against [`crate::git::MemoryBackend`] in
//! tests.

use std::path::Path;

use git2::{ErrorCode, ObjectType, Oid, Repository, Signature};

use super::error::{BackendError, SyncError};
use crate::config::SyncConfig;

/// Operational contract of the commit-graph store.
///
/// Implementations must guarantee that `create_commit` and `move_ref` are
/// individually atomic; the bookkeeper sequences them so that a failure
/// between the two leaves no observable repository change.
pub trait GitBackend {
    /// Resolve a fully-qualified refname to its commit, if the ref exists.
    fn head_of(&self, refname: &str) -> Result<Option<Oid>, BackendError>;

    /// Whether `a` is an ancestor of (or equal to) `b`.
    fn is_ancestor(&self, a: Oid, b: Oid) -> Result<bool, BackendError>;

    /// Nearest common ancestor of two commits, absent for unrelated histories.
    fn nearest_common_ancestor(&self, a: Oid, b: Oid) -> Result<Option<Oid>, BackendError>;

    /// Bytes of `path` in the tree of `commit`, absent if the path is not there.
    fn read_content_at(&self, commit: Oid, path: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Write `content` at `path` on top of the first parent's tree and commit.
    ///
    /// Does not move any ref.
    fn create_commit(
        &self,
        parents: &[Oid],
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<Oid, BackendError>;

    /// Atomically point `refname` at `target`.
    fn move_ref(&self, refname: &str, target: Oid, log_message: &str)
    -> Result<(), BackendError>;

    /// Update the remote tracking ref for `branch` from the remote.
    fn fetch(&self, branch: &str) -> Result<(), BackendError>;

    /// Publish the local `branch` to the remote.
    fn push(&self, branch: &str) -> Result<(), BackendError>;
}

// =============================================================================
// Production implementation over git2
// =============================================================================

/// [`GitBackend`] over an on-disk repository.
pub struct Git2Backend {
    repo: Repository,
    remote_name: String,
    author_name: String,
    author_email: String,
}

impl Git2Backend {
    pub fn open(path: &Path, config: &SyncConfig) -> Result<Self, SyncError> {
        let repo =
            Repository::open(path).map_err(|e| SyncError::OpenRepo(path.to_path_buf(), e))?;
        Ok(Self::new(repo, config))
    }

    pub fn new(repo: Repository, config: &SyncConfig) -> Self {
        Self {
            repo,
            remote_name: config.remote_name.clone(),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
        }
    }

    fn signature(&self) -> Result<Signature<'_>, BackendError> {
        Ok(Signature::now(&self.author_name, &self.author_email)?)
    }

    fn callbacks(&self) -> git2::RemoteCallbacks<'_> {
        let cfg = self.repo.config().ok();
        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(move |url, username_from_url, allowed| {
            if allowed.is_ssh_key()
                && let Some(user) = username_from_url
            {
                return git2::Cred::ssh_key_from_agent(user);
            }
            if allowed.is_user_pass_plaintext()
                && let Some(ref cfg) = cfg
                && let Ok(cred) = git2::Cred::credential_helper(cfg, url, username_from_url)
            {
                return Ok(cred);
            }
            git2::Cred::default()
        });
        callbacks
    }
}

impl GitBackend for Git2Backend {
    fn head_of(&self, refname: &str) -> Result<Option<Oid>, BackendError> {
        match self.repo.refname_to_id(refname) {
            Ok(oid) => Ok(Some(oid)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(BackendError::Git(e)),
        }
    }

    fn is_ancestor(&self, a: Oid, b: Oid) -> Result<bool, BackendError> {
        if a == b {
            return Ok(true);
        }
        Ok(self.repo.graph_descendant_of(b, a)?)
    }

    fn nearest_common_ancestor(&self, a: Oid, b: Oid) -> Result<Option<Oid>, BackendError> {
        match self.repo.merge_base(a, b) {
            Ok(base) => Ok(Some(base)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(BackendError::Git(e)),
        }
    }

    fn read_content_at(&self, commit: Oid, path: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let commit = self
            .repo
            .find_commit(commit)
            .map_err(|_| BackendError::CommitNotFound(commit))?;
        let tree = commit.tree()?;
        let Some(entry) = tree.get_name(path) else {
            return Ok(None);
        };
        let blob = self
            .repo
            .find_object(entry.id(), Some(ObjectType::Blob))?
            .peel_to_blob()
            .map_err(|_| BackendError::NotABlob {
                path: path.to_owned(),
            })?;
        Ok(Some(blob.content().to_vec()))
    }

    fn create_commit(
        &self,
        parents: &[Oid],
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<Oid, BackendError> {
        let parent_commits: Vec<_> = parents
            .iter()
            .map(|&oid| {
                self.repo
                    .find_commit(oid)
                    .map_err(|_| BackendError::CommitNotFound(oid))
            })
            .collect::<Result<_, _>>()?;

        // Carry the first parent's tree so the repository's other files
        // survive the merge commit.
        let base_tree = match parent_commits.first() {
            Some(parent) => Some(parent.tree()?),
            None => None,
        };
        let blob_oid = self.repo.blob(content)?;
        let mut builder = self.repo.treebuilder(base_tree.as_ref())?;
        builder.insert(path, blob_oid, 0o100644)?;
        let tree_oid = builder.write()?;
        let tree = self.repo.find_tree(tree_oid)?;

        let sig = self.signature()?;
        let parent_refs: Vec<_> = parent_commits.iter().collect();
        Ok(self
            .repo
            .commit(None, &sig, &sig, message, &tree, &parent_refs)?)
    }

    fn move_ref(
        &self,
        refname: &str,
        target: Oid,
        log_message: &str,
    ) -> Result<(), BackendError> {
        self.repo
            .reference(refname, target, true, log_message)
            .map_err(|source| BackendError::MoveRef {
                refname: refname.to_owned(),
                source,
            })?;
        Ok(())
    }

    fn fetch(&self, branch: &str) -> Result<(), BackendError> {
        let mut remote = self
            .repo
            .find_remote(&self.remote_name)
            .map_err(BackendError::Fetch)?;
        let mut fo = git2::FetchOptions::new();
        fo.remote_callbacks(self.callbacks());
        let refspec = format!(
            "refs/heads/{branch}:refs/remotes/{}/{branch}",
            self.remote_name
        );
        remote
            .fetch(&[&refspec], Some(&mut fo), None)
            .map_err(BackendError::Fetch)
    }

    fn push(&self, branch: &str) -> Result<(), BackendError> {
        use std::cell::RefCell;

        let mut remote = self
            .repo
            .find_remote(&self.remote_name)
            .map_err(BackendError::Push)?;
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        let push_error: RefCell<Option<String>> = RefCell::new(None);

        {
            let mut callbacks = self.callbacks();
            callbacks.push_update_reference(|_ref_name, status| {
                if let Some(msg) = status {
                    *push_error.borrow_mut() = Some(msg.to_owned());
                }
                Ok(())
            });
            let mut push_options = git2::PushOptions::new();
            push_options.remote_callbacks(callbacks);

            if let Err(e) = remote.push(&[&refspec], Some(&mut push_options)) {
                let msg = e.to_string();
                if msg.contains("non-fast-forward")
                    || msg.contains("fetch first")
                    || msg.contains("cannot lock ref")
                    || msg.contains("failed to update ref")
                {
                    return Err(BackendError::NonFastForward);
                }
                return Err(BackendError::Push(e));
            }
        }

        if let Some(message) = push_error.into_inner() {
            if message.contains("non-fast-forward") || message.contains("fetch first") {
                return Err(BackendError::NonFastForward);
            }
            return Err(BackendError::PushRejected { message });
        }
        Ok(())
    }
}
