//! sync::controller
//!
//! The `SyncController`: one repository, one transport, one working tree.
//!
//! # Concurrency
//!
//! Mutating operations (`commit_change`, `push`, `sync`) take `&mut self`
//! and, for on-disk repositories, hold the [`RepoLock`] for their duration,
//! so `commit_change` followed by `push` inside `sync` is one logical unit.
//! Read operations take `&self` and may run concurrently.
//!
//! # Example
//!
//! ```
//! use treesync::repo::Repository;
//! use treesync::sync::{SyncController, SyncOutcome, SyncSettings};
//! use treesync::transport::{LocalTransport, StaticCredentials};
//! use treesync::worktree::MemoryWorktree;
//!
//! let remote = Repository::in_memory();
//! let mut controller = SyncController::new(
//!     Repository::in_memory(),
//!     LocalTransport::new().with_remote("origin", remote),
//!     MemoryWorktree::new(),
//!     StaticCredentials::default(),
//!     SyncSettings::default(),
//! );
//!
//! let outcome = controller.sync("a.txt", b"hello", "init").unwrap();
//! assert!(matches!(outcome, SyncOutcome::Pushed { .. }));
//! assert_eq!(controller.file_at("HEAD", "a.txt").unwrap(), b"hello");
//! ```
//!
//! [`RepoLock`]: crate::core::ops::lock::RepoLock

use std::path::Path;

use super::report::ConflictReport;
use super::{SyncError, SyncOutcome, SyncPhase};
use crate::core::config::Config;
use crate::core::ops::lock::RepoLock;
use crate::core::paths::META_DIR;
use crate::core::types::{BranchName, ObjectId, RefName, RepoPath, UtcTimestamp};
use crate::diff::{DiffEntry, DiffOptions, TreeDiffer};
use crate::history::{Ancestors, HistoryError, HistoryGraph};
use crate::repo::Repository;
use crate::store::object::{Commit, EntryMode, Object, ObjectKind, Signature, Tree, TreeEntry};
use crate::store::StoreError;
use crate::transport::{
    CredentialSource, FetchSummary, PushOutcome, RefSpec, RejectReason, Transport, TransportError,
};
use crate::worktree::{FsWorktree, WorktreeWriter};

/// Settings a controller runs with, usually derived from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Default remote for `sync`.
    pub remote: String,
    /// Local branch `HEAD` stands for; pushed to the same-named remote branch.
    pub branch: BranchName,
    /// URL for listing remote branches.
    pub remote_url: Option<String>,
    pub author_name: String,
    pub author_email: String,
    pub diff: DiffOptions,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let (name, email) = Config::DEFAULT_AUTHOR;
        Self {
            remote: Config::DEFAULT_REMOTE.to_string(),
            branch: BranchName::default(),
            remote_url: None,
            author_name: name.to_string(),
            author_email: email.to_string(),
            diff: DiffOptions::default(),
        }
    }
}

impl SyncSettings {
    /// Resolve settings from merged configuration.
    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let (name, email) = config.author();
        Ok(Self {
            remote: config.remote().to_string(),
            branch: BranchName::new(config.branch())?,
            remote_url: config.remote_url().map(str::to_string),
            author_name: name.to_string(),
            author_email: email.to_string(),
            diff: DiffOptions {
                detect_renames: config.detect_renames(),
            },
        })
    }

    /// `refs/heads/<branch>`.
    pub fn head_ref(&self) -> RefName {
        RefName::for_branch(&self.branch)
    }
}

/// Orchestrates commits, pushes, and reconciliation for one repository.
pub struct SyncController {
    repo: Repository,
    history: HistoryGraph,
    transport: Box<dyn Transport>,
    worktree: Box<dyn WorktreeWriter>,
    credentials: Box<dyn CredentialSource>,
    settings: SyncSettings,
    phase: SyncPhase,
}

impl std::fmt::Debug for SyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncController")
            .field("repo", &self.repo)
            .field("transport", &self.transport.name())
            .field("settings", &self.settings)
            .field("phase", &self.phase)
            .finish()
    }
}

impl SyncController {
    pub fn new(
        repo: Repository,
        transport: impl Transport + 'static,
        worktree: impl WorktreeWriter + 'static,
        credentials: impl CredentialSource + 'static,
        settings: SyncSettings,
    ) -> Self {
        let history = repo.history(settings.head_ref());
        Self {
            repo,
            history,
            transport: Box::new(transport),
            worktree: Box::new(worktree),
            credentials: Box::new(credentials),
            settings,
            phase: SyncPhase::Idle,
        }
    }

    /// Open the on-disk repository at `root`, writing files into `root` and
    /// taking settings from the global and repository configuration.
    pub fn open(
        root: &Path,
        transport: impl Transport + 'static,
        credentials: impl CredentialSource + 'static,
    ) -> Result<Self, SyncError> {
        let repo = Repository::open(root)?;
        let config = Config::load(Some(root))?.config;
        let settings = SyncSettings::from_config(&config)?;
        Ok(Self::new(
            repo,
            transport,
            FsWorktree::new(root),
            credentials,
            settings,
        ))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn history(&self) -> &HistoryGraph {
        &self.history
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Phase of the most recent attempt.
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Current local `HEAD`, or `None` on an unborn branch.
    pub fn head(&self) -> Result<Option<ObjectId>, SyncError> {
        Ok(self.history.head()?)
    }

    fn lock(&self) -> Result<Option<RepoLock>, SyncError> {
        Ok(self.repo.lock()?)
    }

    /// Record `Failed` if `result` is an error.
    fn track<T>(&mut self, result: Result<T, SyncError>) -> Result<T, SyncError> {
        if result.is_err() {
            self.phase = SyncPhase::Failed;
        }
        result
    }

    // -------------------------------------------------------------------
    // Mutating operations
    // -------------------------------------------------------------------

    /// Write `content` at `path`, commit it on top of `HEAD`, and advance `HEAD`.
    ///
    /// Sibling entries at every level of the tree are carried over unchanged.
    /// On any error `HEAD` is left where it was.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidPath`] for malformed paths or file/directory collisions
    /// - [`SyncError::Write`] if the working-tree or object write fails
    pub fn commit_change(
        &mut self,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<ObjectId, SyncError> {
        self.phase = SyncPhase::Editing;
        let result = self
            .lock()
            .and_then(|_lock| self.commit_locked(path, content, message));
        self.track(result)
    }

    fn commit_locked(
        &mut self,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<ObjectId, SyncError> {
        self.phase = SyncPhase::Editing;
        let path = RepoPath::new(path)?;
        if path.components().next() == Some(META_DIR) {
            return Err(SyncError::InvalidPath(format!(
                "{path} is inside the repository metadata directory"
            )));
        }

        self.worktree.write(&path, content)?;

        let objects = self.repo.objects();
        let parent = self.history.head()?;
        let base = match &parent {
            Some(id) => objects.read_tree(&self.history.commit(id)?.tree)?,
            None => Tree::empty(),
        };

        let blob = objects.put_blob(content).map_err(SyncError::from_write)?;
        let components: Vec<&str> = path.components().collect();
        let tree = self.write_path(base, &components, blob)?;

        let signature = Signature::new(
            self.settings.author_name.as_str(),
            self.settings.author_email.as_str(),
            UtcTimestamp::now(),
        )?;
        let commit = Object::Commit(Commit {
            tree,
            parents: parent.into_iter().collect(),
            author: signature.clone(),
            committer: signature,
            message: message.to_string(),
        });
        let id = objects.put(&commit).map_err(SyncError::from_write)?;

        // Single commit point: nothing above is referenced until this succeeds.
        self.repo
            .update_ref(self.history.head_ref(), &id, parent.as_ref())
            .map_err(SyncError::from_write)?;

        self.phase = SyncPhase::Committed;
        tracing::info!(
            commit = %id.short(12),
            path = %path,
            branch = %self.settings.branch,
            "committed change"
        );
        Ok(id)
    }

    /// Store `tree` with `blob` placed at `components`, creating or
    /// replacing sub-trees along the way. Children are stored before parents.
    fn write_path(
        &self,
        tree: Tree,
        components: &[&str],
        blob: ObjectId,
    ) -> Result<ObjectId, SyncError> {
        let objects = self.repo.objects();
        let Some((name, rest)) = components.split_first() else {
            return Err(SyncError::InvalidPath("empty path".into()));
        };
        let existing = tree.get(name);

        let entry = if rest.is_empty() {
            let mode = match existing {
                Some(e) if e.is_dir() => {
                    return Err(SyncError::InvalidPath(format!(
                        "'{name}' is a directory"
                    )));
                }
                Some(e) => e.mode,
                None => EntryMode::File,
            };
            TreeEntry::new(*name, mode, blob)?
        } else {
            let sub = match existing {
                Some(e) if e.is_dir() => objects.read_tree(&e.target)?,
                Some(_) => {
                    return Err(SyncError::InvalidPath(format!("'{name}' is a file")));
                }
                None => Tree::empty(),
            };
            let sub = self.write_path(sub, rest, blob)?;
            TreeEntry::new(*name, EntryMode::Directory, sub)?
        };

        objects
            .put(&Object::Tree(tree.with_entry(entry)))
            .map_err(SyncError::from_write)
    }

    /// Push local `HEAD` to the same-named branch on `remote`.
    ///
    /// A rejection is reconciled into [`SyncOutcome::Conflicted`]; a transport
    /// failure is returned verbatim as [`SyncOutcome::Failed`]. Neither is an
    /// `Err`.
    pub fn push(&mut self, remote: &str) -> Result<SyncOutcome, SyncError> {
        let result = self.lock().and_then(|_lock| self.push_locked(remote));
        self.track(result)
    }

    fn push_locked(&mut self, remote: &str) -> Result<SyncOutcome, SyncError> {
        self.phase = SyncPhase::PushAttempted;
        let local_head = self.history.head()?.ok_or_else(|| {
            SyncError::InvalidReference(format!("{} is unborn", self.history.head_ref()))
        })?;

        let credentials = match self.credentials.credentials(remote) {
            Ok(credentials) => credentials,
            Err(e) => return Ok(self.failed(remote, TransportError::AuthFailed(e.to_string()))),
        };

        let spec = RefSpec::for_branch(&self.settings.branch);
        match self.transport.push(&self.repo, remote, &spec, &credentials) {
            Ok(PushOutcome::Accepted { new_head, .. }) => {
                self.phase = SyncPhase::Pushed;
                tracing::info!(remote, head = %new_head.short(12), "push accepted");
                Ok(SyncOutcome::Pushed { head: new_head })
            }
            Ok(PushOutcome::Rejected(reason)) => {
                tracing::warn!(remote, %reason, "push rejected");
                self.reconcile(remote, reason, local_head)
            }
            Err(e) => Ok(self.failed(remote, e)),
        }
    }

    fn failed(&mut self, remote: &str, err: TransportError) -> SyncOutcome {
        tracing::warn!(remote, error = %err, "transport failure");
        self.phase = SyncPhase::Failed;
        SyncOutcome::Failed(err)
    }

    /// Fetch the remote and describe how it differs from `local_head`.
    fn reconcile(
        &mut self,
        remote: &str,
        reason: RejectReason,
        local_head: ObjectId,
    ) -> Result<SyncOutcome, SyncError> {
        if let Err(e) = self.transport.fetch(&self.repo, remote) {
            return Ok(self.failed(remote, e));
        }

        let tracking = RefName::for_remote_branch(remote, &self.settings.branch)?;
        let remote_head = self.repo.refs().read(&tracking)?;

        let local_tree = self.history.commit(&local_head)?.tree;
        let (remote_tree, merge_base, ahead, behind) = match &remote_head {
            Some(theirs) => {
                let (ahead, behind) = self.history.ahead_behind(&local_head, theirs)?;
                (
                    Some(self.history.commit(theirs)?.tree),
                    self.history.merge_base(&local_head, theirs)?,
                    ahead,
                    behind,
                )
            }
            None => (None, None, self.history.reachable(&local_head)?.len(), 0),
        };

        let entries = self.differ().diff(Some(&local_tree), remote_tree.as_ref())?;

        self.phase = SyncPhase::Conflicted;
        tracing::info!(
            remote,
            ahead,
            behind,
            paths = entries.len(),
            "reconciliation report ready"
        );
        Ok(SyncOutcome::Conflicted(ConflictReport {
            remote: remote.to_string(),
            reason,
            local_head,
            remote_head,
            merge_base,
            ahead,
            behind,
            entries,
        }))
    }

    /// `commit_change` then `push` to the configured remote, as one unit
    /// under the repository lock.
    pub fn sync(&mut self, path: &str, content: &[u8], message: &str) -> Result<SyncOutcome, SyncError> {
        self.phase = SyncPhase::Editing;
        let remote = self.settings.remote.clone();
        let result = self.lock().and_then(|_lock| {
            self.commit_locked(path, content, message)?;
            self.push_locked(&remote)
        });
        self.track(result)
    }

    // -------------------------------------------------------------------
    // Read-only queries
    // -------------------------------------------------------------------

    fn differ(&self) -> TreeDiffer<'_> {
        TreeDiffer::new(self.repo.objects().as_ref(), self.settings.diff)
    }

    /// Tree of the commit `rev` names, or the tree itself for `<rev>^{tree}`.
    fn tree_of(&self, rev: &str) -> Result<ObjectId, SyncError> {
        let id = self.history.resolve(rev)?;
        match self.history.commit(&id) {
            Ok(commit) => Ok(commit.tree),
            Err(HistoryError::Store(StoreError::WrongKind {
                actual: ObjectKind::Tree,
                ..
            })) => Ok(id),
            Err(e) => Err(e.into()),
        }
    }

    /// Update the tracking refs of `remote` under the repository lock.
    pub fn fetch(&self, remote: &str) -> Result<FetchSummary, SyncError> {
        let _lock = self.lock()?;
        Ok(self.transport.fetch(&self.repo, remote)?)
    }

    /// First-parent history from `rev`, newest first. Lazy and restartable.
    pub fn history_of(&self, rev: &str) -> Result<Ancestors<'_>, SyncError> {
        let id = self.history.resolve(rev)?;
        self.history.commit(&id)?;
        Ok(self.history.ancestors_of(&id))
    }

    /// Changes from `rev` (old side) to local `HEAD` (new side).
    pub fn diff_against(&self, rev: &str) -> Result<Vec<DiffEntry>, SyncError> {
        self.diff_revisions(rev, "HEAD")
    }

    /// Changes between two arbitrary revisions.
    pub fn diff_revisions(&self, old: &str, new: &str) -> Result<Vec<DiffEntry>, SyncError> {
        let old = self.tree_of(old)?;
        let new = self.tree_of(new)?;
        Ok(self.differ().diff(Some(&old), Some(&new))?)
    }

    /// Changes introduced by one commit relative to its first parent.
    /// A root commit is compared with the empty tree.
    pub fn changes_in(&self, rev: &str) -> Result<Vec<DiffEntry>, SyncError> {
        let id = self.history.resolve(rev)?;
        let commit = self.history.commit(&id)?;
        let parent_tree = match commit.first_parent() {
            Some(parent) => Some(self.history.commit(parent)?.tree),
            None => None,
        };
        Ok(self.differ().diff(parent_tree.as_ref(), Some(&commit.tree))?)
    }

    /// Content of `path` as of `rev`.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotFound`] if the path does not exist at that revision
    /// - [`SyncError::InvalidPath`] if it names a directory
    pub fn file_at(&self, rev: &str, path: &str) -> Result<Vec<u8>, SyncError> {
        let path = RepoPath::new(path)?;
        let objects = self.repo.objects();
        let mut tree = objects.read_tree(&self.tree_of(rev)?)?;
        let mut components = path.components().peekable();

        while let Some(name) = components.next() {
            let entry = tree
                .get(name)
                .ok_or_else(|| SyncError::NotFound(format!("{path} at {rev}")))?;
            let last = components.peek().is_none();
            match (last, entry.is_dir()) {
                (true, false) => return Ok(objects.read_blob(&entry.target)?.into_bytes()),
                (true, true) => {
                    return Err(SyncError::InvalidPath(format!("{path} is a directory at {rev}")))
                }
                (false, true) => tree = objects.read_tree(&entry.target)?,
                (false, false) => return Err(SyncError::NotFound(format!("{path} at {rev}"))),
            }
        }
        Err(SyncError::NotFound(format!("{path} at {rev}")))
    }

    /// Fetch `remote`, then walk its `branch` from the tracking ref.
    pub fn remote_history(&self, remote: &str, branch: &str) -> Result<Ancestors<'_>, SyncError> {
        self.fetch(remote)?;
        let tracking = RefName::for_remote_branch(remote, &BranchName::new(branch)?)?;
        self.history_of(tracking.as_str())
    }

    /// Branch names advertised at `url`, or at the configured `remote_url`.
    pub fn list_remote_branches(&self, url: Option<&str>) -> Result<Vec<BranchName>, SyncError> {
        let url = url
            .or(self.settings.remote_url.as_deref())
            .ok_or_else(|| SyncError::InvalidReference("no remote url configured".into()))?;
        let credentials = self
            .credentials
            .credentials(url)
            .map_err(|e| TransportError::AuthFailed(e.to_string()))?;
        let refs = self.transport.list_remote_refs(url, &credentials)?;
        Ok(refs.into_iter().filter_map(|r| r.name.branch()).collect())
    }
}
