//! repo
//!
//! A repository instance: one object store plus one ref store.
//!
//! There is no process-wide repository handle. Each [`Repository`] is an
//! independent value, so several repositories (for example a local one and
//! the remotes of a [`LocalTransport`](crate::transport::LocalTransport))
//! can live side by side in one process. Cloning a `Repository` shares the
//! underlying stores.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::core::ops::lock::{LockError, RepoLock};
use crate::core::paths::RepoPaths;
use crate::core::types::{ObjectId, RefName};
use crate::history::HistoryGraph;
use crate::store::{
    FsObjectStore, FsRefStore, MemoryObjectStore, MemoryRefStore, ObjectStore, RefStore,
    StoreError,
};

/// Handle to one repository's object and ref stores.
#[derive(Debug, Clone)]
pub struct Repository {
    objects: Arc<dyn ObjectStore>,
    refs: Arc<dyn RefStore>,
    paths: Option<RepoPaths>,
}

impl Repository {
    /// A repository that lives only in memory.
    pub fn in_memory() -> Self {
        Self::from_stores(
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MemoryRefStore::new()),
        )
    }

    /// Assemble a repository from arbitrary store implementations.
    pub fn from_stores(objects: Arc<dyn ObjectStore>, refs: Arc<dyn RefStore>) -> Self {
        Self {
            objects,
            refs,
            paths: None,
        }
    }

    /// Create a new on-disk repository under `root/.treesync/`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyExists`] if `root` already holds a repository
    /// - [`StoreError::Io`] if the directories cannot be created
    pub fn init(root: &Path) -> Result<Self, StoreError> {
        let paths = RepoPaths::new(root.to_path_buf());
        if paths.exists() {
            return Err(StoreError::AlreadyExists {
                path: paths.meta_dir(),
            });
        }
        for dir in [paths.objects_dir(), paths.refs_dir().join("heads")] {
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(dir, e))?;
        }
        tracing::info!(root = %root.display(), "initialized repository");
        Ok(Self::on_disk(paths))
    }

    /// Open an existing on-disk repository.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotARepo`] if `root` has no `.treesync/` layout.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        let paths = RepoPaths::new(root.to_path_buf());
        if !paths.exists() {
            return Err(StoreError::NotARepo {
                path: root.to_path_buf(),
            });
        }
        Ok(Self::on_disk(paths))
    }

    fn on_disk(paths: RepoPaths) -> Self {
        Self {
            objects: Arc::new(FsObjectStore::new(paths.clone())),
            refs: Arc::new(FsRefStore::new(paths.clone())),
            paths: Some(paths),
        }
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn refs(&self) -> &Arc<dyn RefStore> {
        &self.refs
    }

    /// CAS-update `name` to `new` after checking `new` is a stored commit.
    ///
    /// Every ref written through here points at a commit this repository
    /// holds.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if `new` is not in the object store
    /// - [`StoreError::WrongKind`] if `new` is not a commit
    /// - [`StoreError::CasFailed`] if `name` no longer equals `expected_old`
    pub fn update_ref(
        &self,
        name: &RefName,
        new: &ObjectId,
        expected_old: Option<&ObjectId>,
    ) -> Result<(), StoreError> {
        self.objects.read_commit(new)?;
        self.refs.update(name, new, expected_old)
    }

    /// On-disk location, if this repository is backed by the filesystem.
    pub fn paths(&self) -> Option<&RepoPaths> {
        self.paths.as_ref()
    }

    /// Take the cross-process write lock.
    ///
    /// In-memory repositories have no lock file; their single-writer
    /// discipline comes from `&mut` access alone, so this returns `None`.
    pub fn lock(&self) -> Result<Option<RepoLock>, LockError> {
        self.paths.as_ref().map(RepoLock::acquire).transpose()
    }

    /// A history view whose `HEAD` is `head`.
    pub fn history(&self, head: RefName) -> HistoryGraph {
        HistoryGraph::new(Arc::clone(&self.objects), Arc::clone(&self.refs), head)
    }
}
