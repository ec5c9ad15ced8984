//! worktree
//!
//! Writers for working-tree content.
//!
//! `commit_change` writes the new content through a [`WorktreeWriter`]
//! before staging it. A failed write aborts the commit.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::core::types::RepoPath;

/// Errors from writing working-tree files.
#[derive(Debug, Error)]
pub enum WorktreeError {
    /// The path collides with existing content (a file where a directory
    /// is needed, or the reverse).
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: RepoPath, reason: String },

    /// Filesystem error.
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Destination for working-tree content.
pub trait WorktreeWriter: Send + Sync + std::fmt::Debug {
    fn write(&mut self, path: &RepoPath, bytes: &[u8]) -> Result<(), WorktreeError>;
}

/// Writes files below a root directory, creating parent directories.
#[derive(Debug, Clone)]
pub struct FsWorktree {
    root: PathBuf,
}

impl FsWorktree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn target(&self, path: &RepoPath) -> PathBuf {
        let mut target = self.root.clone();
        target.extend(path.components());
        target
    }
}

impl WorktreeWriter for FsWorktree {
    fn write(&mut self, path: &RepoPath, bytes: &[u8]) -> Result<(), WorktreeError> {
        let target = self.target(path);
        if target.is_dir() {
            return Err(WorktreeError::InvalidPath {
                path: path.clone(),
                reason: "a directory exists at this path".into(),
            });
        }
        if let Some(parent) = target.parent() {
            let blocked = parent
                .ancestors()
                .take_while(|dir| dir.starts_with(&self.root))
                .any(|dir| dir.is_file());
            if blocked {
                return Err(WorktreeError::InvalidPath {
                    path: path.clone(),
                    reason: "a parent component is a file".into(),
                });
            }
            fs::create_dir_all(parent).map_err(|source| WorktreeError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&target, bytes).map_err(|source| WorktreeError::Io {
            path: target,
            source,
        })
    }
}

/// Keeps written files in memory.
///
/// Clones share the same files, so a handle kept by a test observes writes
/// made through a clone owned by a controller.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorktree {
    files: Arc<RwLock<BTreeMap<RepoPath, Vec<u8>>>>,
}

impl MemoryWorktree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content last written at `path`.
    pub fn read(&self, path: &RepoPath) -> Option<Vec<u8>> {
        self.files.read().get(path).cloned()
    }

    /// Every written path, sorted.
    pub fn paths(&self) -> Vec<RepoPath> {
        self.files.read().keys().cloned().collect()
    }
}

impl WorktreeWriter for MemoryWorktree {
    fn write(&mut self, path: &RepoPath, bytes: &[u8]) -> Result<(), WorktreeError> {
        let mut files = self.files.write();

        let mut parent = path.parent();
        while let Some(dir) = parent {
            if files.contains_key(&dir) {
                return Err(WorktreeError::InvalidPath {
                    path: path.clone(),
                    reason: format!("{dir} is a file"),
                });
            }
            parent = dir.parent();
        }
        let below = format!("{path}/");
        if files.keys().any(|p| p.as_str().starts_with(&below)) {
            return Err(WorktreeError::InvalidPath {
                path: path.clone(),
                reason: "a directory exists at this path".into(),
            });
        }

        files.insert(path.clone(), bytes.to_vec());
        Ok(())
    }
}
