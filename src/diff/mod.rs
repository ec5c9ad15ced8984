//! diff
//!
//! Path-level differences between two tree snapshots.
//!
//! # Algorithm
//!
//! [`TreeDiffer`] walks both trees' entries in lock-step at each directory
//! level. Entries are kept in canonical order (directories sort as if their
//! name ended in `/`), so two position pointers suffice:
//!
//! | Situation | Result |
//! |---|---|
//! | only in old | `Delete` (directories expanded to their files) |
//! | only in new | `Add` (directories expanded to their files) |
//! | both, same id and mode | nothing |
//! | both files, different id or mode | `Modify` |
//! | both directories, different id | recurse |
//!
//! A file replaced by a directory of the same name (or the reverse) does not
//! line up under that order, so it falls out as a `Delete` plus `Add`s.
//! Sub-trees are read from the object store only when the walk needs them.
//!
//! With [`DiffOptions::detect_renames`], a deleted file and an added file at
//! the same directory level with identical content are reported as one
//! `Rename`.
//!
//! The result is sorted by path.

mod differ;

use serde::Serialize;
use thiserror::Error;

use crate::core::types::{ObjectId, RepoPath, TypeError};
use crate::store::object::EntryMode;
use crate::store::StoreError;

pub use differ::TreeDiffer;

/// Errors from computing a diff.
#[derive(Debug, Error)]
pub enum DiffError {
    /// A tree could not be loaded.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A tree entry name did not form a valid path.
    #[error(transparent)]
    InvalidPath(#[from] TypeError),
}

/// Diff behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Pair same-content deletes and adds at one directory level as renames.
    pub detect_renames: bool,
}

/// Kind of change at one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Add,
    Modify,
    Delete,
    Rename,
}

impl ChangeType {
    /// One-letter status code, as in `git diff --name-status`.
    pub fn code(&self) -> char {
        match self {
            ChangeType::Add => 'A',
            ChangeType::Modify => 'M',
            ChangeType::Delete => 'D',
            ChangeType::Rename => 'R',
        }
    }
}

/// One path-level change.
///
/// `old_*` fields are `None` for `Add`; `new_*` fields are `None` for `Delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    pub change: ChangeType,
    pub old_path: Option<RepoPath>,
    pub new_path: Option<RepoPath>,
    pub old_id: Option<ObjectId>,
    pub new_id: Option<ObjectId>,
    pub old_mode: Option<EntryMode>,
    pub new_mode: Option<EntryMode>,
}

impl DiffEntry {
    pub fn added(path: RepoPath, id: ObjectId, mode: EntryMode) -> Self {
        Self {
            change: ChangeType::Add,
            old_path: None,
            new_path: Some(path),
            old_id: None,
            new_id: Some(id),
            old_mode: None,
            new_mode: Some(mode),
        }
    }

    pub fn deleted(path: RepoPath, id: ObjectId, mode: EntryMode) -> Self {
        Self {
            change: ChangeType::Delete,
            old_path: Some(path),
            new_path: None,
            old_id: Some(id),
            new_id: None,
            old_mode: Some(mode),
            new_mode: None,
        }
    }

    pub fn modified(
        path: RepoPath,
        old: (ObjectId, EntryMode),
        new: (ObjectId, EntryMode),
    ) -> Self {
        Self {
            change: ChangeType::Modify,
            old_path: Some(path.clone()),
            new_path: Some(path),
            old_id: Some(old.0),
            new_id: Some(new.0),
            old_mode: Some(old.1),
            new_mode: Some(new.1),
        }
    }

    /// Merge a delete and an add into one rename.
    pub(crate) fn renamed(deleted: DiffEntry, added: DiffEntry) -> Self {
        Self {
            change: ChangeType::Rename,
            old_path: deleted.old_path,
            new_path: added.new_path,
            old_id: deleted.old_id,
            new_id: added.new_id,
            old_mode: deleted.old_mode,
            new_mode: added.new_mode,
        }
    }

    /// The path this entry is ordered by: the new path, or the old one for deletes.
    pub fn path(&self) -> Option<&RepoPath> {
        self.new_path.as_ref().or(self.old_path.as_ref())
    }
}

impl std::fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.change, &self.old_path, &self.new_path) {
            (ChangeType::Rename, Some(old), Some(new)) => write!(f, "R\t{old} -> {new}"),
            (change, _, _) => match self.path() {
                Some(path) => write!(f, "{}\t{}", change.code(), path),
                None => write!(f, "{}", change.code()),
            },
        }
    }
}
