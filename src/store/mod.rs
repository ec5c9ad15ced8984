//! store
//!
//! Content-addressed object storage and mutable references.
//!
//! # Architecture
//!
//! This module is the **single doorway** to persisted repository state:
//!
//! - [`object`] - Blob/Tree/Commit value types and their canonical encoding
//! - [`objects`] - The append-only [`ObjectStore`] (memory and filesystem)
//! - [`refs`] - The [`RefStore`] of named pointers with CAS updates
//!
//! # Invariants
//!
//! - Objects are immutable; storing identical content twice is a no-op
//! - No object is stored before every object it references
//! - All ref updates use CAS (compare-and-swap) semantics
//! - There is no delete operation for objects

pub mod object;
pub mod objects;
pub mod refs;

use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::{ObjectId, TypeError};
use object::ObjectKind;

pub use objects::{copy_reachable, FsObjectStore, MemoryObjectStore, ObjectStore};
pub use refs::{FsRefStore, MemoryRefStore, RefEntry, RefStore};

/// Errors from object and reference storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object id is not present in the store.
    #[error("object not found: {id}")]
    NotFound { id: ObjectId },

    /// Stored bytes do not decode, or do not hash to their id.
    #[error("corrupt object {id}: {reason}")]
    Corrupt { id: ObjectId, reason: String },

    /// Object exists but is of a different kind than requested.
    #[error("object {id} is a {actual}, expected a {expected}")]
    WrongKind {
        id: ObjectId,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    /// Object references an id that is not in the store.
    #[error("{kind} {id} references missing object {missing}")]
    Dangling {
        id: ObjectId,
        kind: ObjectKind,
        missing: ObjectId,
    },

    /// Compare-and-swap precondition failed.
    ///
    /// The ref's current value doesn't match the expected value, meaning
    /// someone else moved it since it was read.
    #[error("CAS failed for {refname}: expected {expected}, found {actual}")]
    CasFailed {
        refname: String,
        expected: String,
        actual: String,
    },

    /// A ref file exists but does not contain a valid id.
    #[error("corrupt ref {refname}: {reason}")]
    CorruptRef { refname: String, reason: String },

    /// No repository at the given location.
    #[error("not a treesync repository: {path}")]
    NotARepo { path: PathBuf },

    /// Repository already initialized.
    #[error("repository already exists: {path}")]
    AlreadyExists { path: PathBuf },

    /// Filesystem error.
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<TypeError> for StoreError {
    fn from(err: TypeError) -> Self {
        StoreError::CorruptRef {
            refname: String::new(),
            reason: err.to_string(),
        }
    }
}
