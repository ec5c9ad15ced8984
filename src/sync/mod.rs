//! sync
//!
//! Commit, push, and reconcile.
//!
//! # State Machine
//!
//! Each synchronization attempt moves through
//!
//! ```text
//! Editing -> Committed -> PushAttempted -> { Pushed | Conflicted | Failed }
//! ```
//!
//! The current phase is observable through [`SyncController::phase`].
//!
//! # Outcomes vs Errors
//!
//! A push that reached the peer always produces a [`SyncOutcome`]:
//!
//! - `Pushed` when the remote accepted the commit
//! - `Conflicted` with a structured [`ConflictReport`] when it was rejected
//! - `Failed` with the verbatim [`TransportError`] on network/auth failure
//!
//! [`SyncError`] is reserved for local failures (missing or corrupt objects,
//! bad revisions, write failures). Any error before the reference update
//! leaves `HEAD` unchanged.

mod controller;
mod report;

use serde::Serialize;
use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::ops::lock::LockError;
use crate::core::types::{ObjectId, TypeError};
use crate::diff::DiffError;
use crate::history::HistoryError;
use crate::store::object::ObjectError;
use crate::store::StoreError;
use crate::transport::TransportError;
use crate::worktree::WorktreeError;

pub use controller::{SyncController, SyncSettings};
pub use report::ConflictReport;

/// Errors from sync controller operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An id, path, or reference does not resolve.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored bytes do not decode as the expected object kind.
    #[error("corrupt object: {0}")]
    CorruptObject(String),

    /// Malformed or unresolvable name or hash.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// A working-tree or object write failed.
    #[error("write failed: {0}")]
    Write(String),

    /// Transport failure outside of a push attempt.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Path is malformed or collides with existing content.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Repository lock could not be taken.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Other storage failure (including a ref moved by a concurrent writer).
    #[error(transparent)]
    Store(StoreError),

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SyncError {
    /// Map a failure while writing objects or refs.
    pub(crate) fn from_write(err: StoreError) -> Self {
        match err {
            StoreError::Io { .. } => SyncError::Write(err.to_string()),
            other => other.into(),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => SyncError::NotFound(format!("object {id}")),
            StoreError::Corrupt { .. } | StoreError::WrongKind { .. } => {
                SyncError::CorruptObject(err.to_string())
            }
            StoreError::CorruptRef { .. } => SyncError::InvalidReference(err.to_string()),
            other => SyncError::Store(other),
        }
    }
}

impl From<HistoryError> for SyncError {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::InvalidRevision { .. } => SyncError::InvalidReference(err.to_string()),
            HistoryError::Store(e) => e.into(),
        }
    }
}

impl From<DiffError> for SyncError {
    fn from(err: DiffError) -> Self {
        match err {
            DiffError::Store(e) => e.into(),
            DiffError::InvalidPath(e) => SyncError::CorruptObject(e.to_string()),
        }
    }
}

impl From<WorktreeError> for SyncError {
    fn from(err: WorktreeError) -> Self {
        match err {
            WorktreeError::InvalidPath { .. } => SyncError::InvalidPath(err.to_string()),
            WorktreeError::Io { .. } => SyncError::Write(err.to_string()),
        }
    }
}

impl From<TypeError> for SyncError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidPath(msg) => SyncError::InvalidPath(msg),
            other => SyncError::InvalidReference(other.to_string()),
        }
    }
}

impl From<ObjectError> for SyncError {
    fn from(err: ObjectError) -> Self {
        match err {
            ObjectError::InvalidName { .. } => SyncError::InvalidPath(err.to_string()),
            ObjectError::InvalidIdentity(msg) => SyncError::Config(ConfigError::InvalidValue(msg)),
            other => SyncError::CorruptObject(other.to_string()),
        }
    }
}

/// Phase of the current synchronization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// No attempt has started.
    Idle,
    /// Content is being written and staged.
    Editing,
    /// `HEAD` points at the new commit.
    Committed,
    /// The transport has been asked to push.
    PushAttempted,
    /// The remote accepted the push.
    Pushed,
    /// The push was rejected and a conflict report produced.
    Conflicted,
    /// The attempt stopped on an error or transport failure.
    Failed,
}

impl SyncPhase {
    /// Whether the attempt has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncPhase::Pushed | SyncPhase::Conflicted | SyncPhase::Failed
        )
    }
}

/// Result of a push attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The remote ref now equals local `HEAD`.
    Pushed { head: ObjectId },
    /// The push was rejected; local and remote differ as reported.
    Conflicted(ConflictReport),
    /// The transport failed; the local commit is kept for a retry.
    Failed(TransportError),
}
