//! transport::traits
//!
//! The `Transport` trait and the values that cross it.
//!
//! # Design
//!
//! A transport moves objects and refs between the local repository and a
//! remote peer. It is a collaborator: the core never retries, never inspects
//! credentials, and treats every [`TransportError`] as a verbatim failure.
//! A rejected push is not an error; it is a [`PushOutcome::Rejected`] value
//! the caller reconciles.
//!
//! The interface is synchronous. Implementations that talk to a network are
//! expected to apply their own short timeouts.

use serde::Serialize;
use thiserror::Error;

use super::credentials::Credentials;
use crate::core::types::{BranchName, ObjectId, RefName, TypeError};
use crate::repo::Repository;
use crate::store::RefEntry;

/// Network and authentication failures reported by a transport.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
pub enum TransportError {
    /// Credentials missing, invalid, or insufficient.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Connection could not be established or was interrupted.
    #[error("network error: {0}")]
    Network(String),

    /// No remote is configured under that name or URL.
    #[error("unknown remote: {0}")]
    UnknownRemote(String),

    /// Another writer holds the peer's repository lock; retry later.
    #[error("remote is locked: {0}")]
    Locked(String),

    /// The peer sent or stored something unusable.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Source and destination refs of a push, written `<src>:<dst>`.
///
/// # Example
///
/// ```
/// use treesync::transport::RefSpec;
///
/// let spec = RefSpec::parse("refs/heads/topic:refs/heads/master").unwrap();
/// assert_eq!(spec.src.as_str(), "refs/heads/topic");
/// assert_eq!(spec.dst.as_str(), "refs/heads/master");
///
/// let same = RefSpec::parse("master").unwrap();
/// assert_eq!(same.to_string(), "refs/heads/master:refs/heads/master");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefSpec {
    pub src: RefName,
    pub dst: RefName,
}

impl RefSpec {
    pub fn new(src: RefName, dst: RefName) -> Self {
        Self { src, dst }
    }

    /// Push a local branch to the same-named remote branch.
    pub fn for_branch(branch: &BranchName) -> Self {
        let name = RefName::for_branch(branch);
        Self::new(name.clone(), name)
    }

    /// Parse `<src>:<dst>` or a single ref. Bare names are taken as branches.
    pub fn parse(spec: &str) -> Result<Self, TypeError> {
        let (src, dst) = spec.split_once(':').unwrap_or((spec, spec));
        Ok(Self::new(Self::qualify(src)?, Self::qualify(dst)?))
    }

    fn qualify(name: &str) -> Result<RefName, TypeError> {
        if name.starts_with("refs/") {
            RefName::new(name)
        } else {
            Ok(RefName::for_branch(&BranchName::new(name)?))
        }
    }
}

impl std::fmt::Display for RefSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.src, self.dst)
    }
}

/// Why a push was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The remote ref is not an ancestor of the pushed commit.
    NonFastForward,
    /// Any other refusal, described by the peer.
    Other(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::NonFastForward => write!(f, "non-fast-forward"),
            RejectReason::Other(msg) => write!(f, "{msg}"),
        }
    }
}

/// Result of a push that reached the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PushOutcome {
    /// The remote ref now equals the pushed commit.
    Accepted {
        remote_ref: RefName,
        new_head: ObjectId,
    },
    /// The peer refused the update.
    Rejected(RejectReason),
}

/// What a fetch changed locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    /// Tracking refs whose value changed.
    pub updated: Vec<RefEntry>,
    /// Number of objects copied into the local store.
    pub objects: usize,
}

/// Moves history between a local repository and named remotes.
pub trait Transport: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    /// Download the remote's branches and update `refs/remotes/<remote>/*`.
    ///
    /// Tracking refs in `local` are written without taking its lock; the
    /// caller holds it.
    fn fetch(&self, local: &Repository, remote: &str) -> Result<FetchSummary, TransportError>;

    /// Upload `spec.src` and ask the peer to move `spec.dst` to it.
    ///
    /// On `Accepted`, the local tracking ref for `spec.dst` is updated too.
    /// The peer's own writer lock is held while `spec.dst` is checked and
    /// moved.
    fn push(
        &self,
        local: &Repository,
        remote: &str,
        spec: &RefSpec,
        credentials: &Credentials,
    ) -> Result<PushOutcome, TransportError>;

    /// Refs advertised by the peer at `url`.
    fn list_remote_refs(
        &self,
        url: &str,
        credentials: &Credentials,
    ) -> Result<Vec<RefEntry>, TransportError>;
}
