//! transport::local
//!
//! In-process transport whose remotes are other [`Repository`] instances.
//!
//! This plays the role of a local-path remote: objects are copied between
//! stores directly and remote refs are moved with the same CAS updates the
//! local side uses. The remote decides fast-forwards with its own
//! [`HistoryGraph`](crate::history::HistoryGraph), exactly as a server would.
//! A push holds the remote's [`RepoLock`](crate::core::ops::lock::RepoLock)
//! while it checks and moves the remote ref, so on-disk remotes opened
//! through several handles still see one writer at a time.
//!
//! Remotes are registered by name; `list_remote_refs` also accepts the URL
//! form `local://<name>`.
//!
//! # Example
//!
//! ```
//! use treesync::repo::Repository;
//! use treesync::transport::{Credentials, LocalTransport, Transport};
//!
//! let remote = Repository::in_memory();
//! let transport = LocalTransport::new().with_remote("origin", remote);
//!
//! let refs = transport
//!     .list_remote_refs("local://origin", &Credentials::anonymous())
//!     .unwrap();
//! assert!(refs.is_empty());
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::credentials::Credentials;
use super::traits::{FetchSummary, PushOutcome, RefSpec, RejectReason, Transport, TransportError};
use crate::core::ops::lock::LockError;
use crate::core::types::{ObjectId, RefName};
use crate::repo::Repository;
use crate::store::{copy_reachable, RefEntry, StoreError};

/// URL scheme accepted by [`LocalTransport::list_remote_refs`].
pub const LOCAL_SCHEME: &str = "local://";

#[derive(Debug, Clone)]
struct LocalRemote {
    repo: Repository,
    required: Option<Credentials>,
}

/// Transport between repositories living in the same process.
///
/// Clones share the remote registry.
#[derive(Debug, Clone, Default)]
pub struct LocalTransport {
    remotes: Arc<RwLock<BTreeMap<String, LocalRemote>>>,
}

fn protocol(err: impl std::fmt::Display) -> TransportError {
    TransportError::Protocol(err.to_string())
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a remote (builder form).
    pub fn with_remote(self, name: &str, repo: Repository) -> Self {
        self.add_remote(name, repo);
        self
    }

    /// Register or replace a remote.
    pub fn add_remote(&self, name: &str, repo: Repository) {
        self.remotes.write().insert(
            name.to_string(),
            LocalRemote {
                repo,
                required: None,
            },
        );
    }

    /// Make a remote refuse pushes and listings without these credentials.
    pub fn require_credentials(&self, name: &str, credentials: Credentials) -> Result<(), TransportError> {
        let mut remotes = self.remotes.write();
        let remote = remotes
            .get_mut(name)
            .ok_or_else(|| TransportError::UnknownRemote(name.to_string()))?;
        remote.required = Some(credentials);
        Ok(())
    }

    /// The repository registered under `name`.
    pub fn remote(&self, name: &str) -> Option<Repository> {
        self.remotes.read().get(name).map(|r| r.repo.clone())
    }

    fn lookup(&self, name_or_url: &str) -> Result<LocalRemote, TransportError> {
        let name = name_or_url
            .strip_prefix(LOCAL_SCHEME)
            .unwrap_or(name_or_url);
        self.remotes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TransportError::UnknownRemote(name_or_url.to_string()))
    }

    fn authorize(remote: &LocalRemote, name: &str, credentials: &Credentials) -> Result<(), TransportError> {
        match &remote.required {
            Some(required) if required != credentials => Err(TransportError::AuthFailed(format!(
                "remote '{name}' rejected the supplied credentials"
            ))),
            _ => Ok(()),
        }
    }

    /// Point `refs/remotes/<remote>/<branch>` at `target`.
    fn update_tracking(
        local: &Repository,
        remote: &str,
        remote_ref: &RefName,
        target: &ObjectId,
    ) -> Result<Option<RefEntry>, TransportError> {
        let Some(branch) = remote_ref.branch() else {
            return Ok(None);
        };
        let tracking = RefName::for_remote_branch(remote, &branch).map_err(protocol)?;
        let current = local.refs().read(&tracking).map_err(protocol)?;
        if current.as_ref() == Some(target) {
            return Ok(None);
        }
        local
            .update_ref(&tracking, target, current.as_ref())
            .map_err(protocol)?;
        Ok(Some(RefEntry {
            name: tracking,
            target: *target,
        }))
    }
}

impl Transport for LocalTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    fn fetch(&self, local: &Repository, remote: &str) -> Result<FetchSummary, TransportError> {
        let peer = self.lookup(remote)?;
        let mut summary = FetchSummary::default();

        for entry in peer.repo.refs().list(RefName::HEADS).map_err(protocol)? {
            summary.objects += copy_reachable(
                peer.repo.objects().as_ref(),
                local.objects().as_ref(),
                &entry.target,
            )
            .map_err(protocol)?;
            if let Some(updated) = Self::update_tracking(local, remote, &entry.name, &entry.target)? {
                summary.updated.push(updated);
            }
        }

        tracing::debug!(
            remote,
            updated = summary.updated.len(),
            objects = summary.objects,
            "fetched"
        );
        Ok(summary)
    }

    fn push(
        &self,
        local: &Repository,
        remote: &str,
        spec: &RefSpec,
        credentials: &Credentials,
    ) -> Result<PushOutcome, TransportError> {
        let peer = self.lookup(remote)?;
        Self::authorize(&peer, remote, credentials)?;

        let Some(tip) = local.refs().read(&spec.src).map_err(protocol)? else {
            return Ok(PushOutcome::Rejected(RejectReason::Other(format!(
                "src ref {} does not exist",
                spec.src
            ))));
        };

        copy_reachable(local.objects().as_ref(), peer.repo.objects().as_ref(), &tip)
            .map_err(protocol)?;

        let _remote_lock = match peer.repo.lock() {
            Ok(lock) => lock,
            Err(LockError::AlreadyLocked(_)) => {
                tracing::warn!(remote, "remote repository is locked");
                return Err(TransportError::Locked(remote.to_string()));
            }
            Err(e) => return Err(protocol(e)),
        };
        let current = peer.repo.refs().read(&spec.dst).map_err(protocol)?;
        if let Some(current) = current.filter(|c| *c != tip) {
            let graph = peer.repo.history(spec.dst.clone());
            if !graph.is_ancestor(&current, &tip).map_err(protocol)? {
                return Ok(PushOutcome::Rejected(RejectReason::NonFastForward));
            }
        }

        if current != Some(tip) {
            match peer.repo.update_ref(&spec.dst, &tip, current.as_ref()) {
                Ok(()) => {}
                Err(StoreError::CasFailed { .. }) => {
                    return Ok(PushOutcome::Rejected(RejectReason::Other(format!(
                        "{} moved during push",
                        spec.dst
                    ))));
                }
                Err(e) => return Err(protocol(e)),
            }
        }

        Self::update_tracking(local, remote, &spec.dst, &tip)?;
        Ok(PushOutcome::Accepted {
            remote_ref: spec.dst.clone(),
            new_head: tip,
        })
    }

    fn list_remote_refs(
        &self,
        url: &str,
        credentials: &Credentials,
    ) -> Result<Vec<RefEntry>, TransportError> {
        let peer = self.lookup(url)?;
        Self::authorize(&peer, url, credentials)?;
        peer.repo.refs().list("refs/").map_err(protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::UtcTimestamp;
    use crate::store::object::{Commit, EntryMode, Object, Signature, Tree, TreeEntry};

    fn commit(repo: &Repository, content: &str, parents: Vec<ObjectId>) -> ObjectId {
        let objects = repo.objects();
        let blob = objects.put_blob(content.as_bytes()).unwrap();
        let tree = Tree::new(vec![TreeEntry::new("f", EntryMode::File, blob).unwrap()]).unwrap();
        let tree = objects.put(&Object::Tree(tree)).unwrap();
        let sig = Signature::new("T", "t@x", UtcTimestamp::from_unix(0).unwrap()).unwrap();
        objects
            .put(&Object::Commit(Commit {
                tree,
                parents,
                author: sig.clone(),
                committer: sig,
                message: content.to_string(),
            }))
            .unwrap()
    }

    fn master() -> RefName {
        RefName::new("refs/heads/master").unwrap()
    }

    fn tracking() -> RefName {
        RefName::new("refs/remotes/origin/master").unwrap()
    }

    fn advance(repo: &Repository, name: &RefName, id: ObjectId) {
        let old = repo.refs().read(name).unwrap();
        repo.refs().update(name, &id, old.as_ref()).unwrap();
    }

    fn setup() -> (Repository, Repository, LocalTransport) {
        let local = Repository::in_memory();
        let remote = Repository::in_memory();
        let transport = LocalTransport::new().with_remote("origin", remote.clone());
        (local, remote, transport)
    }

    #[test]
    fn push_to_empty_remote_is_accepted() {
        let (local, remote, transport) = setup();
        let c = commit(&local, "one", vec![]);
        advance(&local, &master(), c);

        let spec = RefSpec::new(master(), master());
        let outcome = transport
            .push(&local, "origin", &spec, &Credentials::anonymous())
            .unwrap();
        assert_eq!(
            outcome,
            PushOutcome::Accepted {
                remote_ref: master(),
                new_head: c
            }
        );
        assert_eq!(remote.refs().read(&master()).unwrap(), Some(c));
        assert!(remote.objects().read_commit(&c).is_ok());
        assert_eq!(local.refs().read(&tracking()).unwrap(), Some(c));
    }

    #[test]
    fn divergent_push_is_rejected() {
        let (local, remote, transport) = setup();
        let base = commit(&local, "base", vec![]);
        advance(&local, &master(), base);
        let spec = RefSpec::new(master(), master());
        transport
            .push(&local, "origin", &spec, &Credentials::anonymous())
            .unwrap();

        // remote moves on independently
        copy_reachable(local.objects().as_ref(), remote.objects().as_ref(), &base).unwrap();
        let theirs = commit(&remote, "theirs", vec![base]);
        advance(&remote, &master(), theirs);

        let ours = commit(&local, "ours", vec![base]);
        advance(&local, &master(), ours);

        let outcome = transport
            .push(&local, "origin", &spec, &Credentials::anonymous())
            .unwrap();
        assert_eq!(outcome, PushOutcome::Rejected(RejectReason::NonFastForward));
        assert_eq!(remote.refs().read(&master()).unwrap(), Some(theirs));
    }

    #[test]
    fn missing_source_is_rejected() {
        let (local, _remote, transport) = setup();
        let spec = RefSpec::new(master(), master());
        let outcome = transport
            .push(&local, "origin", &spec, &Credentials::anonymous())
            .unwrap();
        assert!(matches!(outcome, PushOutcome::Rejected(RejectReason::Other(_))));
    }

    #[test]
    fn unknown_remote() {
        let (local, _remote, transport) = setup();
        assert_eq!(
            transport.fetch(&local, "upstream").unwrap_err(),
            TransportError::UnknownRemote("upstream".into())
        );
    }

    #[test]
    fn fetch_updates_tracking_refs() {
        let (local, remote, transport) = setup();
        let c = commit(&remote, "remote work", vec![]);
        advance(&remote, &master(), c);

        let summary = transport.fetch(&local, "origin").unwrap();
        assert_eq!(summary.objects, 3);
        assert_eq!(summary.updated.len(), 1);
        assert_eq!(local.refs().read(&tracking()).unwrap(), Some(c));
        assert!(local.objects().read_commit(&c).is_ok());

        let again = transport.fetch(&local, "origin").unwrap();
        assert_eq!(again, FetchSummary::default());
    }

    #[test]
    fn credentials_enforced() {
        let (local, _remote, transport) = setup();
        transport
            .require_credentials("origin", Credentials::new("bot", "token"))
            .unwrap();
        let c = commit(&local, "one", vec![]);
        advance(&local, &master(), c);
        let spec = RefSpec::new(master(), master());

        let err = transport
            .push(&local, "origin", &spec, &Credentials::new("bot", "wrong"))
            .unwrap_err();
        assert!(matches!(err, TransportError::AuthFailed(_)));
        assert!(!err.to_string().contains("wrong"));

        let outcome = transport
            .push(&local, "origin", &spec, &Credentials::new("bot", "token"))
            .unwrap();
        assert!(matches!(outcome, PushOutcome::Accepted { .. }));
        assert_eq!(
            transport
                .list_remote_refs("local://origin", &Credentials::new("bot", "token"))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn locked_remote_refuses_push() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let held = Repository::open(dir.path()).unwrap();
        let remote = Repository::open(dir.path()).unwrap();

        let local = Repository::in_memory();
        let transport = LocalTransport::new().with_remote("origin", remote.clone());
        let c = commit(&local, "one", vec![]);
        advance(&local, &master(), c);
        let spec = RefSpec::new(master(), master());

        let lock = held.lock().unwrap();
        let err = transport
            .push(&local, "origin", &spec, &Credentials::anonymous())
            .unwrap_err();
        assert_eq!(err, TransportError::Locked("origin".into()));
        assert_eq!(remote.refs().read(&master()).unwrap(), None);
        assert_eq!(local.refs().read(&tracking()).unwrap(), None);

        drop(lock);
        let outcome = transport
            .push(&local, "origin", &spec, &Credentials::anonymous())
            .unwrap();
        assert!(matches!(outcome, PushOutcome::Accepted { .. }));
        assert_eq!(held.refs().read(&master()).unwrap(), Some(c));
    }
}
