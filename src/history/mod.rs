//! history
//!
//! The commit DAG, built lazily over the object store.
//!
//! # Overview
//!
//! [`HistoryGraph`] answers ancestry questions and walks history. Commits are
//! decoded on first access and cached; since commits are immutable the cache
//! never needs invalidation, and concurrent readers only contend on the
//! cache's read lock.
//!
//! # Revisions
//!
//! [`HistoryGraph::resolve`] accepts:
//!
//! - `HEAD` (the graph's configured head ref)
//! - full ref names (`refs/heads/master`)
//! - short names, tried as `refs/heads/<x>` then `refs/remotes/<x>`
//! - full or abbreviated (at least 4 hex characters) object ids
//!
//! followed by any of `~N`, `^N` and a trailing `^{tree}`.
//!
//! # Example
//!
//! ```
//! use treesync::repo::Repository;
//! use treesync::core::types::RefName;
//!
//! let repo = Repository::in_memory();
//! let graph = repo.history(RefName::new("refs/heads/master").unwrap());
//! // unborn HEAD does not resolve
//! assert!(graph.resolve("HEAD").is_err());
//! ```

mod revspec;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;

use crate::core::types::{ObjectId, RefName};
use crate::store::object::Commit;
use crate::store::{ObjectStore, RefStore, StoreError};
use revspec::Step;

/// Minimum abbreviated id length accepted by `resolve`.
pub const MIN_PREFIX_LEN: usize = 4;

/// Errors from history queries.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The expression does not name a commit.
    #[error("invalid revision '{rev}': {reason}")]
    InvalidRevision { rev: String, reason: String },

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HistoryError {
    fn invalid(rev: &str, reason: impl Into<String>) -> Self {
        HistoryError::InvalidRevision {
            rev: rev.to_string(),
            reason: reason.into(),
        }
    }
}

/// One commit yielded by a history walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub id: ObjectId,
    #[serde(serialize_with = "serialize_commit")]
    pub commit: Arc<Commit>,
}

fn serialize_commit<S: serde::Serializer>(commit: &Arc<Commit>, s: S) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeStruct;
    let mut st = s.serialize_struct("Commit", 5)?;
    st.serialize_field("tree", &commit.tree)?;
    st.serialize_field("parents", &commit.parents)?;
    st.serialize_field("author", &commit.author)?;
    st.serialize_field("committer", &commit.committer)?;
    st.serialize_field("message", &commit.message)?;
    st.end()
}

/// Read-only view of the commit DAG.
#[derive(Debug)]
pub struct HistoryGraph {
    objects: Arc<dyn ObjectStore>,
    refs: Arc<dyn RefStore>,
    head: RefName,
    cache: RwLock<HashMap<ObjectId, Arc<Commit>>>,
}

impl HistoryGraph {
    /// Build a graph over the given stores; `head` is what `HEAD` resolves through.
    pub fn new(objects: Arc<dyn ObjectStore>, refs: Arc<dyn RefStore>, head: RefName) -> Self {
        Self {
            objects,
            refs,
            head,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The ref `HEAD` stands for.
    pub fn head_ref(&self) -> &RefName {
        &self.head
    }

    /// Current `HEAD` commit, or `None` on an unborn branch.
    pub fn head(&self) -> Result<Option<ObjectId>, HistoryError> {
        Ok(self.refs.read(&self.head)?)
    }

    /// Load a commit.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the id is absent
    /// - [`StoreError::WrongKind`] / [`StoreError::Corrupt`] if it does not
    ///   decode as a commit
    pub fn commit(&self, id: &ObjectId) -> Result<Arc<Commit>, HistoryError> {
        if let Some(commit) = self.cache.read().get(id) {
            return Ok(Arc::clone(commit));
        }
        let commit = Arc::new(self.objects.read_commit(id)?);
        self.cache.write().insert(*id, Arc::clone(&commit));
        Ok(commit)
    }

    /// Resolve a revision expression to an object id.
    ///
    /// The result is a commit id unless the expression ends in `^{tree}`.
    pub fn resolve(&self, rev: &str) -> Result<ObjectId, HistoryError> {
        let spec = revspec::parse(rev).map_err(|reason| HistoryError::invalid(rev, reason))?;
        let mut id = self.resolve_base(rev, spec.base)?;

        for step in &spec.steps {
            id = match *step {
                Step::Ancestor(n) => {
                    let mut current = id;
                    for _ in 0..n {
                        current = *self
                            .commit(&current)?
                            .first_parent()
                            .ok_or_else(|| HistoryError::invalid(rev, "no such ancestor"))?;
                    }
                    current
                }
                Step::Parent(0) => {
                    self.commit(&id)?;
                    id
                }
                Step::Parent(n) => *self
                    .commit(&id)?
                    .parents
                    .get(n - 1)
                    .ok_or_else(|| HistoryError::invalid(rev, format!("commit has no parent {n}")))?,
            };
        }

        if spec.peel_tree {
            return Ok(self.commit(&id)?.tree);
        }
        Ok(id)
    }

    fn resolve_base(&self, rev: &str, base: &str) -> Result<ObjectId, HistoryError> {
        if base == "HEAD" {
            return self
                .head()?
                .ok_or_else(|| HistoryError::invalid(rev, format!("{} is unborn", self.head)));
        }

        let mut candidates = Vec::new();
        if base.starts_with("refs/") {
            candidates.push(base.to_string());
        } else {
            candidates.push(format!("{}{}", RefName::HEADS, base));
            candidates.push(format!("{}{}", RefName::REMOTES, base));
        }
        for candidate in candidates {
            let Ok(name) = RefName::new(candidate) else {
                continue;
            };
            if let Some(id) = self.refs.read(&name)? {
                return Ok(id);
            }
        }

        if base.len() >= MIN_PREFIX_LEN && base.chars().all(|c| c.is_ascii_hexdigit()) {
            let matches = self.objects.ids_with_prefix(base)?;
            return match matches.as_slice() {
                [id] => Ok(*id),
                [] => Err(HistoryError::invalid(rev, "unknown revision")),
                many => Err(HistoryError::invalid(
                    rev,
                    format!("ambiguous id prefix ({} matches)", many.len()),
                )),
            };
        }

        Err(HistoryError::invalid(rev, "unknown revision"))
    }

    /// Walk first-parent history starting at `id`, newest first.
    ///
    /// The walk is lazy and finite; each call returns a fresh iterator.
    /// After yielding an error the iterator ends.
    pub fn ancestors_of(&self, id: &ObjectId) -> Ancestors<'_> {
        Ancestors {
            graph: self,
            next: Some(*id),
        }
    }

    /// Whether `ancestor` is reachable from `descendant` through parent links.
    ///
    /// Every commit is its own ancestor.
    pub fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> Result<bool, HistoryError> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([*descendant]);
        while let Some(id) = queue.pop_front() {
            if id == *ancestor {
                return Ok(true);
            }
            if !seen.insert(id) {
                continue;
            }
            queue.extend(self.commit(&id)?.parents.iter().copied());
        }
        Ok(false)
    }

    /// Every commit reachable from `tip`, including `tip`.
    pub fn reachable(&self, tip: &ObjectId) -> Result<HashSet<ObjectId>, HistoryError> {
        let mut seen = HashSet::new();
        let mut stack = vec![*tip];
        while let Some(id) = stack.pop() {
            if seen.insert(id) {
                stack.extend(self.commit(&id)?.parents.iter().copied());
            }
        }
        Ok(seen)
    }

    /// Nearest common ancestor, by breadth-first distance from `b`.
    pub fn merge_base(&self, a: &ObjectId, b: &ObjectId) -> Result<Option<ObjectId>, HistoryError> {
        let from_a = self.reachable(a)?;
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([*b]);
        while let Some(id) = queue.pop_front() {
            if from_a.contains(&id) {
                return Ok(Some(id));
            }
            if seen.insert(id) {
                queue.extend(self.commit(&id)?.parents.iter().copied());
            }
        }
        Ok(None)
    }

    /// Commits reachable only from `local`, and only from `remote`.
    pub fn ahead_behind(&self, local: &ObjectId, remote: &ObjectId) -> Result<(usize, usize), HistoryError> {
        let ours = self.reachable(local)?;
        let theirs = self.reachable(remote)?;
        Ok((
            ours.difference(&theirs).count(),
            theirs.difference(&ours).count(),
        ))
    }
}

/// Lazy first-parent walk returned by [`HistoryGraph::ancestors_of`].
pub struct Ancestors<'g> {
    graph: &'g HistoryGraph,
    next: Option<ObjectId>,
}

impl Iterator for Ancestors<'_> {
    type Item = Result<HistoryEntry, HistoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;
        match self.graph.commit(&id) {
            Ok(commit) => {
                self.next = commit.first_parent().copied();
                Some(Ok(HistoryEntry { id, commit }))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl std::iter::FusedIterator for Ancestors<'_> {}
