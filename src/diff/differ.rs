//! diff::differ
//!
//! The lock-step tree walk.

use std::cmp::Ordering;

use super::{DiffEntry, DiffError, DiffOptions};
use crate::core::types::{ObjectId, RepoPath, TypeError};
use crate::store::object::{Tree, TreeEntry};
use crate::store::ObjectStore;

/// Computes [`DiffEntry`] sequences between trees held in one object store.
#[derive(Debug, Clone, Copy)]
pub struct TreeDiffer<'s> {
    store: &'s dyn ObjectStore,
    options: DiffOptions,
}

fn child(prefix: Option<&RepoPath>, name: &str) -> Result<RepoPath, TypeError> {
    match prefix {
        Some(parent) => parent.join(name),
        None => RepoPath::new(name),
    }
}

/// Which side an expanded sub-tree belongs to.
#[derive(Clone, Copy)]
enum Side {
    Old,
    New,
}

impl<'s> TreeDiffer<'s> {
    pub fn new(store: &'s dyn ObjectStore, options: DiffOptions) -> Self {
        Self { store, options }
    }

    /// Diff two trees by id. `None` stands for the empty tree.
    ///
    /// # Errors
    ///
    /// Fails if a tree that the walk needs cannot be read as a tree.
    pub fn diff(
        &self,
        old: Option<&ObjectId>,
        new: Option<&ObjectId>,
    ) -> Result<Vec<DiffEntry>, DiffError> {
        if old == new {
            return Ok(Vec::new());
        }
        let old_tree = self.load(old)?;
        let new_tree = self.load(new)?;
        self.diff_trees(&old_tree, &new_tree)
    }

    /// Diff two already-loaded trees.
    pub fn diff_trees(&self, old: &Tree, new: &Tree) -> Result<Vec<DiffEntry>, DiffError> {
        let mut out = Vec::new();
        self.diff_level(None, old, new, &mut out)?;
        out.sort_by(|a, b| a.path().cmp(&b.path()));
        tracing::trace!(changes = out.len(), "computed tree diff");
        Ok(out)
    }

    fn load(&self, id: Option<&ObjectId>) -> Result<Tree, DiffError> {
        match id {
            Some(id) => Ok(self.store.read_tree(id)?),
            None => Ok(Tree::empty()),
        }
    }

    fn diff_level(
        &self,
        prefix: Option<&RepoPath>,
        old: &Tree,
        new: &Tree,
        out: &mut Vec<DiffEntry>,
    ) -> Result<(), DiffError> {
        let (old, new) = (old.entries(), new.entries());
        // File-level deletes and adds at this level; candidates for rename pairing.
        let mut deleted = Vec::new();
        let mut added = Vec::new();
        let (mut i, mut j) = (0, 0);

        loop {
            let order = match (old.get(i), new.get(j)) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(o), Some(n)) => o.canonical_cmp(n),
            };
            match order {
                Ordering::Less => {
                    self.one_side(prefix, &old[i], Side::Old, &mut deleted, out)?;
                    i += 1;
                }
                Ordering::Greater => {
                    self.one_side(prefix, &new[j], Side::New, &mut added, out)?;
                    j += 1;
                }
                Ordering::Equal => {
                    self.both_sides(prefix, &old[i], &new[j], out)?;
                    i += 1;
                    j += 1;
                }
            }
        }

        if self.options.detect_renames {
            out.extend(pair_renames(deleted, added));
        } else {
            out.extend(deleted);
            out.extend(added);
        }
        Ok(())
    }

    /// Entry present on one side only.
    fn one_side(
        &self,
        prefix: Option<&RepoPath>,
        entry: &TreeEntry,
        side: Side,
        level: &mut Vec<DiffEntry>,
        out: &mut Vec<DiffEntry>,
    ) -> Result<(), DiffError> {
        let path = child(prefix, &entry.name)?;
        if entry.is_dir() {
            return self.expand(&path, &entry.target, side, out);
        }
        level.push(match side {
            Side::Old => DiffEntry::deleted(path, entry.target, entry.mode),
            Side::New => DiffEntry::added(path, entry.target, entry.mode),
        });
        Ok(())
    }

    /// Entry present on both sides with the same name and kind.
    fn both_sides(
        &self,
        prefix: Option<&RepoPath>,
        old: &TreeEntry,
        new: &TreeEntry,
        out: &mut Vec<DiffEntry>,
    ) -> Result<(), DiffError> {
        if old.target == new.target && old.mode == new.mode {
            return Ok(());
        }
        let path = child(prefix, &old.name)?;
        if old.is_dir() {
            let old_tree = self.store.read_tree(&old.target)?;
            let new_tree = self.store.read_tree(&new.target)?;
            return self.diff_level(Some(&path), &old_tree, &new_tree, out);
        }
        out.push(DiffEntry::modified(
            path,
            (old.target, old.mode),
            (new.target, new.mode),
        ));
        Ok(())
    }

    /// Emit every file below a directory as deleted or added.
    fn expand(
        &self,
        dir: &RepoPath,
        tree: &ObjectId,
        side: Side,
        out: &mut Vec<DiffEntry>,
    ) -> Result<(), DiffError> {
        for entry in self.store.read_tree(tree)?.entries() {
            let path = dir.join(&entry.name)?;
            if entry.is_dir() {
                self.expand(&path, &entry.target, side, out)?;
                continue;
            }
            out.push(match side {
                Side::Old => DiffEntry::deleted(path, entry.target, entry.mode),
                Side::New => DiffEntry::added(path, entry.target, entry.mode),
            });
        }
        Ok(())
    }
}

/// Pair each delete with the first unclaimed add of identical content.
fn pair_renames(deleted: Vec<DiffEntry>, added: Vec<DiffEntry>) -> Vec<DiffEntry> {
    let mut added: Vec<Option<DiffEntry>> = added.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(deleted.len() + added.len());

    for del in deleted {
        let partner = added
            .iter_mut()
            .find(|slot| matches!(slot, Some(add) if add.new_id == del.old_id))
            .and_then(Option::take);
        match partner {
            Some(add) => out.push(DiffEntry::renamed(del, add)),
            None => out.push(del),
        }
    }
    out.extend(added.into_iter().flatten());
    out
}
