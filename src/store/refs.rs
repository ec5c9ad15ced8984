//! store::refs
//!
//! Mutable named pointers to commits.
//!
//! # CAS Semantics
//!
//! Every update states the value it expects to replace. `expected_old` of
//! `None` means "the ref must not exist yet". A mismatch fails with
//! [`StoreError::CasFailed`] and leaves the ref untouched, so a reference
//! update is the single commit point of every mutating operation.
//!
//! # Example
//!
//! ```
//! use treesync::core::types::{ObjectId, RefName};
//! use treesync::store::{MemoryRefStore, RefStore};
//!
//! let refs = MemoryRefStore::new();
//! let name = RefName::new("refs/heads/master").unwrap();
//! let a = ObjectId::hash(b"a");
//! let b = ObjectId::hash(b"b");
//!
//! refs.update(&name, &a, None).unwrap();
//! assert!(refs.update(&name, &b, None).is_err());
//! refs.update(&name, &b, Some(&a)).unwrap();
//! assert_eq!(refs.read(&name).unwrap(), Some(b));
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::objects::write_atomic;
use super::StoreError;
use crate::core::paths::RepoPaths;
use crate::core::types::{ObjectId, RefName};

/// A reference and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefEntry {
    pub name: RefName,
    pub target: ObjectId,
}

/// Storage of named references.
pub trait RefStore: Send + Sync + std::fmt::Debug {
    /// Current value of a ref, or `None` if it does not exist.
    fn read(&self, name: &RefName) -> Result<Option<ObjectId>, StoreError>;

    /// Point `name` at `new`, provided its current value equals `expected_old`.
    ///
    /// The store does not look at `new`; callers must already hold it as a
    /// commit. [`Repository::update_ref`](crate::repo::Repository::update_ref)
    /// checks that before delegating here.
    fn update(
        &self,
        name: &RefName,
        new: &ObjectId,
        expected_old: Option<&ObjectId>,
    ) -> Result<(), StoreError>;

    /// All refs whose name starts with `prefix`, sorted by name.
    fn list(&self, prefix: &str) -> Result<Vec<RefEntry>, StoreError>;
}

fn check_cas(
    name: &RefName,
    expected: Option<&ObjectId>,
    current: Option<&ObjectId>,
) -> Result<(), StoreError> {
    if expected == current {
        return Ok(());
    }
    let show = |id: Option<&ObjectId>| id.map_or_else(|| "<none>".to_string(), |id| id.to_hex());
    Err(StoreError::CasFailed {
        refname: name.to_string(),
        expected: show(expected),
        actual: show(current),
    })
}

/// In-memory ref store.
#[derive(Debug, Default)]
pub struct MemoryRefStore {
    refs: RwLock<BTreeMap<RefName, ObjectId>>,
}

impl MemoryRefStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefStore for MemoryRefStore {
    fn read(&self, name: &RefName) -> Result<Option<ObjectId>, StoreError> {
        Ok(self.refs.read().get(name).copied())
    }

    fn update(
        &self,
        name: &RefName,
        new: &ObjectId,
        expected_old: Option<&ObjectId>,
    ) -> Result<(), StoreError> {
        let mut refs = self.refs.write();
        check_cas(name, expected_old, refs.get(name))?;
        refs.insert(name.clone(), *new);
        tracing::debug!(refname = %name, new = %new.short(12), "updated ref");
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<RefEntry>, StoreError> {
        Ok(self
            .refs
            .read()
            .iter()
            .filter(|(name, _)| name.as_str().starts_with(prefix))
            .map(|(name, target)| RefEntry {
                name: name.clone(),
                target: *target,
            })
            .collect())
    }
}

/// Filesystem ref store under `<root>/.treesync/`.
///
/// Each ref is one file holding the hex id and a newline. The in-process
/// mutex makes read-check-write atomic between threads. Writers in other
/// processes, or through another handle on the same directory, must hold
/// [`RepoLock`](crate::core::ops::lock::RepoLock) to be serialized.
#[derive(Debug)]
pub struct FsRefStore {
    paths: RepoPaths,
    write_guard: Mutex<()>,
}

impl FsRefStore {
    pub fn new(paths: RepoPaths) -> Self {
        Self {
            paths,
            write_guard: Mutex::new(()),
        }
    }

    fn read_file(&self, name: &RefName, path: &Path) -> Result<Option<ObjectId>, StoreError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        ObjectId::from_hex(content.trim())
            .map(Some)
            .map_err(|e| StoreError::CorruptRef {
                refname: name.to_string(),
                reason: e.to_string(),
            })
    }

    fn collect(&self, dir: &Path, prefix: &str, out: &mut Vec<RefEntry>) -> Result<(), StoreError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StoreError::io(dir, e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(dir, e))?;
            let path = entry.path();
            if path.is_dir() {
                self.collect(&path, prefix, out)?;
                continue;
            }
            let Ok(relative) = path.strip_prefix(self.paths.meta_dir()) else {
                continue;
            };
            let name: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect();
            // Temp files and anything else that isn't a valid ref are skipped.
            let Ok(name) = RefName::new(name.join("/")) else {
                continue;
            };
            if !name.as_str().starts_with(prefix) {
                continue;
            }
            if let Some(target) = self.read_file(&name, &path)? {
                out.push(RefEntry { name, target });
            }
        }
        Ok(())
    }
}

impl RefStore for FsRefStore {
    fn read(&self, name: &RefName) -> Result<Option<ObjectId>, StoreError> {
        self.read_file(name, &self.paths.ref_path(name))
    }

    fn update(
        &self,
        name: &RefName,
        new: &ObjectId,
        expected_old: Option<&ObjectId>,
    ) -> Result<(), StoreError> {
        let _guard = self.write_guard.lock();
        let path = self.paths.ref_path(name);
        let current = self.read_file(name, &path)?;
        check_cas(name, expected_old, current.as_ref())?;
        write_atomic(&path, format!("{}\n", new.to_hex()).as_bytes())?;
        tracing::debug!(refname = %name, new = %new.short(12), "updated ref");
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<RefEntry>, StoreError> {
        let mut out = Vec::new();
        self.collect(&self.paths.refs_dir(), prefix, &mut out)?;
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}
