//! store::objects
//!
//! The append-only, content-addressed object store.
//!
//! # Contract
//!
//! - `put(object)` computes the content hash, stores the object if absent and
//!   returns the id. Storing identical content again is a no-op.
//! - `get(id)` fails with [`StoreError::NotFound`] if the id is absent.
//! - Nothing is ever deleted.
//!
//! Implementations only provide raw byte primitives; hashing, decoding, and
//! the dangling-reference check live in the provided trait methods so every
//! backend enforces them identically.
//!
//! # Example
//!
//! ```
//! use treesync::store::{MemoryObjectStore, ObjectStore};
//!
//! let store = MemoryObjectStore::new();
//! let a = store.put_blob(b"hello").unwrap();
//! let b = store.put_blob(b"hello").unwrap();
//! assert_eq!(a, b);
//! assert_eq!(store.read_blob(&a).unwrap().as_bytes(), b"hello");
//! assert_eq!(store.len(), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use parking_lot::RwLock;

use super::object::{Blob, Commit, Object, ObjectKind, Tree};
use super::StoreError;
use crate::core::paths::{self, RepoPaths};
use crate::core::types::ObjectId;

/// Storage of immutable objects keyed by content hash.
///
/// Implementations must be thread-safe: reads may run concurrently with
/// each other and with writes.
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// Read the canonical encoding of an object, if present.
    fn read_raw(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store a canonical encoding under `id`.
    ///
    /// Returns `true` if the object was newly written. Callers guarantee that
    /// `encoded` hashes to `id`.
    fn write_raw(&self, id: &ObjectId, encoded: &[u8]) -> Result<bool, StoreError>;

    /// Whether an object is present.
    fn contains(&self, id: &ObjectId) -> Result<bool, StoreError>;

    /// All stored ids whose hex form starts with `hex_prefix`.
    fn ids_with_prefix(&self, hex_prefix: &str) -> Result<Vec<ObjectId>, StoreError>;

    /// Store an object and return its id.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Dangling`] if the object references an absent id
    fn put(&self, object: &Object) -> Result<ObjectId, StoreError> {
        let encoded = object.encode();
        let id = ObjectId::hash(&encoded);

        if self.contains(&id)? {
            return Ok(id);
        }
        for referenced in object.references() {
            if !self.contains(&referenced)? {
                return Err(StoreError::Dangling {
                    id,
                    kind: object.kind(),
                    missing: referenced,
                });
            }
        }

        if self.write_raw(&id, &encoded)? {
            tracing::debug!(id = %id.short(12), kind = %object.kind(), "stored object");
        }
        Ok(id)
    }

    /// Load and decode an object.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the id is absent
    /// - [`StoreError::Corrupt`] if the stored bytes do not decode
    fn get(&self, id: &ObjectId) -> Result<Object, StoreError> {
        let raw = self
            .read_raw(id)?
            .ok_or(StoreError::NotFound { id: *id })?;
        Object::decode(&raw).map_err(|e| StoreError::Corrupt {
            id: *id,
            reason: e.to_string(),
        })
    }

    /// Store file content as a blob.
    fn put_blob(&self, content: &[u8]) -> Result<ObjectId, StoreError> {
        self.put(&Object::Blob(Blob::new(content.to_vec())))
    }

    /// Load an object that must be a blob.
    fn read_blob(&self, id: &ObjectId) -> Result<Blob, StoreError> {
        match self.get(id)? {
            Object::Blob(blob) => Ok(blob),
            other => Err(wrong_kind(id, ObjectKind::Blob, &other)),
        }
    }

    /// Load an object that must be a tree.
    fn read_tree(&self, id: &ObjectId) -> Result<Tree, StoreError> {
        match self.get(id)? {
            Object::Tree(tree) => Ok(tree),
            other => Err(wrong_kind(id, ObjectKind::Tree, &other)),
        }
    }

    /// Load an object that must be a commit.
    fn read_commit(&self, id: &ObjectId) -> Result<Commit, StoreError> {
        match self.get(id)? {
            Object::Commit(commit) => Ok(commit),
            other => Err(wrong_kind(id, ObjectKind::Commit, &other)),
        }
    }
}

fn wrong_kind(id: &ObjectId, expected: ObjectKind, actual: &Object) -> StoreError {
    StoreError::WrongKind {
        id: *id,
        expected,
        actual: actual.kind(),
    }
}

fn is_hex_prefix(prefix: &str) -> bool {
    prefix.len() <= ObjectId::HEX_LEN && prefix.chars().all(|c| c.is_ascii_hexdigit())
}

/// In-memory object store.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn read_raw(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.objects.read().get(id).cloned())
    }

    fn write_raw(&self, id: &ObjectId, encoded: &[u8]) -> Result<bool, StoreError> {
        let mut objects = self.objects.write();
        if objects.contains_key(id) {
            return Ok(false);
        }
        objects.insert(*id, encoded.to_vec());
        Ok(true)
    }

    fn contains(&self, id: &ObjectId) -> Result<bool, StoreError> {
        Ok(self.objects.read().contains_key(id))
    }

    fn ids_with_prefix(&self, hex_prefix: &str) -> Result<Vec<ObjectId>, StoreError> {
        if !is_hex_prefix(hex_prefix) {
            return Ok(Vec::new());
        }
        let mut ids: Vec<ObjectId> = self
            .objects
            .read()
            .keys()
            .filter(|id| id.has_hex_prefix(hex_prefix))
            .copied()
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// Filesystem object store under `<root>/.treesync/objects/`.
///
/// Objects are stored uncompressed in their canonical encoding, fanned out
/// by the first two hex characters of the id. Reads re-hash the bytes, so a
/// damaged file surfaces as [`StoreError::Corrupt`] rather than bad data.
#[derive(Debug)]
pub struct FsObjectStore {
    paths: RepoPaths,
}

/// Atomic file replacement with the failing path attached.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    paths::write_atomic(path, bytes).map_err(|e| StoreError::io(path, e))
}

impl FsObjectStore {
    /// Open the object directory of an initialized repository.
    pub fn new(paths: RepoPaths) -> Self {
        Self { paths }
    }

    fn scan_dir(&self, dir_name: &str, rest_prefix: &str, out: &mut Vec<ObjectId>) -> Result<(), StoreError> {
        let dir = self.paths.objects_dir().join(dir_name);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StoreError::io(dir, e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if !file_name.starts_with(rest_prefix) {
                continue;
            }
            if let Ok(id) = ObjectId::from_hex(&format!("{dir_name}{file_name}")) {
                out.push(id);
            }
        }
        Ok(())
    }
}

impl ObjectStore for FsObjectStore {
    fn read_raw(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.paths.object_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        if ObjectId::hash(&bytes) != *id {
            return Err(StoreError::Corrupt {
                id: *id,
                reason: "content does not match its hash".into(),
            });
        }
        Ok(Some(bytes))
    }

    fn write_raw(&self, id: &ObjectId, encoded: &[u8]) -> Result<bool, StoreError> {
        let path = self.paths.object_path(id);
        if path.exists() {
            return Ok(false);
        }
        write_atomic(&path, encoded)?;
        Ok(true)
    }

    fn contains(&self, id: &ObjectId) -> Result<bool, StoreError> {
        Ok(self.paths.object_path(id).is_file())
    }

    fn ids_with_prefix(&self, hex_prefix: &str) -> Result<Vec<ObjectId>, StoreError> {
        if !is_hex_prefix(hex_prefix) {
            return Ok(Vec::new());
        }
        let prefix = hex_prefix.to_ascii_lowercase();
        let mut ids = Vec::new();

        if prefix.len() >= 2 {
            self.scan_dir(&prefix[..2], &prefix[2..], &mut ids)?;
        } else {
            let dir = self.paths.objects_dir();
            let entries = fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.len() == 2 && name.starts_with(&prefix) {
                    self.scan_dir(&name, "", &mut ids)?;
                }
            }
        }

        ids.sort();
        Ok(ids)
    }
}

/// Copy the closure of `tip` from one store into another.
///
/// Objects already present in `to` (and therefore, by the no-dangling
/// invariant, everything they reference) are skipped. Objects are written
/// children-first so `to` never holds a dangling reference, even if the
/// copy is interrupted.
///
/// Returns the number of objects copied.
pub fn copy_reachable(
    from: &dyn ObjectStore,
    to: &dyn ObjectStore,
    tip: &ObjectId,
) -> Result<usize, StoreError> {
    let mut copied = 0;
    let mut visited = HashSet::new();
    let mut stack = vec![(*tip, false)];

    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            let raw = from.read_raw(&id)?.ok_or(StoreError::NotFound { id })?;
            if to.write_raw(&id, &raw)? {
                copied += 1;
            }
            continue;
        }
        if !visited.insert(id) || to.contains(&id)? {
            continue;
        }
        let object = from.get(&id)?;
        stack.push((id, true));
        for referenced in object.references() {
            stack.push((referenced, false));
        }
    }

    if copied > 0 {
        tracing::debug!(tip = %tip.short(12), copied, "copied reachable objects");
    }
    Ok(copied)
}
