//! core::paths
//!
//! Centralized path routing for on-disk repository storage.
//!
//! # Storage Layout
//!
//! All repository data lives under `<root>/.treesync/`:
//! - `objects/<2 hex>/<62 hex>` - Canonically encoded objects
//! - `refs/...` - One file per reference
//! - `config.toml` - Repository configuration
//! - `lock` - Exclusive lock file
//!
//! **Hard rule:** no code outside this module computes `.join(".treesync")`
//! paths. Everything routes through [`RepoPaths`].
//!
//! # Example
//!
//! ```
//! use treesync::core::paths::RepoPaths;
//! use std::path::PathBuf;
//!
//! let paths = RepoPaths::new(PathBuf::from("/work/project"));
//!
//! assert_eq!(
//!     paths.config_path(),
//!     PathBuf::from("/work/project/.treesync/config.toml")
//! );
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::types::{ObjectId, RefName};

/// Name of the metadata directory inside a working tree.
pub const META_DIR: &str = ".treesync";

/// Centralized path routing for repository storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPaths {
    /// Working tree root.
    pub root: PathBuf,
}

impl RepoPaths {
    /// Create routing for a working tree rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The `.treesync` directory.
    pub fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    /// Directory holding all objects.
    pub fn objects_dir(&self) -> PathBuf {
        self.meta_dir().join("objects")
    }

    /// Fan-out file location of one object.
    ///
    /// The first two hex characters select the directory, which keeps
    /// directories small and makes prefix lookup a single directory scan.
    ///
    /// ```
    /// use treesync::core::paths::RepoPaths;
    /// use treesync::core::types::ObjectId;
    /// use std::path::PathBuf;
    ///
    /// let paths = RepoPaths::new(PathBuf::from("/r"));
    /// let id = ObjectId::hash(b"");
    /// let hex = id.to_hex();
    /// assert_eq!(
    ///     paths.object_path(&id),
    ///     PathBuf::from(format!("/r/.treesync/objects/{}/{}", &hex[..2], &hex[2..]))
    /// );
    /// ```
    pub fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.objects_dir().join(&hex[..2]).join(&hex[2..])
    }

    /// Directory holding references.
    pub fn refs_dir(&self) -> PathBuf {
        self.meta_dir().join("refs")
    }

    /// File backing one reference.
    pub fn ref_path(&self, name: &RefName) -> PathBuf {
        let mut path = self.meta_dir();
        for component in name.as_str().split('/') {
            path.push(component);
        }
        path
    }

    /// Repository configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.meta_dir().join("config.toml")
    }

    /// Exclusive lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.meta_dir().join("lock")
    }

    /// Whether a repository has been initialized at this root.
    pub fn exists(&self) -> bool {
        self.objects_dir().is_dir() && self.refs_dir().is_dir()
    }

    /// Working tree root.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Disambiguates temp files written concurrently from one process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_sibling(path: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), n))
}

/// Replace `path` with `bytes` via a hidden sibling temp file and a rename,
/// creating parent directories. Readers never observe a partial file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp = temp_sibling(path);
    fs::write(&temp, bytes)?;
    fs::rename(&temp, path).map_err(|e| {
        let _ = fs::remove_file(&temp);
        e
    })
}
