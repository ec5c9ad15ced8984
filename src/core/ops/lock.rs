//! core::ops::lock
//!
//! Single-writer lock for an on-disk repository.
//!
//! `commit_change` followed by `push` must see one consistent local head.
//! `&mut` access to the controller guarantees that inside a process; the
//! lock file at `<root>/.treesync/lock` extends it to every process sharing
//! the repository. The lock is advisory (`fs2`), taken without blocking, and
//! released when the guard drops. While held, the file names the holder's
//! process id.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

use crate::core::paths::RepoPaths;

/// Errors from taking the repository lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another writer holds the lock.
    #[error("repository is locked by another writer ({0})")]
    AlreadyLocked(PathBuf),

    /// The lock file could not be opened or written.
    #[error("cannot lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Guard for the repository lock.
#[derive(Debug)]
pub struct RepoLock {
    path: PathBuf,
    file: File,
}

impl RepoLock {
    /// Take the lock, failing immediately if another writer holds it.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if the lock is held elsewhere
    /// - [`LockError::Io`] if the repository metadata directory is missing
    ///   or the lock file cannot be written
    pub fn acquire(paths: &RepoPaths) -> Result<Self, LockError> {
        let path = paths.lock_path();
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(LockError::AlreadyLocked(path));
            }
            Err(e) => return Err(io_err(e)),
        }

        file.set_len(0).map_err(io_err)?;
        file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        writeln!(file, "{}", std::process::id()).map_err(io_err)?;

        tracing::debug!(path = %path.display(), "acquired repository lock");
        Ok(Self { path, file })
    }

    /// Location of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Process id recorded in the lock file at `paths`, if any.
    ///
    /// Only meaningful while some process holds the lock.
    pub fn holder(paths: &RepoPaths) -> Option<u32> {
        let mut text = String::new();
        File::open(paths.lock_path())
            .and_then(|mut f| f.read_to_string(&mut text))
            .ok()?;
        text.trim().parse().ok()
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = self.file.unlock();
        tracing::debug!(path = %self.path.display(), "released repository lock");
    }
}
