//! Advisory file locks that keep two nchat processes off the same state.
//!
//! [`DirLock`] is the session guard: it locks the application directory for
//! the lifetime of the process. [`PathLock`] offers the same primitive for a
//! single file, for backends that need finer-grained exclusivity.
//!
//! Both use `flock`-style locks via `fs2`. The OS drops them when the file
//! descriptor is closed, so a crashed process never leaves a stale lock.
//! The locks are per process, not per thread.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

/// Errors from acquiring a lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another process holds the lock.
    #[error("{} is locked by another process", path.display())]
    Contended {
        /// The locked path.
        path: PathBuf,
    },

    /// The path could not be opened or locked.
    #[error("failed to lock {}: {source}", path.display())]
    Io {
        /// The path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Exclusive, non-blocking lock on a directory.
#[derive(Debug)]
pub struct DirLock {
    path: PathBuf,
    file: Option<File>,
}

impl DirLock {
    /// Open `dir` and take an exclusive lock on it without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Contended`] if another process holds the lock and
    /// [`LockError::Io`] if the directory cannot be opened.
    pub fn try_acquire(dir: &Path) -> Result<Self, LockError> {
        let file = File::open(dir).map_err(|source| LockError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        try_lock_file(&file, dir)?;
        tracing::debug!(path = %dir.display(), "directory lock acquired");
        Ok(Self {
            path: dir.to_path_buf(),
            file: Some(file),
        })
    }

    /// Whether this guard still holds the lock.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.file.is_some()
    }

    /// The locked directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock explicitly. Dropping the guard has the same effect.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                tracing::warn!(path = %self.path.display(), error = %e, "directory unlock failed");
            }
            tracing::debug!(path = %self.path.display(), "directory lock released");
        }
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Exclusive lock on a single file, created if missing.
#[derive(Debug)]
pub struct PathLock {
    path: PathBuf,
    file: File,
    held: bool,
}

impl PathLock {
    /// Open (or create) the lock file. Does not lock it yet.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Io`] if the file cannot be opened.
    pub fn new(path: &Path) -> Result<Self, LockError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|source| LockError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            held: false,
        })
    }

    /// Block until the lock is acquired.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Io`] if the lock call fails.
    pub fn lock(&mut self) -> Result<(), LockError> {
        if self.held {
            return Ok(());
        }
        self.file.lock_exclusive().map_err(|source| LockError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.held = true;
        Ok(())
    }

    /// Acquire the lock without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Contended`] if another process holds it.
    pub fn try_lock(&mut self) -> Result<(), LockError> {
        if self.held {
            return Ok(());
        }
        try_lock_file(&self.file, &self.path)?;
        self.held = true;
        Ok(())
    }

    /// Release the lock if held.
    pub fn unlock(&mut self) {
        if self.held {
            if let Err(e) = FileExt::unlock(&self.file) {
                tracing::warn!(path = %self.path.display(), error = %e, "file unlock failed");
            }
            self.held = false;
        }
    }

    /// Whether the lock is currently held.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.held
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        self.unlock();
    }
}

fn try_lock_file(file: &File, path: &Path) -> Result<(), LockError> {
    match file.try_lock_exclusive() {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => Err(LockError::Contended {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(LockError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
