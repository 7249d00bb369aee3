//! # Lock - Advisory Sentinel-File Lock
//!
//! Cooperative mutual exclusion between processes that share a directory.
//! The lock for a file `foo.idx` is the zero-byte sentinel `foo.lock` next to
//! it; the lock is held exactly while the sentinel exists.
//!
//! Acquisition creates the sentinel with `create_new`, which fails atomically
//! if it already exists, so two callers can never both observe "free" and
//! both create it. Nothing stops a process that ignores the convention, and a
//! sentinel left behind by a crashed process must be removed by hand.
//!
//! ## Example
//!
//! ```rust,no_run
//! use lock::FileLock;
//! use std::time::Duration;
//!
//! let guard = FileLock::new("index/age-int.idx")
//!     .lock(Duration::from_secs(1))
//!     .unwrap();
//! // ... rewrite index/age-int.idx ...
//! drop(guard); // removes index/age-int.lock
//! ```

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// Interval between attempts while waiting for a held lock.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Extension of sentinel files.
pub const LOCK_EXTENSION: &str = "lock";

/// Errors from [`FileLock::lock`].
#[derive(Debug, Error)]
pub enum LockError {
    /// The sentinel could not be created for a reason other than already
    /// existing.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Another holder kept the sentinel for the whole timeout.
    #[error("timed out after {waited:?} waiting for lock {}", path.display())]
    Timeout { path: PathBuf, waited: Duration },
}

/// A sentinel-file lock guarding one path.
#[derive(Debug)]
pub struct FileLock {
    lock_path: PathBuf,
    held: bool,
}

impl FileLock {
    /// Creates the lock guarding `path`. Nothing touches the filesystem
    /// until [`acquire`](FileLock::acquire).
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            lock_path: path.as_ref().with_extension(LOCK_EXTENSION),
            held: false,
        }
    }

    /// Path of the sentinel file.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Returns `true` if this handle created the sentinel and has not
    /// released it yet.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Tries to create the sentinel, polling every [`POLL_INTERVAL`] while
    /// it exists.
    ///
    /// A zero `timeout` waits forever. Returns `false` if the timeout
    /// elapses or the sentinel cannot be created.
    pub fn acquire(&mut self, timeout: Duration) -> bool {
        self.try_acquire(timeout).is_ok()
    }

    /// Deletes the sentinel. Returns `false` if it could not be removed
    /// (for example because it was already gone).
    pub fn release(&mut self) -> bool {
        self.held = false;
        match std::fs::remove_file(&self.lock_path) {
            Ok(()) => {
                debug!(lock = %self.lock_path.display(), "lock released");
                true
            }
            Err(e) => {
                debug!(lock = %self.lock_path.display(), error = %e, "lock release failed");
                false
            }
        }
    }

    /// Acquires the lock and returns a guard that releases it on drop.
    ///
    /// # Errors
    ///
    /// [`LockError::Timeout`] if the sentinel stayed in place for `timeout`
    /// (zero waits forever), [`LockError::Io`] if it could not be created.
    pub fn lock(mut self, timeout: Duration) -> Result<LockGuard, LockError> {
        self.try_acquire(timeout)?;
        Ok(LockGuard { lock: self })
    }

    /// Makes a single attempt at the lock, returning `Ok(None)` if the
    /// sentinel already exists.
    ///
    /// # Errors
    ///
    /// [`LockError::Io`] if the sentinel could not be created.
    pub fn try_lock(mut self) -> Result<Option<LockGuard>, LockError> {
        if self.create_sentinel()? {
            Ok(Some(LockGuard { lock: self }))
        } else {
            Ok(None)
        }
    }

    /// One `create_new` attempt. `Ok(false)` means someone else holds it.
    fn create_sentinel(&mut self) -> Result<bool, LockError> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
        {
            Ok(_) => {
                self.held = true;
                debug!(lock = %self.lock_path.display(), "lock acquired");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => {
                warn!(lock = %self.lock_path.display(), error = %e, "cannot create lock sentinel");
                Err(LockError::Io(e))
            }
        }
    }

    fn try_acquire(&mut self, timeout: Duration) -> Result<(), LockError> {
        let start = Instant::now();
        loop {
            if self.create_sentinel()? {
                return Ok(());
            }

            let waited = start.elapsed();
            let nap = if timeout.is_zero() {
                POLL_INTERVAL
            } else if waited >= timeout {
                debug!(lock = %self.lock_path.display(), ?waited, "lock wait timed out");
                return Err(LockError::Timeout {
                    path: self.lock_path.clone(),
                    waited,
                });
            } else {
                POLL_INTERVAL.min(timeout - waited)
            };
            thread::sleep(nap);
        }
    }
}

/// Holds a [`FileLock`] and releases it when dropped.
#[derive(Debug)]
pub struct LockGuard {
    lock: FileLock,
}

impl LockGuard {
    /// Path of the held sentinel.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        self.lock.lock_path()
    }

    /// Releases the lock now, reporting whether the sentinel was removed.
    pub fn release(mut self) -> bool {
        self.lock.release()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.lock.is_held() {
            self.lock.release();
        }
    }
}
