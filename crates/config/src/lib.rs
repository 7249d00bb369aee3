//! Runtime configuration for a ShelfDB store.
//!
//! | Variable                | Default   | Meaning                                  |
//! |-------------------------|-----------|------------------------------------------|
//! | `SHELF_ROOT`            | `./shelf` | Store root directory                     |
//! | `SHELF_LOCK_TIMEOUT_MS` | `5000`    | Lock wait in ms; `0` waits forever       |
//! | `SHELF_WAL_SYNC`        | `true`    | fsync the pending WAL after every append |
//! | `SHELF_AUTO_FLUSH`      | `0`       | Flush after this many pending entries; `0` disables |
//!
//! Unparseable values fall back to the default with a warning.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const ENV_ROOT: &str = "SHELF_ROOT";
pub const ENV_LOCK_TIMEOUT_MS: &str = "SHELF_LOCK_TIMEOUT_MS";
pub const ENV_WAL_SYNC: &str = "SHELF_WAL_SYNC";
pub const ENV_AUTO_FLUSH: &str = "SHELF_AUTO_FLUSH";

/// Default store root.
pub const DEFAULT_ROOT: &str = "./shelf";
/// Default lock wait.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for opening a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory holding the allocator, WAL, documents and indexes.
    pub root: PathBuf,
    /// How long to wait for a lock sentinel. [`Duration::ZERO`] waits
    /// forever.
    pub lock_timeout: Duration,
    /// Whether every WAL append is fsynced before returning.
    pub wal_sync: bool,
    /// Flush once this many entries are pending. `0` leaves flushing to the
    /// caller.
    pub auto_flush: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            wal_sync: true,
            auto_flush: 0,
        }
    }
}

impl StoreConfig {
    /// Default settings rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Reads settings from the `SHELF_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which returns the raw value of a
    /// variable or `None` if it is unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let root = lookup(ENV_ROOT).map(PathBuf::from).unwrap_or(defaults.root);
        let timeout_ms = setting(
            &lookup,
            ENV_LOCK_TIMEOUT_MS,
            defaults.lock_timeout.as_millis() as u64,
        );
        let wal_sync = setting(&lookup, ENV_WAL_SYNC, defaults.wal_sync);
        let auto_flush = setting(&lookup, ENV_AUTO_FLUSH, defaults.auto_flush);

        Self {
            root,
            lock_timeout: Duration::from_millis(timeout_ms),
            wal_sync,
            auto_flush,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_wal_sync(mut self, sync: bool) -> Self {
        self.wal_sync = sync;
        self
    }

    pub fn with_auto_flush(mut self, threshold: usize) -> Self {
        self.auto_flush = threshold;
        self
    }

    /// Path of the persisted identifier allocator.
    pub fn ids_path(&self) -> PathBuf {
        self.root.join("ids.json")
    }

    /// Directory of pending-entry write-ahead logs, one per open store.
    pub fn wal_dir(&self) -> PathBuf {
        self.root.join("wal")
    }

    /// Directory of document blobs.
    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    /// Directory of index files.
    pub fn index_dir(&self) -> PathBuf {
        self.root.join("index")
    }
}

fn setting<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(key, value = %raw, "unparseable setting, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests;
