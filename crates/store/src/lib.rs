//! # Store - ShelfDB Document Store
//!
//! Ties the [`index`], [`pending`], [`wal`] and [`lock`] crates together into
//! a single-node document store with deferred secondary indexing.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌──────────────────────────────────────────────────┐
//! │                     STORE                        │
//! │                                                  │
//! │ write.rs → allocate id (ids.lock) → data/<id>    │
//! │              |                                   │
//! │              v                                   │
//! │        WAL append → PendingBatch push            │
//! │                                                  │
//! │ flush.rs → per index key, under <key>.lock:      │
//! │            merge_insert(batch) → Flushed marker  │
//! │                                                  │
//! │ read.rs  → get / find / range over flushed state │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module          | Purpose                                             |
//! |-----------------|-----------------------------------------------------|
//! | [`lib.rs`]      | `Store` struct, `open`, accessors, `Debug`, `Drop`  |
//! | [`ids`]         | Identifier allocator persisted in `ids.json`        |
//! | [`documents`]   | JSON document blobs under `data/`                   |
//! | [`write`]       | `insert()`                                          |
//! | [`flush`]       | `flush()` and [`FlushError`]                        |
//! | [`read`]        | `get()`, `find()`, `range()`, `index_ids()`          |
//! | [`recovery`]    | Pending WAL replay and adoption, tmp file cleanup   |
//!
//! ## Durability
//!
//! A document blob is durable once `insert` returns. Its index entries are
//! appended to the store's own WAL under `wal/` before `insert` returns. A
//! later open adopts the WAL of a store that closed or died with entries
//! pending, so unflushed index work survives a crash. The WAL is truncated
//! once every pending entry has been merged.
//!
//! Several stores may share a root at once: each owns its WAL through a
//! lock sentinel and never replays another live store's entries. A sentinel
//! left by a crashed process must be removed by hand before its WAL is
//! adopted.
mod documents;
mod flush;
mod ids;
mod read;
mod recovery;
mod write;

use anyhow::{Context, Result};
use config::StoreConfig;
use lock::{FileLock, LockGuard};
use pending::{IndexKey, PendingBatch};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use wal::WalWriter;

pub use documents::JsonDocuments;
pub use flush::FlushError;
pub use ids::IdAllocator;
pub use recovery::replay_pending;

/// A snapshot of store counters, as reported by [`Store::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Number of stored documents.
    pub documents: usize,
    /// Smallest identifier never issued.
    pub next_id: u64,
    /// Pending index entries not yet flushed.
    pub pending_entries: usize,
    /// Index keys with pending entries.
    pub pending_indexes: usize,
    /// Flushed entries per index file.
    pub indexes: BTreeMap<String, usize>,
}

/// A ShelfDB store rooted at one directory.
///
/// # Write Path
///
/// 1. Allocate an identifier under the `ids.lock` sentinel.
/// 2. Write the document blob to `data/<id>.json`.
/// 3. Append one WAL record per indexable field, then buffer it in the
///    pending batch.
/// 4. If `auto_flush` is set and reached, flush.
///
/// # Flush
///
/// Every index key with pending entries is merged in one pass under its own
/// lock sentinel. See [`Store::flush`].
///
/// # Recovery
///
/// [`Store::open`] replays orphaned WALs into the pending batch.
pub struct Store {
    pub(crate) config: StoreConfig,
    pub(crate) ids: IdAllocator,
    pub(crate) documents: JsonDocuments,
    pub(crate) pending: PendingBatch,
    /// Keys whose pending entries came from WAL replay and may already be
    /// partly merged.
    pub(crate) recovered: BTreeSet<IndexKey>,
    pub(crate) wal_path: PathBuf,
    pub(crate) wal_writer: WalWriter,
    /// Sentinel marking `wal_path` as owned; released on close.
    pub(crate) wal_guard: Option<LockGuard>,
    pub(crate) closed: bool,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.config.root)
            .field("wal", &self.wal_path)
            .field("lock_timeout", &self.config.lock_timeout)
            .field("wal_sync", &self.config.wal_sync)
            .field("auto_flush", &self.config.auto_flush)
            .field("next_id", &self.ids.watermark())
            .field("pending_entries", &self.pending.len())
            .field("pending_indexes", &self.pending.index_count())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Store {
    /// Opens the store at `config.root`, creating its directories if needed.
    ///
    /// # Recovery Steps
    ///
    /// 1. Create `root`, `data/`, `index/` and `wal/`.
    /// 2. Remove `.tmp` files left by interrupted atomic writes.
    /// 3. Load the identifier allocator.
    /// 4. Replay every WAL without a live owner into a fresh pending batch.
    /// 5. Claim a new WAL, write the batch to it compactly, then delete the
    ///    adopted logs.
    pub fn open(config: StoreConfig) -> Result<Self> {
        for dir in [
            config.root.clone(),
            config.data_dir(),
            config.index_dir(),
            config.wal_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        recovery::cleanup_tmp_files(&config.root);
        recovery::cleanup_tmp_files(&config.data_dir());

        let ids = IdAllocator::load(config.ids_path())?;
        let documents = JsonDocuments::new(config.data_dir());

        // replay before opening the writer
        let mut pending = PendingBatch::new();
        let (adopted, replayed) = recovery::adopt_orphan_wals(&config.wal_dir(), &mut pending)?;
        let (wal_path, wal_guard) = recovery::claim_wal(&config.wal_dir())?;
        recovery::rewrite_wal(&wal_path, &pending)?;
        recovery::retire_wals(adopted)?;
        let recovered = pending.keys().cloned().collect();
        let wal_writer = WalWriter::create(&wal_path, config.wal_sync)?;

        info!(
            root = %config.root.display(),
            wal = %wal_path.display(),
            next_id = ids.watermark(),
            replayed,
            pending = pending.len(),
            "store opened"
        );

        Ok(Self {
            config,
            ids,
            documents,
            pending,
            recovered,
            wal_path,
            wal_writer,
            wal_guard: Some(wal_guard),
            closed: false,
        })
    }

    /// Opens the store at `root` with default settings.
    pub fn open_at<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open(StoreConfig::new(root))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Number of index entries waiting for a flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Index keys with pending entries, in flush order.
    pub fn pending_keys(&self) -> Vec<IndexKey> {
        self.pending.keys().cloned().collect()
    }

    /// This store's pending WAL.
    pub fn wal_path(&self) -> &Path {
        &self.wal_path
    }

    /// The identifier allocator as last loaded.
    pub fn allocator(&self) -> &IdAllocator {
        &self.ids
    }

    /// Document blob storage.
    pub fn documents(&self) -> &JsonDocuments {
        &self.documents
    }

    /// Current counters. Index sizes are taken from file sizes without
    /// locking.
    pub fn stats(&self) -> Result<StoreStats> {
        let mut indexes = BTreeMap::new();
        for entry in std::fs::read_dir(self.config.index_dir())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if index::parse_index_file_name(&name).is_some() {
                let len = entry.metadata()?.len() as usize / index::ID_WIDTH;
                indexes.insert(name, len);
            }
        }
        Ok(StoreStats {
            documents: self.documents.count()?,
            next_id: self.ids.watermark(),
            pending_entries: self.pending.len(),
            pending_indexes: self.pending.index_count(),
            indexes,
        })
    }

    /// Runs `f` on the allocator under the `ids.lock` sentinel, after
    /// reloading the persisted queue.
    pub(crate) fn with_allocator<T>(
        &mut self,
        f: impl FnOnce(&mut IdAllocator) -> Result<T>,
    ) -> Result<T> {
        let _guard = FileLock::new(self.ids.path())
            .lock(self.config.lock_timeout)
            .context("failed to lock the identifier allocator")?;
        self.ids.reload()?;
        f(&mut self.ids)
    }

    /// Saves the allocator and gives up the WAL. Pending index entries are
    /// **not** flushed; they stay in the WAL and the next open adopts them.
    /// An empty WAL is deleted.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.wal_writer.sync_to_disk()?;
        self.with_allocator(|ids| ids.close())?;
        if self.pending.is_empty() {
            match std::fs::remove_file(&self.wal_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to remove {}", self.wal_path.display()))
                }
            }
        }
        self.wal_guard = None;
        self.closed = true;
        debug!(pending = self.pending.len(), "store closed");
        Ok(())
    }
}

/// Best-effort close on drop.
///
/// Errors are logged and otherwise ignored; pending entries are still in the
/// WAL.
impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "store shutdown on drop failed");
        }
    }
}

#[cfg(test)]
mod tests;
