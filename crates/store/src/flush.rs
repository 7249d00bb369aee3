/// Flush path: merges the pending batch into the index files.
use anyhow::Result;
use index::{index_file_name, SecondaryIndex};
use lock::{FileLock, LockError, LockGuard};
use pending::{IndexKey, PendingEntry};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use wal::{WalRecord, WalWriter};

use crate::{recovery, Store};

/// An index that could not be flushed.
///
/// The locked index keeps its pending entries for a retry; every other
/// index in the same flush is still merged. Index queries report the same
/// error when the index stays locked.
#[derive(Debug, Error)]
pub enum FlushError {
    #[error("timed out after {waited:?} waiting for the lock on index {index}")]
    LockTimeout { index: IndexKey, waited: Duration },
}

impl Store {
    /// Path of the index file for `key`.
    pub fn index_path(&self, key: &IndexKey) -> PathBuf {
        self.config.index_dir().join(index_file_name(key))
    }

    /// Takes the lock sentinel guarding `key`'s index file.
    pub(crate) fn lock_index(&self, key: &IndexKey) -> Result<LockGuard> {
        match FileLock::new(self.index_path(key)).lock(self.config.lock_timeout) {
            Ok(guard) => Ok(guard),
            Err(LockError::Timeout { waited, .. }) => {
                warn!(index = %key, ?waited, "index lock timed out");
                Err(FlushError::LockTimeout {
                    index: key.clone(),
                    waited,
                }
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Merges every pending entry into its index file and returns how many
    /// entries were written.
    ///
    /// # Steps
    ///
    /// For each index key with pending entries, in key order:
    ///
    /// 1. Acquire `<field>-<tag>.lock` (bounded by the lock timeout).
    /// 2. Open the index and [`merge_insert`](SecondaryIndex::merge_insert)
    ///    the key's entries in insertion order.
    /// 3. Sync and close the index, release the lock.
    /// 4. Drop the key's pending entries and log a `Flushed` WAL marker.
    ///
    /// A key whose lock times out is skipped and the remaining keys are
    /// still flushed. Once nothing is pending the WAL is truncated.
    ///
    /// # Errors
    ///
    /// The first [`FlushError::LockTimeout`] (downcast from the returned
    /// error) after every other index has been flushed. Any I/O or
    /// resolution error from a merge stops the flush at that key. Either way
    /// the failing key's entries stay pending.
    pub fn flush(&mut self) -> Result<usize> {
        let keys: Vec<IndexKey> = self.pending.keys().cloned().collect();
        let mut written = 0;
        let mut timed_out = None;

        for key in keys {
            let entries = self.pending.get(&key);
            let guard = match self.lock_index(&key) {
                Ok(guard) => guard,
                Err(e) if e.is::<FlushError>() => {
                    timed_out.get_or_insert(e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let inserted = self.merge_locked(&key, &entries)?;
            guard.release();

            self.pending.discard(&key);
            self.recovered.remove(&key);
            self.wal_writer.append(&WalRecord::Flushed { key: key.clone() })?;
            written += inserted;
            debug!(index = %key, inserted, "index flushed");
        }

        if self.pending.is_empty() {
            recovery::truncate_wal(&self.wal_path)?;
            self.wal_writer = WalWriter::create(&self.wal_path, self.config.wal_sync)?;
        }

        if written > 0 {
            info!(entries = written, deferred = self.pending.index_count(), "flush complete");
        }
        match timed_out {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Merges `entries` into `key`'s index. The caller holds the lock.
    ///
    /// Entries recovered from the WAL may already be in the index if a
    /// previous process crashed between merging and logging the `Flushed`
    /// marker; those are skipped.
    fn merge_locked(&self, key: &IndexKey, entries: &[PendingEntry]) -> Result<usize> {
        let mut index = SecondaryIndex::open(self.config.index_dir(), key.clone(), &self.documents)?;

        let inserted = if self.recovered.contains(key) {
            let mut fresh = Vec::with_capacity(entries.len());
            for entry in entries {
                if !index.contains(entry.id, &entry.value)? {
                    fresh.push(entry.clone());
                }
            }
            if fresh.len() < entries.len() {
                warn!(
                    index = %key,
                    skipped = entries.len() - fresh.len(),
                    "recovered entries already indexed"
                );
            }
            index.merge_insert(&fresh)?
        } else {
            index.merge_insert(entries)?
        };

        index.sync()?;
        index.close()?;
        Ok(inserted)
    }
}
