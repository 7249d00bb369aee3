//! # Identifier Allocator
//!
//! A queue of reusable identifiers persisted as a JSON array in `ids.json`.
//!
//! ```text
//! [4, 9, 12]
//!  ^  ^   ^
//!  |  |   watermark: next never-issued id
//!  recycled ids, issued first
//! ```
//!
//! The queue always holds at least one element and its last element is the
//! watermark. [`next`](IdAllocator::next) pops the front; popping the
//! watermark pushes `watermark + 1`. [`recycle`](IdAllocator::recycle) slots
//! the id in just ahead of the watermark.
//!
//! The allocator itself does no cross-process locking. The store wraps every
//! allocation in the `ids.lock` sentinel and reloads the queue first.

use anyhow::{bail, ensure, Context, Result};
use pending::DocId;
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Temporary file used during atomic allocator writes.
const IDS_TMP_FILENAME: &str = "ids.json.tmp";

#[derive(Debug, Clone)]
pub struct IdAllocator {
    path: PathBuf,
    queue: VecDeque<DocId>,
    closed: bool,
}

impl IdAllocator {
    /// Loads the allocator from `path`, or starts a fresh `[0]` queue if the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but is not a non-empty JSON array of
    /// identifiers.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let queue = Self::read_queue(&path)?;
        Ok(Self {
            path,
            queue,
            closed: false,
        })
    }

    /// Re-reads the persisted queue, discarding the in-memory one.
    pub fn reload(&mut self) -> Result<()> {
        self.queue = Self::read_queue(&self.path)?;
        Ok(())
    }

    fn read_queue(path: &Path) -> Result<VecDeque<DocId>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(VecDeque::from([0])),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read allocator at {}", path.display()))
            }
        };
        let queue: VecDeque<DocId> = serde_json::from_slice(&bytes)
            .with_context(|| format!("allocator at {} is not a JSON id list", path.display()))?;
        if queue.is_empty() {
            bail!("allocator at {} is empty", path.display());
        }
        Ok(queue)
    }

    /// Issues the next identifier.
    ///
    /// Does not persist; call [`save`](IdAllocator::save) afterwards.
    pub fn next(&mut self) -> Result<DocId> {
        ensure!(!self.closed, "allocator is closed");
        let id = self
            .queue
            .pop_front()
            .context("allocator queue is empty")?;
        if self.queue.is_empty() {
            let fresh = id
                .checked_add(1)
                .context("identifier space exhausted")?;
            self.queue.push_back(fresh);
        }
        Ok(id)
    }

    /// Returns `id` for reuse and persists the queue.
    ///
    /// # Errors
    ///
    /// Fails if `id` was never issued (it is at or past the watermark) or is
    /// already queued.
    pub fn recycle(&mut self, id: DocId) -> Result<()> {
        ensure!(!self.closed, "allocator is closed");
        let watermark = self.watermark();
        ensure!(id < watermark, "id {} was never issued (watermark {})", id, watermark);
        ensure!(!self.queue.contains(&id), "id {} is already free", id);

        let at = self.queue.len() - 1;
        self.queue.insert(at, id);
        self.save()
    }

    /// The smallest identifier never issued.
    #[must_use]
    pub fn watermark(&self) -> DocId {
        self.queue.back().copied().unwrap_or_default()
    }

    /// The queue in issue order.
    pub fn queue(&self) -> impl Iterator<Item = DocId> + '_ {
        self.queue.iter().copied()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Persists the queue atomically (temp file, fsync, rename).
    pub fn save(&self) -> Result<()> {
        let tmp_path = self.path.with_file_name(IDS_TMP_FILENAME);
        let bytes = serde_json::to_vec(&self.queue)?;
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| format!("failed to create {}", tmp_path.display()))?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Saves the queue and refuses further allocation.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.save()?;
        self.closed = true;
        Ok(())
    }
}
