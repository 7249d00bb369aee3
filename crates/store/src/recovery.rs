/// Pending WAL replay, WAL ownership and cold-start cleanup.
///
/// Every open store appends to its own `wal/<pid>-<seq>.wal` and holds the
/// matching `.lock` sentinel until it closes. A log whose sentinel is absent
/// belongs to a store that closed or crashed with entries still pending;
/// the next store to open adopts it.
use anyhow::{bail, Context, Result};
use lock::{FileLock, LockGuard};
use pending::PendingBatch;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};
use wal::{WalError, WalReader, WalRecord, WalWriter};

/// Extension of pending WAL files.
pub(crate) const WAL_EXTENSION: &str = "wal";

/// Per-process sequence for WAL file names.
static WAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// A WAL taken over from a store that is no longer running. Its sentinel
/// stays held until the log is deleted.
pub(crate) struct AdoptedWal {
    pub(crate) path: PathBuf,
    _guard: LockGuard,
}

/// Replays every unowned WAL in `dir` into `pending`.
///
/// Logs whose sentinel exists belong to a live store and are left alone.
/// Temp files from an interrupted rewrite are removed when their owner is
/// gone. Returns the adopted logs and the number of records replayed.
pub(crate) fn adopt_orphan_wals(
    dir: &Path,
    pending: &mut PendingBatch,
) -> Result<(Vec<AdoptedWal>, usize)> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = entry?.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some(WAL_EXTENSION) => paths.push(path),
            Some("tmp") => {
                let owner = path.with_extension("");
                if !FileLock::new(&owner).lock_path().exists() {
                    debug!(path = %path.display(), "removing leftover tmp file");
                    let _ = fs::remove_file(&path);
                }
            }
            _ => {}
        }
    }
    paths.sort();

    let mut adopted = Vec::new();
    let mut records = 0;
    for path in paths {
        let Some(guard) = FileLock::new(&path).try_lock()? else {
            debug!(wal = %path.display(), "WAL owned by an open store");
            continue;
        };
        records += replay_pending(&path, pending)?;
        adopted.push(AdoptedWal { path, _guard: guard });
    }
    if !adopted.is_empty() {
        info!(logs = adopted.len(), records, "adopted pending WALs");
    }
    Ok((adopted, records))
}

/// Picks a fresh WAL path in `dir` and takes its sentinel.
pub(crate) fn claim_wal(dir: &Path) -> Result<(PathBuf, LockGuard)> {
    for _ in 0..1024 {
        let seq = WAL_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("{}-{}.{}", std::process::id(), seq, WAL_EXTENSION));
        if path.exists() {
            continue;
        }
        if let Some(guard) = FileLock::new(&path).try_lock()? {
            return Ok((path, guard));
        }
    }
    bail!("no free WAL name in {}", dir.display())
}

/// Deletes logs whose entries now live in this store's own WAL.
pub(crate) fn retire_wals(adopted: Vec<AdoptedWal>) -> Result<()> {
    for wal in adopted {
        fs::remove_file(&wal.path)
            .with_context(|| format!("failed to remove adopted WAL {}", wal.path.display()))?;
    }
    Ok(())
}

/// Replays the pending WAL into `pending`, returning the number of records
/// read.
///
/// `Pending` records are buffered in log order; a `Flushed { key }` marker
/// drops everything buffered for `key` so far. A missing WAL is a fresh
/// start.
///
/// # Errors
///
/// Propagates corruption (CRC mismatch, malformed record) from
/// [`WalReader::replay`].
pub fn replay_pending<P: AsRef<Path>>(path: P, pending: &mut PendingBatch) -> Result<usize> {
    let mut reader = match WalReader::open(path.as_ref()) {
        Ok(reader) => reader,
        Err(WalError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(anyhow::anyhow!(e).context("failed to open pending WAL for replay")),
    };

    let mut records = 0usize;
    reader
        .replay(|r| {
            records += 1;
            match r {
                WalRecord::Pending { key, id, value } => {
                    pending.push(key, id, value);
                }
                WalRecord::Flushed { key } => {
                    pending.discard(&key);
                }
            }
        })
        .context("failed to replay pending WAL")?;

    debug!(records, pending = pending.len(), "replayed pending WAL");
    Ok(records)
}

/// Rewrites the WAL to hold exactly the entries in `pending`.
///
/// Drops `Flushed` markers, records for flushed keys and any torn tail, so
/// later appends never land behind unreadable bytes. The new log is written
/// to a temp file and renamed over the old one.
pub(crate) fn rewrite_wal(path: &Path, pending: &PendingBatch) -> Result<()> {
    let tmp_path = path.with_extension("wal.tmp");
    {
        let mut writer = WalWriter::create(&tmp_path, false)?;
        for key in pending.keys() {
            for entry in pending.get(key) {
                writer.append(&WalRecord::Pending {
                    key: key.clone(),
                    id: entry.id,
                    value: entry.value,
                })?;
            }
        }
        writer.sync_to_disk()?;
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

/// Truncates the WAL to zero bytes, creating it if absent.
pub(crate) fn truncate_wal(path: &Path) -> Result<()> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("failed to truncate {}", path.display()))?;
    Ok(())
}

/// Removes `*.tmp` files left by interrupted atomic writes.
pub(crate) fn cleanup_tmp_files(dir: &Path) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let p = entry.path();
            if p.extension().is_some_and(|e| e == "tmp") {
                debug!(path = %p.display(), "removing leftover tmp file");
                let _ = std::fs::remove_file(&p);
            }
        }
    }
}
