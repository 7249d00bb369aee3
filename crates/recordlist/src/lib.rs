//! # RecordList - Fixed-Width Record Array
//!
//! Treats a single file as a dense array of equal-length binary records.
//! ShelfDB stores every secondary index as a `RecordList` whose records are
//! 6-byte document identifiers.
//!
//! ## File Layout
//!
//! ```text
//! [record 0][record 1] ... [record n-1]
//! ```
//!
//! There is no header or footer: the record count is always
//! `file_size / item_len`, and a file whose size is not a multiple of
//! `item_len` is rejected as corrupt at open.
//!
//! ## Shifting
//!
//! [`insert`](RecordList::insert) and [`delete`](RecordList::delete) shift the
//! tail of the file in place. [`insert_many`](RecordList::insert_many) places
//! a whole sorted batch in one forward pass, so inserting `m` records into `n`
//! costs `O(n + m)` record moves instead of `O(n * m)`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use recordlist::RecordList;
//!
//! let mut list = RecordList::open("ids.idx", 4).unwrap();
//! list.append(&[0, 0, 0, 2]).unwrap();
//! list.insert(0, &[0, 0, 0, 1]).unwrap();
//! assert_eq!(list.get(1).unwrap(), vec![0, 0, 0, 2]);
//! list.close().unwrap();
//! ```

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Size of the read-ahead chunk used when shifting the tail left on delete.
pub const SHIFT_CHUNK_BYTES: usize = 1024 * 1024;

/// Errors that can occur during record list operations.
#[derive(Debug, Error)]
pub enum RecordListError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Access at or beyond the current record count.
    #[error("index {index} out of range (len {len})")]
    OutOfRange {
        /// The requested position.
        index: usize,
        /// The record count at the time of the call.
        len: usize,
    },

    /// A write whose payload is not exactly one record wide.
    #[error("record length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// The fixed record width of the list.
        expected: usize,
        /// The length of the rejected payload.
        actual: usize,
    },

    /// The backing file size is not a multiple of the record width.
    #[error("corrupt record list {}: size {size} is not a multiple of {item_len}", path.display())]
    Corrupt {
        /// Path of the offending file.
        path: PathBuf,
        /// File size in bytes.
        size: u64,
        /// Expected record width.
        item_len: usize,
    },

    /// Placement positions passed to `insert_many` went backwards.
    #[error("placement positions must be non-decreasing ({position} after {previous})")]
    UnorderedPlacement {
        /// The offending position.
        position: usize,
        /// The position that preceded it.
        previous: usize,
    },
}

/// A file-backed array of fixed-width records.
///
/// The handle is owned exclusively; it is released when the list is closed
/// via [`close`](RecordList::close) or dropped, whichever comes first.
pub struct RecordList {
    file: File,
    path: PathBuf,
    item_len: usize,
    len: usize,
}

impl std::fmt::Debug for RecordList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordList")
            .field("path", &self.path)
            .field("item_len", &self.item_len)
            .field("len", &self.len)
            .finish()
    }
}

/// Cursor state for one [`RecordList::insert_many`] pass.
///
/// `fifo` holds original records that were read ahead of the write cursor
/// and not yet rewritten. Records in it are originals
/// `next_original..read`, in order.
struct PlacementPass {
    read: usize,
    write: usize,
    next_original: usize,
    original_len: usize,
    fifo: VecDeque<Vec<u8>>,
}

impl RecordList {
    /// Opens (or creates) the record list at `path` with records of
    /// `item_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RecordListError::Corrupt`] if the existing file size is not a
    /// multiple of `item_len`, or `Io` if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, item_len: usize) -> Result<Self, RecordListError> {
        if item_len == 0 {
            return Err(RecordListError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "record width must be at least one byte",
            )));
        }

        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let size = file.metadata()?.len();
        if size % item_len as u64 != 0 {
            return Err(RecordListError::Corrupt {
                path,
                size,
                item_len,
            });
        }

        Ok(Self {
            file,
            path,
            item_len,
            len: (size / item_len as u64) as usize,
        })
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the list holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the width of a single record in bytes.
    #[must_use]
    pub fn item_len(&self) -> usize {
        self.item_len
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads record `index`.
    pub fn get(&mut self, index: usize) -> Result<Vec<u8>, RecordListError> {
        self.check_index(index)?;
        let mut buf = vec![0u8; self.item_len];
        self.read_record(index, &mut buf)?;
        Ok(buf)
    }

    /// Overwrites record `index` with `value`.
    pub fn set(&mut self, index: usize, value: &[u8]) -> Result<(), RecordListError> {
        self.check_index(index)?;
        self.check_width(value)?;
        self.write_record(index, value)?;
        Ok(())
    }

    /// Appends `value` after the last record.
    pub fn append(&mut self, value: &[u8]) -> Result<(), RecordListError> {
        self.check_width(value)?;
        self.write_record(self.len, value)?;
        self.len += 1;
        Ok(())
    }

    /// Inserts `value` at `index`, shifting records `index..` one slot right.
    ///
    /// Each step reads the record under the cursor, writes the pending value
    /// in its place and carries the old record forward, so the shift needs
    /// one record of extra memory and a single pass over the tail.
    pub fn insert(&mut self, index: usize, value: &[u8]) -> Result<(), RecordListError> {
        if index > self.len {
            return Err(RecordListError::OutOfRange {
                index,
                len: self.len,
            });
        }
        self.check_width(value)?;

        let mut pending = value.to_vec();
        let mut displaced = vec![0u8; self.item_len];
        let mut cursor = index;

        loop {
            let more = self.read_record(cursor, &mut displaced)?;
            self.write_record(cursor, &pending)?;
            if !more {
                break;
            }
            std::mem::swap(&mut pending, &mut displaced);
            cursor += 1;
        }

        self.len += 1;
        Ok(())
    }

    /// Removes record `index`, shifting the tail one slot left and truncating
    /// the file by one record.
    pub fn delete(&mut self, index: usize) -> Result<(), RecordListError> {
        self.check_index(index)?;

        let item_len = self.item_len as u64;
        let end = self.len as u64 * item_len;
        let mut write_pos = index as u64 * item_len;
        let mut read_pos = write_pos + item_len;

        let tail = (end - read_pos) as usize;
        let mut chunk = vec![0u8; tail.min(SHIFT_CHUNK_BYTES)];

        while read_pos < end {
            let n = ((end - read_pos) as usize).min(chunk.len());
            self.file.seek(SeekFrom::Start(read_pos))?;
            self.file.read_exact(&mut chunk[..n])?;
            self.file.seek(SeekFrom::Start(write_pos))?;
            self.file.write_all(&chunk[..n])?;
            read_pos += n as u64;
            write_pos += n as u64;
        }

        self.file.set_len(end - item_len)?;
        self.len -= 1;
        Ok(())
    }

    /// Inserts a batch of records in a single forward pass.
    ///
    /// Each placement is `(position, record)` where `position` is an index
    /// into the list **as it was before the call**, and positions must be
    /// non-decreasing. The `k`-th placement (0-based) lands at
    /// `position + k` in the result; records sharing a position keep their
    /// batch order, and all of them precede the original record that was at
    /// that position.
    ///
    /// The prefix before the first position is never touched. Original
    /// records are read just before the write cursor would overwrite them
    /// and are held in a FIFO until rewritten; after `k` placements the FIFO
    /// holds at most `k + 1` records.
    ///
    /// Returns the number of records inserted.
    ///
    /// # Errors
    ///
    /// All placements are validated before the file is modified:
    /// `OutOfRange` if a position exceeds the current length,
    /// `UnorderedPlacement` if positions decrease, `LengthMismatch` on a
    /// payload of the wrong width.
    pub fn insert_many(&mut self, placements: &[(usize, Vec<u8>)]) -> Result<usize, RecordListError> {
        let mut previous = 0usize;
        for (position, record) in placements {
            if *position > self.len {
                return Err(RecordListError::OutOfRange {
                    index: *position,
                    len: self.len,
                });
            }
            if *position < previous {
                return Err(RecordListError::UnorderedPlacement {
                    position: *position,
                    previous,
                });
            }
            self.check_width(record)?;
            previous = *position;
        }

        let first = match placements.first() {
            Some((position, _)) => *position,
            None => return Ok(0),
        };

        let mut pass = PlacementPass {
            read: first,
            write: first,
            next_original: first,
            original_len: self.len,
            fifo: VecDeque::new(),
        };

        for (position, record) in placements {
            while pass.next_original < *position {
                self.emit_original(&mut pass)?;
            }
            self.read_ahead(&mut pass)?;
            self.write_record(pass.write, record)?;
            pass.write += 1;
        }

        while pass.next_original < pass.original_len {
            self.emit_original(&mut pass)?;
        }

        self.len += placements.len();
        Ok(placements.len())
    }

    /// Reads every record in order.
    pub fn read_all(&mut self) -> Result<Vec<Vec<u8>>, RecordListError> {
        let mut raw = Vec::with_capacity(self.len * self.item_len);
        self.file.seek(SeekFrom::Start(0))?;
        (&mut self.file)
            .take((self.len * self.item_len) as u64)
            .read_to_end(&mut raw)?;
        Ok(raw.chunks_exact(self.item_len).map(|c| c.to_vec()).collect())
    }

    /// Flushes written records to stable storage.
    pub fn sync(&mut self) -> Result<(), RecordListError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Closes the list, releasing the file handle.
    pub fn close(mut self) -> Result<(), RecordListError> {
        self.file.flush()?;
        Ok(())
    }

    /// Buffers every original record at or before the write cursor that has
    /// not been read yet, so the next write cannot clobber unread data.
    fn read_ahead(&mut self, pass: &mut PlacementPass) -> Result<(), RecordListError> {
        while pass.read <= pass.write && pass.read < pass.original_len {
            let mut record = vec![0u8; self.item_len];
            self.read_record(pass.read, &mut record)?;
            pass.fifo.push_back(record);
            pass.read += 1;
        }
        Ok(())
    }

    /// Rewrites the next original record at the write cursor.
    fn emit_original(&mut self, pass: &mut PlacementPass) -> Result<(), RecordListError> {
        self.read_ahead(pass)?;
        let record = pass.fifo.pop_front().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "placement pass lost original record {} in {}",
                    pass.next_original,
                    self.path.display()
                ),
            )
        })?;
        self.write_record(pass.write, &record)?;
        pass.write += 1;
        pass.next_original += 1;
        Ok(())
    }

    /// Reads record `index` into `buf`, returning `false` if the file ends
    /// before a full record.
    fn read_record(&mut self, index: usize, buf: &mut [u8]) -> io::Result<bool> {
        self.file
            .seek(SeekFrom::Start(index as u64 * self.item_len as u64))?;
        match self.file.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn write_record(&mut self, index: usize, value: &[u8]) -> io::Result<()> {
        self.file
            .seek(SeekFrom::Start(index as u64 * self.item_len as u64))?;
        self.file.write_all(value)
    }

    fn check_index(&self, index: usize) -> Result<(), RecordListError> {
        if index >= self.len {
            return Err(RecordListError::OutOfRange {
                index,
                len: self.len,
            });
        }
        Ok(())
    }

    fn check_width(&self, value: &[u8]) -> Result<(), RecordListError> {
        if value.len() != self.item_len {
            return Err(RecordListError::LengthMismatch {
                expected: self.item_len,
                actual: value.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
