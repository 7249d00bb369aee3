//! # WAL - Pending-Batch Write-Ahead Log
//!
//! Makes buffered index mutations survive a crash between `insert` and
//! `flush`.
//!
//! Every pending index entry is serialized into a binary record and appended
//! to the WAL **before** `insert` returns. When an index has been merged, a
//! `Flushed` marker for its key is appended; on restart the log is replayed
//! and every entry not followed by a marker for its key is buffered again.
//! Once nothing is pending the store truncates the log.
//!
//! ## Binary Record Format
//!
//! ```text
//! [record_len: u32 LE][crc32: u32 LE][body ...]
//! ```
//!
//! Body (Pending): `[op=0: u8][kind: u8][field_len: u32][field][id: u64][value: i64]`
//! Body (Flushed): `[op=1: u8][kind: u8][field_len: u32][field]`
//!
//! `kind` is the field type code (`0` = integer). `record_len` includes the
//! 4-byte CRC but **not** itself.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pending::{FieldType, IndexKey, ScalarValue};
//! use wal::{WalReader, WalRecord, WalWriter};
//!
//! let key = IndexKey::new("age", FieldType::Integer);
//! let mut w = WalWriter::create("pending.wal", true).unwrap();
//! w.append(&WalRecord::Pending {
//!     key: key.clone(),
//!     id: 7,
//!     value: ScalarValue::Integer(30),
//! }).unwrap();
//! drop(w);
//!
//! let mut r = WalReader::open("pending.wal").unwrap();
//! r.replay(|rec| println!("{:?}", rec)).unwrap();
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use pending::{DocId, FieldType, IndexKey, ScalarValue};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use thiserror::Error;

/// Largest field name accepted in a record.
pub const MAX_FIELD_BYTES: usize = 64 * 1024;

/// A single WAL record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// An index entry buffered by `insert`.
    Pending {
        /// The index the entry belongs to.
        key: IndexKey,
        /// The inserted document.
        id: DocId,
        /// The document's value for the indexed field.
        value: ScalarValue,
    },
    /// Every earlier `Pending` record for `key` has been merged into its
    /// index file.
    Flushed {
        /// The flushed index.
        key: IndexKey,
    },
}

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record failed CRC validation or contained an unknown op or type code.
    #[error("corrupt record")]
    Corrupt,
}

fn kind_code(kind: FieldType) -> u8 {
    match kind {
        FieldType::Integer => 0,
    }
}

fn kind_from_code(code: u8) -> Option<FieldType> {
    match code {
        0 => Some(FieldType::Integer),
        _ => None,
    }
}

/// Append-only WAL writer.
///
/// Records are serialized into an in-memory buffer, CRC-checksummed, and then
/// written to the underlying file in a single `write_all` call. When `sync` is
/// `true`, every append is followed by `sync_all()` (fsync).
pub struct WalWriter {
    file: File,
    sync: bool,
    /// Reusable scratch buffer to avoid allocation on every append.
    buf: Vec<u8>,
}

impl WalWriter {
    /// Opens (or creates) a WAL file in append mode.
    ///
    /// # Arguments
    ///
    /// * `path` - file system path for the WAL (created if it does not exist).
    /// * `sync` - if true, every `append` call is followed by `fsync`.
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;
        Ok(Self {
            file,
            sync,
            buf: Vec::with_capacity(64),
        })
    }

    /// Serializes `record` and appends it to the WAL file.
    pub fn append(&mut self, record: &WalRecord) -> Result<(), WalError> {
        self.buf.clear();

        // frame header (record_len + crc), filled in below
        self.buf.extend_from_slice(&[0u8; 8]);

        match record {
            WalRecord::Pending { key, id, value } => {
                self.buf.write_u8(0)?; // op = pending
                Self::write_key(&mut self.buf, key)?;
                self.buf.write_u64::<LittleEndian>(*id)?;
                match value {
                    ScalarValue::Integer(v) => self.buf.write_i64::<LittleEndian>(*v)?,
                }
            }
            WalRecord::Flushed { key } => {
                self.buf.write_u8(1)?; // op = flushed
                Self::write_key(&mut self.buf, key)?;
            }
        }

        let body = &self.buf[8..];

        let mut hasher = Crc32::new();
        hasher.update(body);
        let crc = hasher.finalize();

        let record_len = (body.len() as u32) + 4;
        self.buf[0..4].copy_from_slice(&record_len.to_le_bytes());
        self.buf[4..8].copy_from_slice(&crc.to_le_bytes());

        self.file.write_all(&self.buf)?;
        self.file.flush()?;

        if self.sync {
            self.file.sync_all()?;
        }

        Ok(())
    }

    /// Forces all buffered data to be written to disk via `sync_all()`.
    ///
    /// Useful when `sync` is `false` and the caller wants durability at a
    /// specific point.
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn write_key(buf: &mut Vec<u8>, key: &IndexKey) -> Result<(), WalError> {
        let field = key.field.as_bytes();
        if field.len() > MAX_FIELD_BYTES {
            return Err(WalError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("field name too long ({} bytes)", field.len()),
            )));
        }
        buf.write_u8(kind_code(key.kind))?;
        buf.write_u32::<LittleEndian>(field.len() as u32)?;
        buf.extend_from_slice(field);
        Ok(())
    }
}

/// Sequential WAL reader that yields valid records.
///
/// Generic over any `Read` implementor so tests can replay in-memory buffers.
///
/// Each record's CRC32 is verified. A truncated tail record (crash
/// mid-write) is treated as a clean EOF.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing WAL file for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }
}

impl<R: Read> WalReader<R> {
    /// Constructs a reader from any `Read` implementor.
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Replays every valid record in the WAL, calling `apply` for each one.
    ///
    /// # Termination
    ///
    /// - **Clean EOF** -> `Ok(())`.
    /// - **Truncated tail** -> `Ok(())` after yielding all complete records.
    /// - **CRC mismatch**, unknown op or type code -> `Err(WalError::Corrupt)`.
    /// - **I/O error** -> `Err(WalError::Io(...))`.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(WalRecord),
    {
        let mut body = Vec::with_capacity(64);

        loop {
            let record_len = match self.rdr.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            };

            // op + kind + field_len is the smallest body
            const MIN_RECORD_SIZE: u32 = 4 + 1 + 1 + 4;
            const MAX_RECORD_SIZE: u32 = MAX_FIELD_BYTES as u32 + 64;
            if record_len < MIN_RECORD_SIZE || record_len > MAX_RECORD_SIZE {
                return Err(WalError::Corrupt);
            }

            let crc = match self.rdr.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            };

            let body_len = (record_len - 4) as usize;
            body.clear();
            body.resize(body_len, 0);
            match self.rdr.read_exact(&mut body) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            }

            let mut hasher = Crc32::new();
            hasher.update(&body);
            if hasher.finalize() != crc {
                return Err(WalError::Corrupt);
            }

            let record = Self::parse_body(&body).map_err(|_| WalError::Corrupt)?;
            apply(record);
        }
    }

    fn parse_body(body: &[u8]) -> Result<WalRecord, WalError> {
        let mut br = body;
        let op = br.read_u8()?;
        let kind = kind_from_code(br.read_u8()?).ok_or(WalError::Corrupt)?;
        let field_len = br.read_u32::<LittleEndian>()? as usize;
        if field_len > br.len() {
            return Err(WalError::Corrupt);
        }
        let (field, mut br) = br.split_at(field_len);
        let field = String::from_utf8(field.to_vec()).map_err(|_| WalError::Corrupt)?;
        let key = IndexKey::new(field, kind);

        match op {
            0 => {
                let id = br.read_u64::<LittleEndian>()?;
                let value = match kind {
                    FieldType::Integer => ScalarValue::Integer(br.read_i64::<LittleEndian>()?),
                };
                Ok(WalRecord::Pending { key, id, value })
            }
            1 => Ok(WalRecord::Flushed { key }),
            _ => Err(WalError::Corrupt),
        }
    }
}
