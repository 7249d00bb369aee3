//! Index record encoding and index file naming.
//!
//! ## Record
//!
//! ```text
//! [id: u48 BE]
//! ```
//!
//! Big-endian keeps a hex dump of an index file readable in id order.

use anyhow::{ensure, Result};
use byteorder::{BigEndian, ByteOrder};
use pending::{DocId, FieldType, IndexKey};

/// Width of one index record in bytes.
pub const ID_WIDTH: usize = 6;

/// Largest identifier that fits in an index record (`2^48 - 1`).
pub const MAX_ID: DocId = (1 << (ID_WIDTH * 8)) - 1;

/// Extension of index files.
pub const INDEX_EXTENSION: &str = "idx";

/// Encodes `id` as a 6-byte big-endian record.
///
/// # Errors
///
/// Fails if `id` exceeds [`MAX_ID`].
pub fn encode_id(id: DocId) -> Result<[u8; ID_WIDTH]> {
    ensure!(id <= MAX_ID, "document id {} does not fit in {} bytes", id, ID_WIDTH);
    let mut buf = [0u8; ID_WIDTH];
    BigEndian::write_uint(&mut buf, id, ID_WIDTH);
    Ok(buf)
}

/// Decodes a 6-byte big-endian record.
///
/// # Panics
///
/// Panics if `record` is shorter than [`ID_WIDTH`]; records read from a
/// [`recordlist::RecordList`] opened with that width never are.
#[must_use]
pub fn decode_id(record: &[u8]) -> DocId {
    BigEndian::read_uint(record, ID_WIDTH)
}

/// File name of the index for `key`: `<field>-<tag>.idx`.
#[must_use]
pub fn index_file_name(key: &IndexKey) -> String {
    format!("{}.{}", key.file_stem(), INDEX_EXTENSION)
}

/// Recovers the index key from a file name produced by [`index_file_name`].
///
/// The type tag follows the **last** `-`, so field names may contain dashes.
#[must_use]
pub fn parse_index_file_name(name: &str) -> Option<IndexKey> {
    let stem = name.strip_suffix(INDEX_EXTENSION)?.strip_suffix('.')?;
    let (field, tag) = stem.rsplit_once('-')?;
    if !IndexKey::is_indexable_field(field) {
        return None;
    }
    Some(IndexKey::new(field, FieldType::from_tag(tag)?))
}
