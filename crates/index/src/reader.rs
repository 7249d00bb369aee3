use anyhow::{ensure, Context, Result};
use pending::{DocId, IndexKey, ScalarValue};
use recordlist::RecordList;
use std::path::Path;
use tracing::debug;

use crate::format::{decode_id, encode_id, index_file_name, ID_WIDTH};
use crate::{DocumentSource, ValueCache};

/// An open secondary index over one [`IndexKey`].
///
/// Wraps the index file as a [`RecordList`] of 6-byte identifiers and keeps a
/// [`ValueCache`] so each referenced document is read at most once while the
/// index is open.
///
/// The caller must hold the index's lock sentinel for as long as the
/// `SecondaryIndex` is open.
pub struct SecondaryIndex<'a, S: DocumentSource + ?Sized> {
    pub(crate) key: IndexKey,
    pub(crate) list: RecordList,
    pub(crate) cache: ValueCache,
    pub(crate) source: &'a S,
}

impl<'a, S: DocumentSource + ?Sized> std::fmt::Debug for SecondaryIndex<'a, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecondaryIndex")
            .field("key", &self.key)
            .field("path", &self.list.path())
            .field("len", &self.list.len())
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl<'a, S: DocumentSource + ?Sized> SecondaryIndex<'a, S> {
    /// Opens (creating if absent) the index for `key` inside `dir`.
    pub fn open<P: AsRef<Path>>(dir: P, key: IndexKey, source: &'a S) -> Result<Self> {
        let path = dir.as_ref().join(index_file_name(&key));
        Self::open_path(path, key, source)
    }

    /// Opens (creating if absent) the index file at an explicit path.
    pub fn open_path<P: AsRef<Path>>(path: P, key: IndexKey, source: &'a S) -> Result<Self> {
        let path = path.as_ref();
        let list = RecordList::open(path, ID_WIDTH)
            .with_context(|| format!("failed to open index {}", path.display()))?;
        debug!(index = %key, entries = list.len(), "opened index");
        Ok(Self {
            cache: ValueCache::new(key.clone()),
            key,
            list,
            source,
        })
    }

    pub fn key(&self) -> &IndexKey {
        &self.key
    }

    pub fn path(&self) -> &Path {
        self.list.path()
    }

    /// Number of identifiers in the index.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Number of document reads the value cache has performed.
    pub fn cache_reads(&self) -> usize {
        self.cache.reads()
    }

    /// Identifier at position `i`.
    pub fn id_at(&mut self, i: usize) -> Result<DocId> {
        Ok(decode_id(&self.list.get(i)?))
    }

    /// Field value of the document referenced at position `i`.
    pub fn resolve(&mut self, i: usize) -> Result<ScalarValue> {
        let id = self.id_at(i)?;
        self.cache.resolve(id, self.source)
    }

    /// Every identifier in index order.
    pub fn ids(&mut self) -> Result<Vec<DocId>> {
        Ok(self.list.read_all()?.iter().map(|r| decode_id(r)).collect())
    }

    /// First position in `[low, high)` whose value is `>= value`, or `high`
    /// if there is none.
    ///
    /// Requires the range to be sorted, which every index is.
    pub fn search_leftmost(&mut self, low: usize, high: usize, value: &ScalarValue) -> Result<usize> {
        self.check_range(low, high)?;
        let (mut lo, mut hi) = (low, high);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.resolve(mid)? < *value {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// First position in `[low, high)` whose value is `> value`, or `high`
    /// if there is none.
    pub fn search_rightmost(&mut self, low: usize, high: usize, value: &ScalarValue) -> Result<usize> {
        self.check_range(low, high)?;
        let (mut lo, mut hi) = (low, high);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.resolve(mid)? <= *value {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Positions `[start, end)` holding exactly `value`.
    pub fn equal_range(&mut self, value: &ScalarValue) -> Result<(usize, usize)> {
        let n = self.len();
        let start = self.search_leftmost(0, n, value)?;
        let end = self.search_rightmost(start, n, value)?;
        Ok((start, end))
    }

    /// Returns `true` if `id` is indexed under `value`.
    ///
    /// Scans only the run of entries equal to `value`.
    pub fn contains(&mut self, id: DocId, value: &ScalarValue) -> Result<bool> {
        let (start, end) = self.equal_range(value)?;
        for i in start..end {
            if self.id_at(i)? == id {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Identifiers whose value lies in `[low, high)`, in index order.
    pub fn range_ids(&mut self, low: &ScalarValue, high: &ScalarValue) -> Result<Vec<DocId>> {
        let n = self.len();
        let start = self.search_leftmost(0, n, low)?;
        let end = self.search_leftmost(start, n, high)?;
        (start..end).map(|i| self.id_at(i)).collect()
    }

    /// Inserts `id` at position `pos`, shifting later entries right by one.
    ///
    /// The caller is responsible for choosing a position that keeps the
    /// index sorted.
    pub fn insert_one(&mut self, pos: usize, id: DocId) -> Result<()> {
        let record = encode_id(id)?;
        self.list.insert(pos, &record)?;
        Ok(())
    }

    /// Inserts one entry at its sorted position, after any equal values.
    ///
    /// Costs one shift of the tail; prefer
    /// [`merge_insert`](SecondaryIndex::merge_insert) for more than a few
    /// entries.
    pub fn insert(&mut self, id: DocId, value: ScalarValue) -> Result<usize> {
        self.check_kind(&value)?;
        let n = self.len();
        let pos = self.search_rightmost(0, n, &value)?;
        self.insert_one(pos, id)?;
        self.cache.prime(id, value);
        Ok(pos)
    }

    /// Flushes the index file to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.list.sync()?;
        Ok(())
    }

    /// Closes the index file. The value cache is dropped with it.
    pub fn close(self) -> Result<()> {
        debug!(index = %self.key, entries = self.list.len(), reads = self.cache.reads(), "closing index");
        self.list.close()?;
        Ok(())
    }

    pub(crate) fn check_kind(&self, value: &ScalarValue) -> Result<()> {
        ensure!(
            value.field_type() == self.key.kind,
            "value {} has type {}, index {} holds {}",
            value,
            value.field_type(),
            self.key,
            self.key.kind
        );
        Ok(())
    }

    fn check_range(&self, low: usize, high: usize) -> Result<()> {
        ensure!(
            low <= high && high <= self.len(),
            "search range [{}, {}) outside index {} of length {}",
            low,
            high,
            self.key,
            self.len()
        );
        Ok(())
    }
}
