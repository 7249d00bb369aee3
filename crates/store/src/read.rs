/// Read path: `get()`, `find()`, `range()`, `index_ids()`.
///
/// Index queries see flushed state only. Each query takes the index lock so
/// it never observes a merge in progress.
use anyhow::{ensure, Result};
use index::{DocumentSource, SecondaryIndex};
use pending::{DocId, Document, FieldType, IndexKey, ScalarValue};
use std::ops::Range;

use crate::Store;

impl Store {
    /// Reads document `id`, or `None` if it was never written.
    pub fn get(&self, id: DocId) -> Result<Option<Document>> {
        self.documents.read(id)
    }

    /// Identifiers whose integer `field` equals `value`, in insertion order.
    pub fn find(&self, field: &str, value: i64) -> Result<Vec<DocId>> {
        let value = ScalarValue::Integer(value);
        self.with_index(field, |idx| {
            let (start, end) = idx.equal_range(&value)?;
            (start..end).map(|i| idx.id_at(i)).collect()
        })
    }

    /// Identifiers whose integer `field` lies in `range` (half-open), in
    /// index order.
    pub fn range(&self, field: &str, range: Range<i64>) -> Result<Vec<DocId>> {
        let (low, high) = (ScalarValue::Integer(range.start), ScalarValue::Integer(range.end));
        self.with_index(field, |idx| idx.range_ids(&low, &high))
    }

    /// Every identifier in the integer index on `field`, in index order.
    pub fn index_ids(&self, field: &str) -> Result<Vec<DocId>> {
        self.with_index(field, |idx| idx.ids())
    }

    /// Runs `f` on the integer index for `field` under its lock. A field
    /// that has never been flushed has an empty result.
    fn with_index<F>(&self, field: &str, f: F) -> Result<Vec<DocId>>
    where
        F: FnOnce(&mut SecondaryIndex<'_, crate::JsonDocuments>) -> Result<Vec<DocId>>,
    {
        ensure!(
            IndexKey::is_indexable_field(field),
            "field '{}' cannot be indexed",
            field
        );
        let key = IndexKey::new(field, FieldType::Integer);
        if !self.index_path(&key).exists() {
            return Ok(Vec::new());
        }

        let _guard = self.lock_index(&key)?;
        let mut idx = SecondaryIndex::open(self.config.index_dir(), key, &self.documents)?;
        let out = f(&mut idx)?;
        idx.close()?;
        Ok(out)
    }
}
