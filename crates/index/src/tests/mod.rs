
use crate::*;
use anyhow::Result;
use pending::{DocId, Document, FieldType, IndexKey, PendingEntry, ScalarValue};
use serde_json::json;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::Path;

pub(crate) fn age_key() -> IndexKey {
    IndexKey::new("age", FieldType::Integer)
}

pub(crate) fn doc(field: &str, value: i64) -> Document {
    let mut d = Document::new();
    d.insert(field.to_string(), json!(value));
    d
}

/// Documents `0..values.len()` with `age` set to the given values.
pub(crate) fn ages(values: &[i64]) -> BTreeMap<DocId, Document> {
    values
        .iter()
        .enumerate()
        .map(|(id, v)| (id as DocId, doc("age", *v)))
        .collect()
}

pub(crate) fn entry(id: DocId, value: i64) -> PendingEntry {
    PendingEntry {
        id,
        value: ScalarValue::Integer(value),
    }
}

/// Builds an index over `ids` (already in sorted order) by appending raw
/// records.
pub(crate) fn write_ids(path: &Path, ids: &[DocId]) -> Result<()> {
    let mut list = recordlist::RecordList::open(path, ID_WIDTH)?;
    for id in ids {
        list.append(&encode_id(*id)?)?;
    }
    list.close()?;
    Ok(())
}

/// A document source that counts how often it is read.
pub(crate) struct CountingSource {
    pub docs: BTreeMap<DocId, Document>,
    pub reads: Cell<usize>,
}

impl CountingSource {
    pub fn new(docs: BTreeMap<DocId, Document>) -> Self {
        Self {
            docs,
            reads: Cell::new(0),
        }
    }
}

impl DocumentSource for CountingSource {
    fn read(&self, id: DocId) -> Result<Option<Document>> {
        self.reads.set(self.reads.get() + 1);
        Ok(self.docs.get(&id).cloned())
    }
}
