//! Pending index mutations and the scalar types they carry.
//!
//! Documents are inserted without touching index files. Each indexable field
//! of a new document becomes a [`PendingEntry`] in the [`PendingBatch`],
//! grouped by [`IndexKey`], until the store flushes the batch into the sorted
//! index files in one pass per key.
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a stored document.
pub type DocId = u64;

/// A stored document: field name to JSON value.
pub type Document = serde_json::Map<String, Value>;

/// The scalar field types that can be indexed.
///
/// Each variant has a short tag used in index file names, so two fields with
/// the same name but different types live in different index files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldType {
    /// JSON integers representable as `i64`.
    Integer,
}

impl FieldType {
    /// Every indexable type, in tag order.
    pub const ALL: [FieldType; 1] = [FieldType::Integer];

    /// Short tag used in index file names.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            FieldType::Integer => "int",
        }
    }

    /// Parses a tag produced by [`tag`](FieldType::tag).
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// Extracts a value of this type from a JSON value, if it has this type.
    ///
    /// Booleans are not integers, and floats are never coerced.
    #[must_use]
    pub fn extract(self, value: &Value) -> Option<ScalarValue> {
        match self {
            FieldType::Integer => match value {
                Value::Number(n) => n.as_i64().map(ScalarValue::Integer),
                _ => None,
            },
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// An indexed field value. Ordering is the index sort order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScalarValue {
    Integer(i64),
}

impl ScalarValue {
    /// Classifies a JSON value, returning `None` for anything not indexable.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        FieldType::ALL.into_iter().find_map(|t| t.extract(value))
    }

    /// The type tag of this value.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        match self {
            ScalarValue::Integer(_) => FieldType::Integer,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Integer(v) => write!(f, "{}", v),
        }
    }
}

/// Longest indexed field name in bytes.
///
/// The longest file derived from a field is its lock sentinel
/// `<field>-int.lock`, which must fit the usual 255-byte file name limit.
pub const MAX_FIELD_LEN: usize = 255 - "-int.lock".len();

/// Identifies one secondary index: a field name paired with a value type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey {
    pub field: String,
    pub kind: FieldType,
}

impl IndexKey {
    pub fn new(field: impl Into<String>, kind: FieldType) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }

    /// Returns `true` if `field` can be used in an index file name.
    ///
    /// Empty names, names longer than [`MAX_FIELD_LEN`] bytes, names
    /// containing a path separator or NUL, and names starting with `.` are
    /// stored with the document but never indexed.
    #[must_use]
    pub fn is_indexable_field(field: &str) -> bool {
        !field.is_empty()
            && field.len() <= MAX_FIELD_LEN
            && !field.starts_with('.')
            && !field.contains(['/', '\\', '\0'])
    }

    /// File stem of the index: `<field>-<tag>`.
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!("{}-{}", self.field, self.kind.tag())
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_stem())
    }
}

/// The index entries a document contributes: one per field whose name is
/// indexable and whose value has an indexable type, in field order.
#[must_use]
pub fn index_entries(doc: &Document) -> Vec<(IndexKey, ScalarValue)> {
    doc.iter()
        .filter(|(field, _)| IndexKey::is_indexable_field(field))
        .filter_map(|(field, value)| {
            let scalar = ScalarValue::from_json(value)?;
            Some((IndexKey::new(field.clone(), scalar.field_type()), scalar))
        })
        .collect()
}

/// One buffered index mutation: add `id` with `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub id: DocId,
    pub value: ScalarValue,
}

/// In-memory batch of index mutations not yet merged into index files.
///
/// Per index key the batch maps identifier to value. Entries remember the
/// order they were pushed in, and [`take`](PendingBatch::take) returns them
/// in that order so that equal values keep insertion order in the index.
#[derive(Debug, Default)]
pub struct PendingBatch {
    map: BTreeMap<IndexKey, BTreeMap<DocId, (u64, ScalarValue)>>,
    /// Monotonic push counter.
    seq: u64,
    entries: usize,
}

impl PendingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers `id -> value` under `key`. Returns the previous value if `id`
    /// was already pending for this key; the entry keeps its original
    /// position in insertion order.
    pub fn push(&mut self, key: IndexKey, id: DocId, value: ScalarValue) -> Option<ScalarValue> {
        self.seq += 1;
        let seq = self.seq;
        let ids = self.map.entry(key).or_default();
        match ids.get_mut(&id) {
            Some((_, old)) => Some(std::mem::replace(old, value)),
            None => {
                ids.insert(id, (seq, value));
                self.entries += 1;
                None
            }
        }
    }

    /// Buffers every indexable field of a document.
    ///
    /// Returns the number of entries added.
    pub fn push_document(&mut self, id: DocId, doc: &Document) -> usize {
        let mut added = 0;
        for (key, value) in index_entries(doc) {
            if self.push(key, id, value).is_none() {
                added += 1;
            }
        }
        added
    }

    /// Returns the pending entries for `key` in insertion order.
    #[must_use]
    pub fn get(&self, key: &IndexKey) -> Vec<PendingEntry> {
        self.map.get(key).map(ordered).unwrap_or_default()
    }

    /// Removes and returns the pending entries for `key` in insertion order.
    pub fn take(&mut self, key: &IndexKey) -> Vec<PendingEntry> {
        match self.map.remove(key) {
            Some(ids) => {
                self.entries -= ids.len();
                ordered(&ids)
            }
            None => Vec::new(),
        }
    }

    /// Drops every pending entry for `key`. Returns how many were dropped.
    pub fn discard(&mut self, key: &IndexKey) -> usize {
        self.take(key).len()
    }

    /// Index keys with pending entries, in key order.
    pub fn keys(&self) -> impl Iterator<Item = &IndexKey> {
        self.map.keys()
    }

    /// Total number of pending entries across all keys.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Number of index keys with pending entries.
    pub fn index_count(&self) -> usize {
        self.map.len()
    }
}

fn ordered(ids: &BTreeMap<DocId, (u64, ScalarValue)>) -> Vec<PendingEntry> {
    let mut out: Vec<(u64, PendingEntry)> = ids
        .iter()
        .map(|(id, (seq, value))| {
            (
                *seq,
                PendingEntry {
                    id: *id,
                    value: value.clone(),
                },
            )
        })
        .collect();
    out.sort_by_key(|(seq, _)| *seq);
    out.into_iter().map(|(_, e)| e).collect()
}
