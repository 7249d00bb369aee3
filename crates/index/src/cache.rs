use anyhow::{anyhow, Result};
use pending::{DocId, IndexKey, ScalarValue};
use std::collections::HashMap;

use crate::DocumentSource;

/// Memoized `id -> field value` lookups for one open index.
///
/// The first lookup of an id reads its document once; later lookups are
/// served from memory. Documents never change after they are written, so
/// entries are never invalidated. The cache is unbounded and lives exactly
/// as long as the [`SecondaryIndex`](crate::SecondaryIndex) that owns it.
#[derive(Debug)]
pub struct ValueCache {
    key: IndexKey,
    values: HashMap<DocId, ScalarValue>,
    /// Number of document reads performed.
    reads: usize,
}

impl ValueCache {
    pub fn new(key: IndexKey) -> Self {
        Self {
            key,
            values: HashMap::new(),
            reads: 0,
        }
    }

    /// Returns the indexed field's value for `id`, reading the document only
    /// on the first request.
    ///
    /// # Errors
    ///
    /// Fails if the document is missing or has no value of the index's type
    /// under the index's field: an index entry pointing at such a document
    /// means the index is corrupt.
    pub fn resolve<S: DocumentSource + ?Sized>(&mut self, id: DocId, source: &S) -> Result<ScalarValue> {
        if let Some(v) = self.values.get(&id) {
            return Ok(v.clone());
        }

        self.reads += 1;
        let doc = source
            .read(id)?
            .ok_or_else(|| anyhow!("index {} references missing document {}", self.key, id))?;
        let value = doc
            .get(&self.key.field)
            .and_then(|v| self.key.kind.extract(v))
            .ok_or_else(|| {
                anyhow!(
                    "document {} has no {} value for field '{}' (index {})",
                    id,
                    self.key.kind,
                    self.key.field,
                    self.key
                )
            })?;

        self.values.insert(id, value.clone());
        Ok(value)
    }

    /// Records a value already known to the caller, skipping the read.
    pub fn prime(&mut self, id: DocId, value: ScalarValue) {
        self.values.insert(id, value);
    }

    /// Number of document reads performed so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Number of memoized values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
