use anyhow::Result;
use pending::{DocId, Document};
use std::collections::{BTreeMap, HashMap};

/// Where an index reads documents from when it needs a field value.
///
/// The store implements this over its JSON blob directory; tests use plain
/// in-memory maps.
pub trait DocumentSource {
    /// Reads document `id`, or `Ok(None)` if no such document exists.
    fn read(&self, id: DocId) -> Result<Option<Document>>;
}

impl<T: DocumentSource + ?Sized> DocumentSource for &T {
    fn read(&self, id: DocId) -> Result<Option<Document>> {
        (**self).read(id)
    }
}

impl DocumentSource for BTreeMap<DocId, Document> {
    fn read(&self, id: DocId) -> Result<Option<Document>> {
        Ok(self.get(&id).cloned())
    }
}

impl DocumentSource for HashMap<DocId, Document> {
    fn read(&self, id: DocId) -> Result<Option<Document>> {
        Ok(self.get(&id).cloned())
    }
}
