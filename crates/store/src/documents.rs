//! Document blob storage: one JSON file per identifier under `data/`.

use anyhow::{Context, Result};
use index::DocumentSource;
use pending::{DocId, Document};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Extension of document blobs.
pub const DOCUMENT_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct JsonDocuments {
    dir: PathBuf,
}

impl JsonDocuments {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: DocId) -> PathBuf {
        self.dir.join(format!("{}.{}", id, DOCUMENT_EXTENSION))
    }

    /// Writes document `id`, replacing the blob atomically.
    pub fn write(&self, id: DocId, doc: &Document) -> Result<()> {
        let path = self.path_for(id);
        let tmp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(doc)?;
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| format!("failed to create {}", tmp_path.display()))?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("failed to write document {}", id))?;
        Ok(())
    }

    /// Number of stored documents.
    pub fn count(&self) -> Result<usize> {
        let mut n = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == DOCUMENT_EXTENSION) {
                n += 1;
            }
        }
        Ok(n)
    }
}

impl DocumentSource for JsonDocuments {
    fn read(&self, id: DocId) -> Result<Option<Document>> {
        let path = self.path_for(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("failed to read document {}", id)),
        };
        let doc = serde_json::from_slice(&bytes)
            .with_context(|| format!("document {} is not a JSON object", id))?;
        Ok(Some(doc))
    }
}
