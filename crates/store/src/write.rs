/// Write path: `insert()`.
///
/// A document is durable once its blob is written; its index entries are
/// logged to the pending WAL and buffered until the next flush.
use anyhow::{ensure, Result};
use pending::{index_entries, DocId, Document};
use tracing::{debug, warn};
use wal::WalRecord;

use crate::{FlushError, Store};

impl Store {
    /// Stores `doc` and returns its identifier.
    ///
    /// Index files are not touched: every indexable field becomes a pending
    /// entry that the next [`flush`](Store::flush) merges. If `auto_flush`
    /// is configured and the batch has reached it, a flush runs before
    /// returning; a lock timeout there is logged and the entries stay
    /// pending.
    pub fn insert(&mut self, doc: Document) -> Result<DocId> {
        ensure!(!self.closed, "store is closed");

        let id = self.with_allocator(|ids| {
            let id = ids.next()?;
            ids.save()?;
            Ok(id)
        })?;
        ensure!(
            id <= index::MAX_ID,
            "identifier {} exceeds the index id width",
            id
        );

        self.documents.write(id, &doc)?;

        let entries = index_entries(&doc);
        let indexed = entries.len();
        for (key, value) in entries {
            self.wal_writer.append(&WalRecord::Pending {
                key: key.clone(),
                id,
                value: value.clone(),
            })?;
            self.pending.push(key, id, value);
        }
        debug!(id, indexed, pending = self.pending.len(), "document inserted");

        if self.config.auto_flush > 0 && self.pending.len() >= self.config.auto_flush {
            match self.flush() {
                Ok(_) => {}
                Err(e) if e.downcast_ref::<FlushError>().is_some() => {
                    warn!(error = %e, "auto flush deferred");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(id)
    }
}
