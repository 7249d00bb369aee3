use anyhow::Result;
use pending::PendingEntry;
use tracing::debug;

use crate::format::encode_id;
use crate::{DocumentSource, SecondaryIndex};

impl<'a, S: DocumentSource + ?Sized> SecondaryIndex<'a, S> {
    /// Inserts a batch of entries in one pass over the index file.
    ///
    /// 1. The batch is stably sorted by value, so equal values keep batch
    ///    order.
    /// 2. Each entry's base position is the upper bound of its value in the
    ///    unmodified index, searched from the previous entry's base (bases
    ///    never decrease because the batch is sorted).
    /// 3. Entry `k` lands at `base[k] + k`; the record list performs all the
    ///    shifting in a single forward pass.
    ///
    /// Equal values already in the index stay ahead of the new ones. No
    /// record is written if any entry fails validation.
    ///
    /// Returns the number of entries inserted.
    pub fn merge_insert(&mut self, entries: &[PendingEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        for entry in entries {
            self.check_kind(&entry.value)?;
        }

        let mut sorted: Vec<&PendingEntry> = entries.iter().collect();
        sorted.sort_by(|a, b| a.value.cmp(&b.value));

        let n = self.len();
        let mut placements = Vec::with_capacity(sorted.len());
        let mut base = 0;
        for entry in &sorted {
            base = self.search_rightmost(base, n, &entry.value)?;
            placements.push((base, encode_id(entry.id)?.to_vec()));
        }

        let inserted = self.list.insert_many(&placements)?;
        for entry in sorted {
            self.cache.prime(entry.id, entry.value.clone());
        }

        debug!(
            index = %self.key,
            inserted,
            entries = self.len(),
            reads = self.cache.reads(),
            "merged batch into index"
        );
        Ok(inserted)
    }
}
