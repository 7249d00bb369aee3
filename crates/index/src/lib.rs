//! # Index - Sorted Secondary Indexes
//!
//! On-disk secondary indexes for the ShelfDB document store.
//!
//! An index is a flat file of document identifiers sorted by the value one
//! field takes in each referenced document. Values are never stored in the
//! index: ordering is re-derived by reading documents through a
//! [`DocumentSource`], memoized per open index by a [`ValueCache`].
//!
//! ## File layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ id 0 (u48 BE) | id 1 (u48 BE) | ... | id n-1     │
//! └──────────────────────────────────────────────────┘
//!   sorted ascending by doc[id][field]; equal values
//!   in insertion order
//! ```
//!
//! One file per [`IndexKey`], named `<field>-<type tag>.idx`
//! (e.g. `age-int.idx`). The file size is always a multiple of
//! [`ID_WIDTH`]; anything else is rejected as corrupt.
//!
//! ## Insertion
//!
//! | Path                                        | Cost            |
//! |---------------------------------------------|-----------------|
//! | [`SecondaryIndex::insert_one`] per entry    | `O(n)` each     |
//! | [`SecondaryIndex::merge_insert`] per batch  | `O(n + m)` once |
//!
//! `merge_insert` sorts the batch, computes every destination against the
//! unmodified file with binary search, and then places all entries in a
//! single forward pass over the file.

mod cache;
mod format;
mod merge;
mod reader;
mod source;

pub use cache::ValueCache;
pub use format::{
    decode_id, encode_id, index_file_name, parse_index_file_name, ID_WIDTH, INDEX_EXTENSION,
    MAX_ID,
};
pub use reader::SecondaryIndex;
pub use source::DocumentSource;

#[cfg(test)]
mod tests;
