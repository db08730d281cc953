//! Misinformation claim records and their durable store.
//!
//! Each record owns one contiguous range of vector ids. The store keeps the
//! ranges sorted and non-overlapping so a matched vector id resolves to its
//! claim in `O(log n)`.

mod store;
mod types;

pub use store::{RECORD_FILE_NAME, RecordStore, RecordStoreError};
pub use types::{ClaimMatch, MisinformationRecord, RecordId};
