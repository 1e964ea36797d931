//! Batch Codec - Split and Reassemble Record Sequences
//!
//! `TigerStyle`: Pure functions, no backend knowledge.

use std::num::NonZeroUsize;

use crate::record::Record;

/// An ordered slice of records written as one storage entry.
pub type Batch = Vec<Record>;

/// Number of batches needed for `len` records.
#[must_use]
pub fn batch_count(len: usize, batch_size: NonZeroUsize) -> usize {
    len.div_ceil(batch_size.get())
}

/// Split records into consecutive batches of at most `batch_size`.
///
/// An empty input yields no batches.
#[must_use]
pub fn split(records: &[Record], batch_size: NonZeroUsize) -> Vec<Batch> {
    let batches: Vec<Batch> = records
        .chunks(batch_size.get())
        .map(<[Record]>::to_vec)
        .collect();

    // Postcondition
    debug_assert_eq!(batches.len(), batch_count(records.len(), batch_size));
    batches
}

/// Concatenate batches that are already in index order.
#[must_use]
pub fn join(batches: Vec<Batch>) -> Vec<Record> {
    let total: usize = batches.iter().map(Vec::len).sum();
    let mut records = Vec::with_capacity(total);
    for batch in batches {
        records.extend(batch);
    }
    records
}

/// Concatenate `(index, batch)` pairs in ascending index order, whatever
/// order they arrived in.
#[must_use]
pub fn join_indexed(mut batches: Vec<(usize, Batch)>) -> Vec<Record> {
    batches.sort_by_key(|(index, _)| *index);
    join(batches.into_iter().map(|(_, batch)| batch).collect())
}
