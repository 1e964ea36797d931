//! Backend Selector - Size-Based Choice Between the Two Stores
//!
//! The size estimate is the UTF-8 length of the JSON encoding, streamed into
//! a counting writer so multi-megabyte datasets are never buffered twice.

use std::io;

use crate::backend::BackendId;
use crate::record::Record;

/// `io::Write` sink that only counts bytes.
#[derive(Debug, Default)]
struct ByteCounter {
    count: usize,
}

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.count = self.count.saturating_add(buf.len());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Serialized size of `records` in bytes.
///
/// Serialization of [`Record`] cannot fail; should it ever, the estimate
/// saturates so the larger backend is chosen.
#[must_use]
pub fn estimate_size(records: &[Record]) -> usize {
    let mut counter = ByteCounter::default();
    match serde_json::to_writer(&mut counter, records) {
        Ok(()) => counter.count,
        Err(e) => {
            tracing::warn!(error = %e, "size estimation failed, assuming oversized payload");
            usize::MAX
        }
    }
}

/// Pick the backend for a payload of `size_bytes`.
#[must_use]
pub fn backend_for_size(size_bytes: usize, threshold_bytes: usize) -> BackendId {
    if size_bytes < threshold_bytes {
        BackendId::KeyValue
    } else {
        BackendId::ObjectStore
    }
}

/// Estimate the payload size of `records` and pick a backend.
#[must_use]
pub fn choose_backend(records: &[Record], threshold_bytes: usize) -> BackendId {
    let size = estimate_size(records);
    let backend = backend_for_size(size, threshold_bytes);

    tracing::debug!(
        size_bytes = size,
        record_count = records.len(),
        threshold_bytes,
        backend = %backend,
        "backend selected"
    );

    backend
}
