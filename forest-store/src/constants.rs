//! `TigerStyle` Constants
//!
//! All limits use big-endian naming: `CATEGORY_SPECIFICS_UNIT_LIMIT`
//! Example: `BATCH_SIZE_KEY_VALUE_COUNT_DEFAULT` (not `DEFAULT_KV_BATCH_SIZE`)
//!
//! Every constant includes units in the name:
//! - _`BYTES_MAX/DEFAULT` for size limits
//! - _`COUNT_DEFAULT` for quantity limits
//! - _MS for milliseconds

// =============================================================================
// Backend Selection
// =============================================================================

/// Serialized payload size below which the key-value store is chosen
pub const SELECTOR_THRESHOLD_BYTES_DEFAULT: usize = 2 * 1024 * 1024; // 2MiB

/// Bytes per mebibyte, for diagnostics
pub const BYTES_PER_MIB: usize = 1024 * 1024;

// =============================================================================
// Batching
// =============================================================================

/// Records per batch when writing to the key-value store
pub const BATCH_SIZE_KEY_VALUE_COUNT_DEFAULT: usize = 1000;

/// Records per batch when writing to the object store
///
/// Smaller than the key-value batch to keep single transactions short.
pub const BATCH_SIZE_OBJECT_STORE_COUNT_DEFAULT: usize = 500;

/// Maximum records per batch accepted by configuration
pub const BATCH_SIZE_COUNT_MAX: usize = 100_000;

/// Maximum batches a stored batch info may declare
pub const BATCH_INFO_BATCHES_COUNT_MAX: usize = 1_000_000;

/// Number of speculative batch keys removed when batch info is unreadable
pub const CLEAR_LEGACY_BATCHES_COUNT_DEFAULT: usize = 100;

// =============================================================================
// Cooperative Yielding
// =============================================================================

/// Yield after every Nth batch (batch index divisible by N)
pub const YIELD_EVERY_BATCHES_COUNT_DEFAULT: usize = 10;

/// Suspension length for each yield
pub const YIELD_DURATION_MS_DEFAULT: u64 = 10;

// =============================================================================
// Progress
// =============================================================================

/// Progress value reported when a save completes
pub const PROGRESS_PERCENT_COMPLETE: f64 = 100.0;

/// Lowest progress value
pub const PROGRESS_PERCENT_MIN: f64 = 0.0;

/// Highest progress a Backend A save reports before its commit marker lands
pub const PROGRESS_PERCENT_UNCOMMITTED_MAX: f64 = 99.0;

// =============================================================================
// Storage Retry
// =============================================================================

/// Maximum number of retry attempts for a single object store transaction
pub const STORAGE_RETRY_COUNT_MAX: u32 = 3;

/// Base delay between retries in milliseconds
pub const STORAGE_RETRY_DELAY_MS_BASE: u64 = 10;

/// Maximum delay between retries in milliseconds
pub const STORAGE_RETRY_DELAY_MS_MAX: u64 = 1000;

// =============================================================================
// Backend Capacity
// =============================================================================

/// Default quota of the key-value store (typical browser origin quota)
pub const KEY_VALUE_QUOTA_BYTES_DEFAULT: usize = 5 * 1024 * 1024; // 5MiB

// =============================================================================
// Persisted Layout
// =============================================================================

/// Key-value key holding the batch info
pub const KEY_VALUE_INFO_KEY: &str = "forest_data_batches";

/// Key-value key prefix for batches (`forest_data_batch_{i}`)
pub const KEY_VALUE_BATCH_KEY_PREFIX: &str = "forest_data_batch_";

/// Single-key layout used by earlier versions
pub const KEY_VALUE_LEGACY_SINGLE_KEY: &str = "forest_data_single";

/// Object store id of the batch info entry
pub const OBJECT_STORE_INFO_ID: &str = "batch_info";

/// Object store id prefix for batches (`batch_{i}`)
pub const OBJECT_STORE_BATCH_ID_PREFIX: &str = "batch_";

/// Default object store name
pub const OBJECT_STORE_NAME_DEFAULT: &str = "forestData";

// =============================================================================
// Record Layout
// =============================================================================

/// Reserved record key: unique identifier
pub const RECORD_ID_KEY: &str = "_id";

/// Reserved record key: source sheet name
pub const RECORD_SHEET_NAME_KEY: &str = "_sheetName";

/// Reserved record key: source row index
pub const RECORD_ROW_INDEX_KEY: &str = "_rowIndex";

// =============================================================================
// DST (Deterministic Simulation Testing) Limits
// =============================================================================

/// Maximum probability for fault injection (1.0 = 100%)
pub const DST_FAULT_PROBABILITY_MAX: f64 = 1.0;

/// Maximum time advance per step in milliseconds
pub const DST_TIME_ADVANCE_MS_MAX: u64 = 86_400_000; // 24 hours

// =============================================================================
// Time Constants
// =============================================================================

/// Milliseconds per second
pub const TIME_MS_PER_SEC: u64 = 1000;

// =============================================================================
// Telemetry
// =============================================================================

/// Default `EnvFilter` directive for [`crate::telemetry::init_tracing`]
pub const TELEMETRY_FILTER_DEFAULT: &str = "forest_store=info";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_sizes_valid() {
        assert!(BATCH_SIZE_OBJECT_STORE_COUNT_DEFAULT > 0);
        assert!(BATCH_SIZE_KEY_VALUE_COUNT_DEFAULT > 0);
        assert!(BATCH_SIZE_OBJECT_STORE_COUNT_DEFAULT <= BATCH_SIZE_KEY_VALUE_COUNT_DEFAULT);
        assert!(BATCH_SIZE_KEY_VALUE_COUNT_DEFAULT <= BATCH_SIZE_COUNT_MAX);
    }

    #[test]
    fn test_threshold_below_quota() {
        assert!(SELECTOR_THRESHOLD_BYTES_DEFAULT < KEY_VALUE_QUOTA_BYTES_DEFAULT);
        assert_eq!(SELECTOR_THRESHOLD_BYTES_DEFAULT, 2_097_152);
    }

    #[test]
    fn test_retry_delays_consistent() {
        assert!(STORAGE_RETRY_DELAY_MS_BASE <= STORAGE_RETRY_DELAY_MS_MAX);
    }
}
