//! Store Configuration
//!
//! `TigerStyle`: Sensible defaults, builder pattern, explicit over implicit.
//!
//! Every tunable of the save/load/clear protocols lives in [`StoreConfig`].
//! Defaults come from [`crate::constants`] and reproduce the browser layout.

use std::num::NonZeroUsize;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{
    BATCH_SIZE_COUNT_MAX, BATCH_SIZE_KEY_VALUE_COUNT_DEFAULT,
    BATCH_SIZE_OBJECT_STORE_COUNT_DEFAULT, CLEAR_LEGACY_BATCHES_COUNT_DEFAULT,
    KEY_VALUE_BATCH_KEY_PREFIX, KEY_VALUE_INFO_KEY, KEY_VALUE_LEGACY_SINGLE_KEY,
    OBJECT_STORE_BATCH_ID_PREFIX, OBJECT_STORE_INFO_ID, SELECTOR_THRESHOLD_BYTES_DEFAULT,
    STORAGE_RETRY_COUNT_MAX, STORAGE_RETRY_DELAY_MS_BASE, STORAGE_RETRY_DELAY_MS_MAX,
    YIELD_DURATION_MS_DEFAULT, YIELD_EVERY_BATCHES_COUNT_DEFAULT,
};

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Selector threshold must be positive
    #[error("selector threshold must be positive")]
    ZeroThreshold,

    /// Batch size above the supported maximum
    #[error("{which} batch size {size} exceeds max {max}")]
    BatchSizeTooLarge {
        /// Which backend the size is for
        which: &'static str,
        /// Configured size
        size: usize,
        /// Allowed maximum
        max: usize,
    },

    /// Retry base delay larger than the cap
    #[error("retry base delay {base_ms}ms exceeds cap {max_ms}ms")]
    RetryDelayInverted {
        /// Base delay
        base_ms: u128,
        /// Cap
        max_ms: u128,
    },

    /// A key layout name is unusable
    #[error("invalid key layout: {reason}")]
    InvalidKeyLayout {
        /// What is wrong
        reason: String,
    },
}

// =============================================================================
// GapPolicy
// =============================================================================

/// What a load does when a batch named by the batch info is missing or
/// does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GapPolicy {
    /// Log a warning and continue with the remaining batches.
    #[default]
    Skip,
    /// Treat the whole generation as invalid.
    Fail,
}

// =============================================================================
// KeyLayout
// =============================================================================

/// Names under which a generation is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    /// Backend A batch info key
    pub info_key: String,
    /// Backend A batch key prefix; batch `i` lives at `{prefix}{i}`
    pub batch_key_prefix: String,
    /// Backend A key of the pre-batching single-value layout
    pub legacy_single_key: String,
    /// Backend B batch info entry id
    pub object_info_id: String,
    /// Backend B batch entry id prefix
    pub object_batch_id_prefix: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self {
            info_key: KEY_VALUE_INFO_KEY.to_string(),
            batch_key_prefix: KEY_VALUE_BATCH_KEY_PREFIX.to_string(),
            legacy_single_key: KEY_VALUE_LEGACY_SINGLE_KEY.to_string(),
            object_info_id: OBJECT_STORE_INFO_ID.to_string(),
            object_batch_id_prefix: OBJECT_STORE_BATCH_ID_PREFIX.to_string(),
        }
    }
}

impl KeyLayout {
    /// Backend A key of batch `index`.
    #[must_use]
    pub fn batch_key(&self, index: usize) -> String {
        format!("{}{index}", self.batch_key_prefix)
    }

    /// Backend B id of batch `index`.
    #[must_use]
    pub fn object_batch_id(&self, index: usize) -> String {
        format!("{}{index}", self.object_batch_id_prefix)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("info_key", &self.info_key),
            ("batch_key_prefix", &self.batch_key_prefix),
            ("legacy_single_key", &self.legacy_single_key),
            ("object_info_id", &self.object_info_id),
            ("object_batch_id_prefix", &self.object_batch_id_prefix),
        ];
        for (name, value) in named {
            if value.is_empty() {
                return Err(ConfigError::InvalidKeyLayout {
                    reason: format!("{name} cannot be empty"),
                });
            }
        }
        if self.info_key == self.legacy_single_key {
            return Err(ConfigError::InvalidKeyLayout {
                reason: "info_key and legacy_single_key collide".to_string(),
            });
        }
        // Batch info must not be mistaken for a numbered batch
        let numbered = |key: &str, prefix: &str| {
            key.strip_prefix(prefix)
                .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
        };
        if numbered(&self.info_key, &self.batch_key_prefix)
            || numbered(&self.object_info_id, &self.object_batch_id_prefix)
        {
            return Err(ConfigError::InvalidKeyLayout {
                reason: "batch info id parses as a batch id".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// StoreConfig
// =============================================================================

/// Configuration for a [`crate::StorageManager`].
///
/// `TigerStyle`:
/// - Sensible defaults via Default impl
/// - Builder pattern for customization
/// - All fields public for transparency
///
/// # Example
///
/// ```rust
/// use forest_store::{GapPolicy, StoreConfig};
///
/// let config = StoreConfig::default()
///     .with_kv_batch_size(250)
///     .with_gap_policy(GapPolicy::Fail);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Payloads strictly smaller than this go to Backend A.
    ///
    /// Default: 2MiB
    pub threshold_bytes: usize,

    /// Records per Backend A batch.
    ///
    /// Default: 1000
    pub kv_batch_size: NonZeroUsize,

    /// Records per Backend B batch.
    ///
    /// Default: 500
    pub object_batch_size: NonZeroUsize,

    /// Suspend after batch `i` whenever `i % yield_every_batches == 0`.
    ///
    /// Default: 10
    pub yield_every_batches: NonZeroUsize,

    /// Suspension length; zero means a bare scheduler yield.
    ///
    /// Default: 10ms
    pub yield_duration: Duration,

    /// Batch keys removed on clear when no batch info can be read.
    ///
    /// Default: 100
    pub legacy_clear_batches: usize,

    /// Extra attempts per Backend B batch transaction.
    ///
    /// Default: 3
    pub retry_count_max: u32,

    /// First retry delay, doubled per attempt.
    ///
    /// Default: 10ms
    pub retry_delay_base: Duration,

    /// Retry delay cap.
    ///
    /// Default: 1s
    pub retry_delay_max: Duration,

    /// Load behaviour for missing or malformed batches.
    ///
    /// Default: [`GapPolicy::Skip`]
    pub gap_policy: GapPolicy,

    /// Persisted key names.
    pub key_layout: KeyLayout,
}

fn non_zero(value: usize, name: &str) -> NonZeroUsize {
    // Precondition
    match NonZeroUsize::new(value) {
        Some(n) => n,
        None => panic!("{name} must be positive"),
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: SELECTOR_THRESHOLD_BYTES_DEFAULT,
            kv_batch_size: non_zero(BATCH_SIZE_KEY_VALUE_COUNT_DEFAULT, "kv_batch_size"),
            object_batch_size: non_zero(BATCH_SIZE_OBJECT_STORE_COUNT_DEFAULT, "object_batch_size"),
            yield_every_batches: non_zero(YIELD_EVERY_BATCHES_COUNT_DEFAULT, "yield_every_batches"),
            yield_duration: Duration::from_millis(YIELD_DURATION_MS_DEFAULT),
            legacy_clear_batches: CLEAR_LEGACY_BATCHES_COUNT_DEFAULT,
            retry_count_max: STORAGE_RETRY_COUNT_MAX,
            retry_delay_base: Duration::from_millis(STORAGE_RETRY_DELAY_MS_BASE),
            retry_delay_max: Duration::from_millis(STORAGE_RETRY_DELAY_MS_MAX),
            gap_policy: GapPolicy::default(),
            key_layout: KeyLayout::default(),
        }
    }
}

impl StoreConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the selector threshold.
    ///
    /// # Panics
    /// Panics if `bytes` is zero.
    #[must_use]
    pub fn with_threshold_bytes(mut self, bytes: usize) -> Self {
        // Precondition
        assert!(bytes > 0, "threshold_bytes must be positive");
        self.threshold_bytes = bytes;
        self
    }

    /// Set the Backend A batch size.
    ///
    /// # Panics
    /// Panics if `size` is zero or above `BATCH_SIZE_COUNT_MAX`.
    #[must_use]
    pub fn with_kv_batch_size(mut self, size: usize) -> Self {
        assert!(size <= BATCH_SIZE_COUNT_MAX, "kv_batch_size exceeds max");
        self.kv_batch_size = non_zero(size, "kv_batch_size");
        self
    }

    /// Set the Backend B batch size.
    ///
    /// # Panics
    /// Panics if `size` is zero or above `BATCH_SIZE_COUNT_MAX`.
    #[must_use]
    pub fn with_object_batch_size(mut self, size: usize) -> Self {
        assert!(size <= BATCH_SIZE_COUNT_MAX, "object_batch_size exceeds max");
        self.object_batch_size = non_zero(size, "object_batch_size");
        self
    }

    /// Set how often the write protocol yields.
    ///
    /// # Panics
    /// Panics if `batches` is zero.
    #[must_use]
    pub fn with_yield_every(mut self, batches: usize) -> Self {
        self.yield_every_batches = non_zero(batches, "yield_every_batches");
        self
    }

    /// Set the yield duration in milliseconds.
    #[must_use]
    pub fn with_yield_duration_ms(mut self, ms: u64) -> Self {
        self.yield_duration = Duration::from_millis(ms);
        self
    }

    /// Set how many batch keys a blind clear removes.
    #[must_use]
    pub fn with_legacy_clear_batches(mut self, batches: usize) -> Self {
        self.legacy_clear_batches = batches;
        self
    }

    /// Set retry attempts and delays for Backend B batch writes.
    ///
    /// # Panics
    /// Panics if `base_ms > max_ms`.
    #[must_use]
    pub fn with_retry(mut self, count_max: u32, base_ms: u64, max_ms: u64) -> Self {
        // Precondition
        assert!(base_ms <= max_ms, "retry base delay must not exceed cap");
        self.retry_count_max = count_max;
        self.retry_delay_base = Duration::from_millis(base_ms);
        self.retry_delay_max = Duration::from_millis(max_ms);
        self
    }

    /// Set the load gap policy.
    #[must_use]
    pub fn with_gap_policy(mut self, policy: GapPolicy) -> Self {
        self.gap_policy = policy;
        self
    }

    /// Set the persisted key names.
    #[must_use]
    pub fn with_key_layout(mut self, layout: KeyLayout) -> Self {
        self.key_layout = layout;
        self
    }

    /// Delay before retry `attempt` (zero-based): base doubled per attempt,
    /// capped.
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.retry_delay_base
            .saturating_mul(factor)
            .min(self.retry_delay_max)
    }

    /// Check invariants the builders cannot enforce on their own.
    ///
    /// # Errors
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold_bytes == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        for (which, size) in [
            ("key-value", self.kv_batch_size.get()),
            ("object store", self.object_batch_size.get()),
        ] {
            if size > BATCH_SIZE_COUNT_MAX {
                return Err(ConfigError::BatchSizeTooLarge {
                    which,
                    size,
                    max: BATCH_SIZE_COUNT_MAX,
                });
            }
        }
        if self.retry_delay_base > self.retry_delay_max {
            return Err(ConfigError::RetryDelayInverted {
                base_ms: self.retry_delay_base.as_millis(),
                max_ms: self.retry_delay_max.as_millis(),
            });
        }
        self.key_layout.validate()
    }
}
