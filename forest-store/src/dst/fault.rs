//! `FaultInjector` - Probabilistic Fault Injection
//!
//! `TigerStyle`: Explicit fault injection for chaos testing.
//!
//! Backends ask the injector before every operation, naming the operation
//! (`kv_set`, `object_put`, ...). Filters match by substring, so a config
//! filtered on `"kv_"` hits every key-value operation and nothing else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use super::rng::DeterministicRng;
use crate::constants::DST_FAULT_PROBABILITY_MAX;

/// Types of faults that can be injected.
///
/// `TigerStyle`: Every fault type is explicit and documented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultType {
    /// Write operation fails
    StorageWriteFail,
    /// Read operation fails
    StorageReadFail,
    /// Delete operation fails
    StorageDeleteFail,
    /// Read returns garbled data
    StorageCorruption,
    /// Key-value quota exceeded
    StorageQuotaExceeded,
    /// Object store transaction aborts
    TransactionAbort,
    /// Backend cannot be opened
    BackendUnavailable,
}

impl FaultType {
    /// Get the fault type name as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StorageWriteFail => "storage_write_fail",
            Self::StorageReadFail => "storage_read_fail",
            Self::StorageDeleteFail => "storage_delete_fail",
            Self::StorageCorruption => "storage_corruption",
            Self::StorageQuotaExceeded => "storage_quota_exceeded",
            Self::TransactionAbort => "transaction_abort",
            Self::BackendUnavailable => "backend_unavailable",
        }
    }
}

/// Configuration for a specific fault.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// The type of fault
    pub fault_type: FaultType,
    /// Probability of injection (0.0 to 1.0)
    pub probability: f64,
    /// Optional operation filter (substring match)
    pub operation_filter: Option<String>,
    /// Maximum number of injections (None = unlimited)
    pub max_injections: Option<u64>,
}

impl FaultConfig {
    /// Create a new fault configuration.
    ///
    /// # Panics
    /// Panics if probability is not in [0, 1].
    #[must_use]
    pub fn new(fault_type: FaultType, probability: f64) -> Self {
        // Precondition
        assert!(
            (0.0..=DST_FAULT_PROBABILITY_MAX).contains(&probability),
            "probability must be in [0, {DST_FAULT_PROBABILITY_MAX}], got {probability}"
        );

        Self {
            fault_type,
            probability,
            operation_filter: None,
            max_injections: None,
        }
    }

    /// Set operation filter (fault only applies to matching operations).
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.operation_filter = Some(filter.into());
        self
    }

    /// Set maximum number of injections.
    ///
    /// # Panics
    /// Panics if `max` is zero.
    #[must_use]
    pub fn with_max_injections(mut self, max: u64) -> Self {
        // Precondition
        assert!(max > 0, "max_injections must be positive");
        self.max_injections = Some(max);
        self
    }
}

/// Fault injection statistics.
#[derive(Debug, Default)]
struct FaultStats {
    injection_count: AtomicU64,
}

/// Fault injector for simulation testing.
///
/// `TigerStyle`:
/// - Explicit fault registration
/// - Deterministic through RNG
/// - Statistics tracked
/// - Interior mutability for sharing via Arc
#[derive(Debug)]
pub struct FaultInjector {
    rng: Mutex<DeterministicRng>,
    configs: Vec<FaultConfig>,
    stats: HashMap<FaultType, FaultStats>,
    /// Per-config injection counts, indexed like `configs`
    injection_counts: Mutex<Vec<u64>>,
}

impl FaultInjector {
    /// Create a new fault injector with the given RNG.
    #[must_use]
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            configs: Vec::new(),
            stats: HashMap::new(),
            injection_counts: Mutex::new(Vec::new()),
        }
    }

    /// Register a fault configuration.
    ///
    /// Note: Registration must happen before sharing via Arc.
    pub fn register(&mut self, config: FaultConfig) {
        self.stats.entry(config.fault_type).or_default();
        self.injection_counts
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push(0);
        self.configs.push(config);
    }

    /// Check if a fault should be injected for the given operation.
    ///
    /// Returns the fault type if one should be injected, None otherwise.
    pub fn should_inject(&self, operation: &str) -> Option<FaultType> {
        for (index, config) in self.configs.iter().enumerate() {
            if let Some(ref filter) = config.operation_filter {
                if !operation.contains(filter.as_str()) {
                    continue;
                }
            }

            if let Some(max) = config.max_injections {
                let counts = self
                    .injection_counts
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if counts.get(index).copied().unwrap_or(0) >= max {
                    continue;
                }
            }

            let should_inject = self
                .rng
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .next_bool(config.probability);

            if should_inject {
                if let Some(stats) = self.stats.get(&config.fault_type) {
                    stats.injection_count.fetch_add(1, Ordering::Relaxed);
                }
                if let Some(count) = self
                    .injection_counts
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_mut(index)
                {
                    *count += 1;
                }

                tracing::debug!(
                    operation,
                    fault = config.fault_type.as_str(),
                    "fault injected"
                );
                return Some(config.fault_type);
            }
        }

        None
    }

    /// Get injection statistics.
    #[must_use]
    pub fn injection_stats(&self) -> HashMap<String, u64> {
        self.stats
            .iter()
            .map(|(fault_type, stats)| {
                (
                    fault_type.as_str().to_string(),
                    stats.injection_count.load(Ordering::Relaxed),
                )
            })
            .collect()
    }

    /// Get total number of injections.
    #[must_use]
    pub fn total_injections(&self) -> u64 {
        self.stats
            .values()
            .map(|s| s.injection_count.load(Ordering::Relaxed))
            .sum()
    }

    /// Reset all statistics.
    pub fn reset_stats(&self) {
        for stats in self.stats.values() {
            stats.injection_count.store(0, Ordering::Relaxed);
        }
        let mut counts = self
            .injection_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for count in counts.iter_mut() {
            *count = 0;
        }
    }
}

/// Builder for `FaultInjector`.
///
/// `TigerStyle`: Builder pattern for clean configuration before sharing via Arc.
pub struct FaultInjectorBuilder {
    rng: DeterministicRng,
    configs: Vec<FaultConfig>,
}

impl FaultInjectorBuilder {
    /// Create a new builder with the given RNG.
    #[must_use]
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng,
            configs: Vec::new(),
        }
    }

    /// Add a fault configuration.
    #[must_use]
    pub fn with_fault(mut self, config: FaultConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Add common storage faults.
    #[must_use]
    pub fn with_storage_faults(self, probability: f64) -> Self {
        self.with_fault(FaultConfig::new(FaultType::StorageWriteFail, probability))
            .with_fault(FaultConfig::new(FaultType::StorageReadFail, probability))
    }

    /// Build the `FaultInjector`.
    #[must_use]
    pub fn build(self) -> FaultInjector {
        let mut injector = FaultInjector::new(self.rng);
        for config in self.configs {
            injector.register(config);
        }
        injector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_no_faults_registered() {
        let injector = FaultInjector::new(DeterministicRng::new(42));

        for _ in 0..100 {
            assert!(injector.should_inject("kv_set").is_none());
        }
    }

    #[test]
    fn test_always_inject() {
        let mut injector = FaultInjector::new(DeterministicRng::new(42));
        injector.register(FaultConfig::new(FaultType::StorageWriteFail, 1.0));

        for _ in 0..10 {
            assert_eq!(
                injector.should_inject("kv_set"),
                Some(FaultType::StorageWriteFail)
            );
        }
    }

    #[test]
    fn test_never_inject() {
        let mut injector = FaultInjector::new(DeterministicRng::new(42));
        injector.register(FaultConfig::new(FaultType::StorageWriteFail, 0.0));

        for _ in 0..100 {
            assert!(injector.should_inject("kv_set").is_none());
        }
    }

    #[test]
    fn test_operation_filter() {
        let mut injector = FaultInjector::new(DeterministicRng::new(42));
        injector.register(
            FaultConfig::new(FaultType::StorageQuotaExceeded, 1.0).with_filter("kv_set"),
        );

        assert_eq!(
            injector.should_inject("kv_set"),
            Some(FaultType::StorageQuotaExceeded)
        );
        assert!(injector.should_inject("kv_get").is_none());
        assert!(injector.should_inject("object_put").is_none());
    }

    #[test]
    fn test_max_injections() {
        let mut injector = FaultInjector::new(DeterministicRng::new(42));
        injector
            .register(FaultConfig::new(FaultType::TransactionAbort, 1.0).with_max_injections(2));

        assert_eq!(injector.should_inject("op"), Some(FaultType::TransactionAbort));
        assert_eq!(injector.should_inject("op"), Some(FaultType::TransactionAbort));
        assert!(injector.should_inject("op").is_none());
    }

    #[test]
    fn test_max_injections_per_config() {
        // Two configs of the same type keep separate budgets
        let mut injector = FaultInjector::new(DeterministicRng::new(42));
        injector.register(
            FaultConfig::new(FaultType::StorageWriteFail, 1.0)
                .with_filter("kv_")
                .with_max_injections(1),
        );
        injector.register(
            FaultConfig::new(FaultType::StorageWriteFail, 1.0)
                .with_filter("object_")
                .with_max_injections(1),
        );

        assert!(injector.should_inject("kv_set").is_some());
        assert!(injector.should_inject("object_put").is_some());
        assert!(injector.should_inject("kv_set").is_none());
        assert!(injector.should_inject("object_put").is_none());
    }

    #[test]
    fn test_injection_stats_and_reset() {
        let mut injector = FaultInjector::new(DeterministicRng::new(42));
        injector.register(FaultConfig::new(FaultType::StorageWriteFail, 1.0));

        injector.should_inject("op");
        injector.should_inject("op");
        injector.should_inject("op");

        assert_eq!(injector.injection_stats().get("storage_write_fail"), Some(&3));
        assert_eq!(injector.total_injections(), 3);

        injector.reset_stats();
        assert_eq!(injector.total_injections(), 0);
    }

    #[test]
    #[should_panic(expected = "probability must be in")]
    fn test_invalid_probability() {
        let _ = FaultConfig::new(FaultType::StorageWriteFail, 1.5);
    }

    #[test]
    #[should_panic(expected = "max_injections must be positive")]
    fn test_invalid_max_injections() {
        let _ = FaultConfig::new(FaultType::StorageWriteFail, 0.5).with_max_injections(0);
    }

    #[test]
    fn test_arc_sharing() {
        let injector = Arc::new(
            FaultInjectorBuilder::new(DeterministicRng::new(42))
                .with_fault(FaultConfig::new(FaultType::BackendUnavailable, 1.0))
                .build(),
        );
        let injector2 = Arc::clone(&injector);

        assert!(injector.should_inject("object_open").is_some());
        assert!(injector2.should_inject("object_open").is_some());
        assert_eq!(injector.total_injections(), 2);
    }
}
