//! Simulation - DST Test Harness
//!
//! `TigerStyle`: One seed drives the clock, the fault injector and both
//! simulated backends.

use std::future::Future;
use std::sync::Arc;

use super::clock::SimClock;
use super::config::SimConfig;
use super::fault::{FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType};
use super::rng::DeterministicRng;
use crate::backend::{SimKeyValueStore, SimObjectStore};
use crate::config::StoreConfig;
use crate::constants::KEY_VALUE_QUOTA_BYTES_DEFAULT;
use crate::manager::{StorageManager, TimeSource};

/// Environment provided to simulation tests.
///
/// `TigerStyle`: All simulation resources in one place.
pub struct SimEnvironment {
    /// Simulation configuration
    pub config: SimConfig,
    /// Simulated clock
    pub clock: SimClock,
    /// Deterministic RNG
    pub rng: DeterministicRng,
    /// Fault injector (shared via Arc with both stores)
    pub faults: Arc<FaultInjector>,
    /// Simulated key-value store (Backend A)
    pub kv: SimKeyValueStore,
    /// Simulated object store (Backend B)
    pub objects: SimObjectStore,
}

impl SimEnvironment {
    /// Advance simulated time in milliseconds.
    pub fn advance_time_ms(&self, ms: u64) -> u64 {
        self.clock.advance_ms(ms)
    }

    /// Get current simulated time in milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Manager over this environment's stores, stamped by the simulated clock.
    ///
    /// Yields use `yield_now` instead of sleeping so long runs stay fast.
    /// Managers built from one environment see the same data.
    #[must_use]
    pub fn manager(&self) -> StorageManager<SimKeyValueStore, SimObjectStore> {
        self.manager_with_config(StoreConfig::default().with_yield_duration_ms(0))
    }

    /// Like [`Self::manager`] with an explicit configuration.
    #[must_use]
    pub fn manager_with_config(
        &self,
        config: StoreConfig,
    ) -> StorageManager<SimKeyValueStore, SimObjectStore> {
        StorageManager::new(self.kv.clone(), self.objects.clone())
            .with_config(config)
            .with_time_source(TimeSource::Simulated(self.clock.clone()))
    }
}

/// DST simulation harness.
///
/// `TigerStyle`:
/// - Single seed controls all randomness
/// - Faults are registered explicitly
/// - Environment is provided to test closure
///
/// # Example
///
/// ```rust
/// use forest_store::dst::{FaultConfig, FaultType, SimConfig, Simulation};
/// use forest_store::{NoProgress, Record, RecordMeta};
///
/// # tokio_test::block_on(async {
/// let sim = Simulation::new(SimConfig::with_seed(42))
///     .with_fault(FaultConfig::new(FaultType::StorageQuotaExceeded, 1.0).with_filter("kv_set"));
///
/// sim.run(|env| async move {
///     let manager = env.manager();
///     let records = vec![Record::new(RecordMeta::new("r0", "Sheet1", 0)).with_field("name", "plot")];
///     let result = manager.save(&records, &NoProgress).await;
///     assert!(result.success);
///     assert_eq!(manager.load().await.map(|loaded| loaded.records), Some(records));
///     Ok::<(), std::convert::Infallible>(())
/// })
/// .await
/// .unwrap();
/// # });
/// ```
pub struct Simulation {
    config: SimConfig,
    fault_configs: Vec<FaultConfig>,
    kv_quota_bytes: usize,
}

impl Simulation {
    /// Create a new simulation with the given configuration.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            fault_configs: Vec::new(),
            kv_quota_bytes: KEY_VALUE_QUOTA_BYTES_DEFAULT,
        }
    }

    /// Register a fault to inject during simulation.
    #[must_use]
    pub fn with_fault(mut self, fault_config: FaultConfig) -> Self {
        self.fault_configs.push(fault_config);
        self
    }

    /// Add common storage faults.
    #[must_use]
    pub fn with_storage_faults(self, probability: f64) -> Self {
        self.with_fault(FaultConfig::new(FaultType::StorageWriteFail, probability))
            .with_fault(FaultConfig::new(FaultType::StorageReadFail, probability))
    }

    /// Set the key-value store quota.
    ///
    /// # Panics
    /// Panics if `quota_bytes` is zero.
    #[must_use]
    pub fn with_kv_quota(mut self, quota_bytes: usize) -> Self {
        // Precondition
        assert!(quota_bytes > 0, "quota_bytes must be positive");
        self.kv_quota_bytes = quota_bytes;
        self
    }

    /// Run the simulation with the given test function.
    ///
    /// # Errors
    /// Returns any error from the test function.
    pub async fn run<F, Fut, E>(self, test_fn: F) -> Result<(), E>
    where
        F: FnOnce(SimEnvironment) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let seed = self.config.seed();
        let env = self.build();
        let faults = Arc::clone(&env.faults);

        let result = test_fn(env).await;

        if faults.total_injections() > 0 {
            tracing::info!(
                seed,
                injections = faults.total_injections(),
                stats = ?faults.injection_stats(),
                "simulation finished with injected faults"
            );
        }
        result
    }

    /// Build the simulation environment without running a test.
    #[must_use]
    pub fn build(self) -> SimEnvironment {
        let mut rng = DeterministicRng::new(self.config.seed());
        let clock = SimClock::new();

        let faults = Arc::new(
            self.fault_configs
                .into_iter()
                .fold(FaultInjectorBuilder::new(rng.fork()), FaultInjectorBuilder::with_fault)
                .build(),
        );

        let kv = SimKeyValueStore::with_fault_injector(Arc::clone(&faults))
            .with_quota(self.kv_quota_bytes);
        let objects = SimObjectStore::with_fault_injector(Arc::clone(&faults));

        SimEnvironment {
            config: self.config,
            clock,
            rng,
            faults,
            kv,
            objects,
        }
    }
}

/// Create a simulation with optional seed.
#[must_use]
pub fn create_simulation(seed: Option<u64>) -> Simulation {
    let config = match seed {
        Some(s) => SimConfig::with_seed(s),
        None => SimConfig::from_env_or_random(),
    };
    Simulation::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, KeyValueStore};

    #[tokio::test]
    async fn test_basic_simulation() {
        let sim = Simulation::new(SimConfig::with_seed(42));

        sim.run(|env| async move {
            env.kv.set_item("key", "value")?;
            env.advance_time_ms(1000);

            assert_eq!(env.kv.get_item("key")?, Some("value".to_string()));
            assert_eq!(env.now_ms(), 1000);
            Ok::<(), BackendError>(())
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_create_simulation() {
        let env = create_simulation(Some(42)).build();
        assert_eq!(env.config.seed(), 42);
    }

    #[test]
    fn test_same_seed_same_rng() {
        let mut a = Simulation::new(SimConfig::with_seed(7)).build();
        let mut b = Simulation::new(SimConfig::with_seed(7)).build();

        for _ in 0..10 {
            assert_eq!(a.rng.next_u64(), b.rng.next_u64());
        }
    }

    #[test]
    fn test_kv_quota_applied() {
        let env = Simulation::new(SimConfig::with_seed(42))
            .with_kv_quota(4)
            .build();

        assert_eq!(env.kv.quota_bytes(), 4);
        assert!(env.kv.set_item("key", "value").is_err());
    }

    /// Faults registered on the harness must reach the stores.
    #[tokio::test]
    async fn test_fault_injection_through_harness() {
        let sim = Simulation::new(SimConfig::with_seed(42))
            .with_fault(FaultConfig::new(FaultType::StorageWriteFail, 1.0).with_filter("kv_set"));

        let result = sim
            .run(|env| async move {
                env.kv.set_item("key", "value")?;
                Ok::<(), BackendError>(())
            })
            .await;

        assert!(result.is_err(), "injected fault should fail the write");
    }

    #[test]
    fn test_fault_stats_shared() {
        let env = Simulation::new(SimConfig::with_seed(42))
            .with_fault(FaultConfig::new(FaultType::StorageWriteFail, 1.0).with_filter("kv_set"))
            .build();

        assert!(env.kv.set_item("key", "value").is_err());
        assert_eq!(env.faults.total_injections(), 1);
        assert_eq!(env.kv.fault_injector().total_injections(), 1);
    }
}
