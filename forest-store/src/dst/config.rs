//! `SimConfig` - Simulation Configuration
//!
//! `TigerStyle`: Seed management for deterministic testing.

use rand::Rng;
use std::env;

/// Configuration for a simulation run.
///
/// `TigerStyle`:
/// - Immutable after creation
/// - Seed logged for reproducibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    /// Random seed for deterministic execution
    seed: u64,
}

impl SimConfig {
    /// Create config with explicit seed.
    ///
    /// # Example
    /// ```
    /// use forest_store::dst::SimConfig;
    /// let config = SimConfig::with_seed(12345);
    /// assert_eq!(config.seed(), 12345);
    /// ```
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    /// Create config from `DST_SEED` env var or random.
    ///
    /// If `DST_SEED` is set, uses that value. Otherwise, generates a random
    /// seed and prints it for reproducibility.
    ///
    /// # Panics
    /// Panics if `DST_SEED` is set but is not a valid u64.
    #[must_use]
    pub fn from_env_or_random() -> Self {
        let seed = match env::var("DST_SEED") {
            Ok(seed_str) => seed_str.parse::<u64>().unwrap_or_else(|_| {
                panic!("DST_SEED must be a valid u64, got: {seed_str}");
            }),
            Err(_) => {
                let seed = rand::thread_rng().gen::<u64>();
                eprintln!("DST: Generated random seed (replay with DST_SEED={seed})");
                seed
            }
        };

        Self::with_seed(seed)
    }

    /// Get the seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::from_env_or_random()
    }
}
