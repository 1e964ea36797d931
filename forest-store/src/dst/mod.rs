//! DST - Deterministic Simulation Testing
//!
//! Seeded clock, RNG and fault injection for exercising the storage
//! protocol against simulated backends.
//!
//! ```rust
//! use forest_store::dst::{FaultConfig, FaultType, SimConfig, Simulation};
//!
//! let env = Simulation::new(SimConfig::with_seed(42))
//!     .with_fault(FaultConfig::new(FaultType::TransactionAbort, 0.1).with_filter("object_put"))
//!     .build();
//! let manager = env.manager();
//! # drop(manager);
//! ```
//!
//! Run with explicit seed for reproducibility:
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

mod clock;
mod config;
mod fault;
mod rng;
mod simulation;

pub use clock::SimClock;
pub use config::SimConfig;
pub use fault::{FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType};
pub use rng::DeterministicRng;
pub use simulation::{create_simulation, SimEnvironment, Simulation};
