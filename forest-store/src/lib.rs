//! # Forest Store
//!
//! Adaptive local persistence for forestry operation records imported from
//! spreadsheets.
//!
//! ## Features
//!
//! - **Size-based backend selection**: small datasets go to a quota-limited
//!   key-value store, large ones to a transactional object store
//! - **Batched writes**: bounded per-entry size, cooperative yields between batches
//! - **Fallback**: a key-value quota failure restarts the save on the object store
//! - **Graceful loads**: missing or malformed batches are skipped (or rejected, by policy)
//! - **Deterministic testing**: simulated backends with seeded fault injection
//!
//! ## Quick Start
//!
//! ```rust
//! use forest_store::dst::{SimConfig, Simulation};
//! use forest_store::{NoProgress, Record, RecordMeta};
//!
//! # tokio_test::block_on(async {
//! let env = Simulation::new(SimConfig::with_seed(42)).build();
//! let manager = env.manager();
//!
//! let records: Vec<Record> = (0..3)
//!     .map(|row| {
//!         Record::new(RecordMeta::for_sheet_row(0, "造林", row))
//!             .with_field("林场", "南山林场")
//!             .with_field("作业面积", 12.5)
//!     })
//!     .collect();
//!
//! assert!(manager.save(&records, &NoProgress).await.success);
//! assert_eq!(manager.load().await.unwrap().records, records);
//!
//! manager.clear_all().await;
//! assert!(manager.load().await.is_none());
//! # });
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     StorageManager                      │
//! │        save  │  load  │  clear_all  │  storage_info      │
//! ├─────────────────────────────────────────────────────────┤
//! │  selector (size)  │  codec (batches)  │  progress       │
//! ├─────────────────────────────────────────────────────────┤
//! │  KeyValueStore (A)        │  ObjectStore (B)            │
//! │  Sim / File               │  Sim / Sqlite               │
//! ├─────────────────────────────────────────────────────────┤
//! │  DST Framework            │ Fault injection + simulation│
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Feature Flags
//!
//! - `sqlite` - `SQLite` object store backend

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod codec;
pub mod config;
pub mod constants;
pub mod dst;
pub mod manager;
pub mod progress;
pub mod record;
pub mod selector;
pub mod telemetry;

// Re-export common types
pub use backend::{
    BackendError, BackendId, BackendResult, FileKeyValueStore, KeyValueStore, ObjectStore,
    ObjectStoreConnection, SimKeyValueStore, SimObjectStore,
};
#[cfg(feature = "sqlite")]
pub use backend::SqliteObjectStore;
pub use codec::Batch;
pub use config::{ConfigError, GapPolicy, KeyLayout, StoreConfig};
pub use constants::*;
pub use dst::{
    create_simulation, DeterministicRng, FaultConfig, FaultInjector, FaultType, SimClock,
    SimConfig, SimEnvironment, Simulation,
};
pub use manager::{
    BatchInfo, KeyValueInfo, LoadResult, StorageInfo, StorageManager, StorageResult, TimeSource,
};
pub use progress::{NoProgress, ProgressRecorder, ProgressSink};
pub use record::{FieldValue, Record, RecordMeta};
pub use telemetry::{init_tracing, TelemetryConfig, TelemetryError};
