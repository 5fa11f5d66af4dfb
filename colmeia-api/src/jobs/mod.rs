//! Background Jobs for the Colmeia API
//!
//! - `orphan_sweep`: reconciles task stubs with task documents
//!
//! # Usage
//!
//! ```ignore
//! use colmeia_api::jobs::{orphan_sweep_task, OrphanSweepConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let config = OrphanSweepConfig::from_env();
//! if config.enabled {
//!     tokio::spawn(orphan_sweep_task(relational, documents, config, shutdown_rx));
//! }
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod orphan_sweep;

pub use orphan_sweep::{
    orphan_sweep_task, sweep_once, OrphanSweepConfig, OrphanSweepSnapshot, OrphanSweepStats,
};
