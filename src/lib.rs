//! # Galvani - Battery pool availability tracking
//!
//! A Rust implementation of real-time battery availability detection for
//! grid-connected energy-storage fleets, fusing asynchronous telemetry
//! arrival with externally asserted dispatch outcomes into one consistent
//! working-battery set per pool.
//!
//! ## Features
//!
//! - **Per-battery health detection**: one tracker task per
//!   battery/inverter pair, deriving Working/NotWorking from telemetry
//!   recency alone
//! - **Pool aggregation**: a single-owner merge loop combines automatic
//!   statuses with time-bounded manual overrides
//! - **Debounced publishing**: snapshots go out on a single-slot channel
//!   only when the working set actually changes
//! - **Non-blocking queries**: dispatch schedulers read an atomically
//!   swapped snapshot, never the aggregator's internals
//! - **Override cooldown**: failed equipment stays excluded for a
//!   configurable blocking duration, preventing dispatch hot-loops
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! The crate follows a modular architecture with clear separation of concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `component`: Component identities and battery/inverter pairing
//! - `telemetry`: Telemetry arrival signals and the subscription seam
//! - `tracker`: Per-battery health detection
//! - `pool`: Pool-level status aggregation and publishing

pub mod component;
pub mod config;
pub mod error;
pub mod logging;
pub mod pool;
pub mod telemetry;
pub mod tracker;

// Re-export commonly used types
pub use component::{ComponentId, ComponentTopology, StaticTopology};
pub use config::{Config, PoolConfig};
pub use error::{GalvaniError, Result};
pub use pool::{BatteryPoolStatus, PoolSnapshot};
pub use telemetry::{ComponentSample, TelemetryFeed, TelemetrySource};
pub use tracker::{BatteryStatus, BatteryStatusTracker};
