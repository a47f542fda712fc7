//! TWAI (ESP32 CAN) data-link adapter: configuration derivation, the driver
//! interface, the frame transceiver, the bus health monitor, and the bus-off
//! recovery state machine.
//!
//! ## Timing Constants
//!
//! Defaults used when [`TwaiConfig`](config::TwaiConfig) does not override them.

pub mod config;
pub mod driver;
pub mod link;
pub mod monitor;
pub mod recovery;

/// Interval between two samples of the controller status (ms).
pub const MONITOR_INTERVAL_MS: u32 = 1000;

/// Pause between stopping a bus-off controller and reinstalling it (ms).
pub const RECOVERY_RESTART_DELAY_MS: u32 = 1000;
