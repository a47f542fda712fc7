//! `korri-n2k-twai` library: data-link adapter binding an NMEA 2000 stack to a
//! TWAI/CAN controller in a `no_std` environment. The crate exposes the raw
//! frame contracts consumed by the upper stack, the controller configuration,
//! the frame transceiver, and the bus-off supervision (monitor + recovery).
#![cfg_attr(not(test), no_std)]
//==================================================================================
// Must come first so the logging macros are visible to every module below.
#[macro_use]
mod fmt;
//==================================================================================
/// Link and controller errors (lifecycle, transmission, status queries).
pub mod error;
/// TWAI controller side: configuration, driver interface, transceiver,
/// bus health monitor, and bus-off recovery.
pub mod infra;
/// Frame-level contracts shared with the upper NMEA 2000 stack.
pub mod protocol;
//==================================================================================
