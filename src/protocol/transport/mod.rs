//! NMEA 2000 transport boundary: raw CAN frame representation, 29-bit
//! identifiers, and the abstraction traits the upper stack talks through.
//!
//! ## Timing Constants
//!
//! Default waits applied by the TWAI link at this boundary.

pub mod can_frame;
pub mod can_id;
pub mod traits;

/// Maximum time a blocking send waits for TX queue space (ms).
///
/// Prevents indefinite blocking when the bus is faulty, disconnected, or saturated.
///
/// # Timeout rationale
///
/// On an NMEA 2000 bus @ 250 kbps with CAN arbitration:
/// - Maximum time for one frame (8 bytes): ~0.5 ms (no contention)
/// - With arbitration and retransmissions: ~10–20 ms
/// - Safety margin ×5 → 100 ms
pub const CAN_SEND_TIMEOUT_MS: u32 = 100;

/// Interval between two polls of the RX queue while an async receiver waits (ms).
pub const CAN_RECEIVE_POLL_MS: u32 = 10;

/// Pause between two enqueue attempts while a blocking send waits for space (ms).
pub const CAN_SEND_RETRY_MS: u32 = 1;
