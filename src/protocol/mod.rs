//! Frame-level contracts between the TWAI link and the upper NMEA 2000 stack:
//! raw CAN frames, 29-bit identifiers, and the bus/timer abstraction traits.
pub mod transport;
