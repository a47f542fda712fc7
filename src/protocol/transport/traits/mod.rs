//! Abstraction traits at the transport boundary (CAN bus, lifecycle contract, timer).
pub mod can_bus;
pub mod frame_link;
pub mod link_timer;
