//! Single internal interface to a TWAI controller driver.
//!
//! The link is generic over [`TwaiDriver`]: the concrete controller is chosen
//! at build time by the type parameter, so differences between driver API
//! revisions stay inside one implementation instead of duplicating the link.
//!
//! All methods take `&self`: the sending context and the bus monitor call into
//! the same driver concurrently, so implementations must synchronise internally.
use crate::infra::twai::config::ControllerConfig;
use crate::protocol::transport::can_frame::CanFrame;

pub mod loopback;

/// Error counter value above which a node is error-passive.
pub const ERROR_PASSIVE_THRESHOLD: u32 = 127;

//==================================================================================BUS_STATUS
/// Controller fault confinement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusState {
    #[default]
    Active,
    ErrorPassive,
    BusOff,
}

/// Snapshot of the controller status registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusStatus {
    pub state: BusState,
    pub tx_error_counter: u32,
    pub rx_error_counter: u32,
}

/// What the monitor makes of a [`BusStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusHealth {
    Healthy,
    /// One of the error counters crossed the error-passive boundary.
    ErrorPassive,
    /// Controller disconnected itself from the bus.
    BusOff,
}

impl BusStatus {
    /// Classify the snapshot. Bus-off wins over elevated counters.
    pub const fn health(&self) -> BusHealth {
        match self.state {
            BusState::BusOff => BusHealth::BusOff,
            _ if self.tx_error_counter > ERROR_PASSIVE_THRESHOLD
                || self.rx_error_counter > ERROR_PASSIVE_THRESHOLD =>
            {
                BusHealth::ErrorPassive
            }
            _ => BusHealth::Healthy,
        }
    }
}

//==================================================================================DRIVER
/// Controller driver operations used by the link.
///
/// Lifecycle: `install` → `start` → (`transmit`/`receive`/`status`)* → `stop` → `uninstall`.
///
/// The link serialises lifecycle calls with an atomic flag and never holds a
/// critical section across them, so implementations may allocate, block
/// briefly, or register interrupt handlers there.
pub trait TwaiDriver {
    type Error: core::fmt::Debug;

    /// Allocate queues and program timing/filter/general registers.
    fn install(&self, config: &ControllerConfig) -> Result<(), Self::Error>;

    /// Release the driver instance. Queued frames are discarded.
    fn uninstall(&self) -> Result<(), Self::Error>;

    /// Join the bus.
    fn start(&self) -> Result<(), Self::Error>;

    /// Leave the bus. Pending transmissions are discarded.
    fn stop(&self) -> Result<(), Self::Error>;

    /// Zero-wait enqueue. `WouldBlock` when the TX queue is full.
    fn transmit(&self, frame: &CanFrame) -> nb::Result<(), Self::Error>;

    /// Zero-wait dequeue. `WouldBlock` when the RX queue is empty.
    fn receive(&self) -> nb::Result<CanFrame, Self::Error>;

    /// Read the fault confinement state and error counters.
    fn status(&self) -> Result<BusStatus, Self::Error>;
}
