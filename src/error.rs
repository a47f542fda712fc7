//! Error definitions shared across library modules.
//! `LinkError` covers everything the transceiver can report; `DriverError`
//! is the failure set of the in-tree loopback controller.
use thiserror_no_std::Error;

#[derive(Error, Debug)]
/// Failures reported by the TWAI link (transceiver, monitor, recovery).
pub enum LinkError<E: core::fmt::Debug> {
    /// The link has not been opened, or was closed.
    #[error("Link is not open")]
    NotOpen,
    /// A bus-off recovery cycle currently owns the controller.
    #[error("Bus-off recovery in progress")]
    Recovering,
    /// Zero-wait enqueue refused: the TX queue is full.
    #[error("TX queue full")]
    QueueFull,
    /// Blocking send could not enqueue the frame before the timeout elapsed.
    #[error("Send timed out")]
    Timeout,
    /// Driver refused to install with the built configuration.
    #[error("Driver install failed: {0:?}")]
    Install(E),
    /// Driver installed but refused to start.
    #[error("Driver start failed: {0:?}")]
    Start(E),
    /// Driver refused to stop.
    #[error("Driver stop failed: {0:?}")]
    Stop(E),
    /// Driver refused to uninstall.
    #[error("Driver uninstall failed: {0:?}")]
    Uninstall(E),
    /// Controller rejected the frame.
    #[error("Transmit failed: {0:?}")]
    Transmit(E),
    /// Controller failed to hand over a received frame.
    #[error("Receive failed: {0:?}")]
    Receive(E),
    /// Status registers could not be read.
    #[error("Status query failed: {0:?}")]
    Status(E),
}

impl<E: core::fmt::Debug> LinkError<E> {
    /// Short static label, usable by every logging back-end.
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkError::NotOpen => "not open",
            LinkError::Recovering => "recovering",
            LinkError::QueueFull => "queue full",
            LinkError::Timeout => "timeout",
            LinkError::Install(_) => "install",
            LinkError::Start(_) => "start",
            LinkError::Stop(_) => "stop",
            LinkError::Uninstall(_) => "uninstall",
            LinkError::Transmit(_) => "transmit",
            LinkError::Receive(_) => "receive",
            LinkError::Status(_) => "status",
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised by the loopback TWAI controller.
pub enum DriverError {
    /// Operation not allowed in the current driver state
    /// (not installed, already started, stopped...).
    #[error("Invalid driver state")]
    InvalidState,
    /// Install was refused (injected failure).
    #[error("Driver install failed")]
    InstallFailed,
    /// Start was refused (injected failure).
    #[error("Driver start failed")]
    StartFailed,
    /// Controller is bus-off and cannot transmit.
    #[error("Controller is bus-off")]
    BusOff,
}

impl embedded_can::Error for DriverError {
    fn kind(&self) -> embedded_can::ErrorKind {
        embedded_can::ErrorKind::Other
    }
}
