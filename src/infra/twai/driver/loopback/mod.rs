//! In-memory TWAI controller.
//!
//! Behaves like a controller wired to a bus where every transmitted frame is
//! received back (self-reception): frames wait in a TX queue bounded by the
//! configured TX depth and move to the RX queue as soon as it has room. Remote
//! traffic can be injected, and faults (bus-off, high error counters,
//! install/start refusal) can be forced to exercise the link's supervision.
//!
//! State lives behind an `embassy_sync` blocking mutex, so one instance can be
//! shared between the sending task and the bus monitor. `N` caps both queues;
//! configured depths larger than `N` are clamped.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use heapless::Deque;

use crate::error::DriverError;
use crate::infra::twai::config::{ControllerConfig, QueueDepths};
use crate::infra::twai::driver::{BusState, BusStatus, TwaiDriver, ERROR_PASSIVE_THRESHOLD};
use crate::protocol::transport::can_frame::CanFrame;

/// Error counter value reported once the controller went bus-off.
const BUS_OFF_TX_ERROR_COUNTER: u32 = 256;

/// Lifecycle and traffic counters, handy for assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverStats {
    pub installs: u32,
    pub uninstalls: u32,
    pub starts: u32,
    pub stops: u32,
    /// Frames that left the TX queue onto the bus.
    pub frames_sent: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Faults {
    install: bool,
    start: bool,
    persistent_bus_off: bool,
}

struct LoopbackState<const N: usize> {
    installed: Option<ControllerConfig>,
    depths: QueueDepths,
    started: bool,
    bus: BusStatus,
    tx: Deque<CanFrame, N>,
    rx: Deque<CanFrame, N>,
    stats: DriverStats,
    faults: Faults,
}

impl<const N: usize> LoopbackState<N> {
    const fn new() -> Self {
        Self {
            installed: None,
            depths: QueueDepths::new(0, 0),
            started: false,
            bus: BusStatus {
                state: BusState::Active,
                tx_error_counter: 0,
                rx_error_counter: 0,
            },
            tx: Deque::new(),
            rx: Deque::new(),
            stats: DriverStats {
                installs: 0,
                uninstalls: 0,
                starts: 0,
                stops: 0,
                frames_sent: 0,
            },
            faults: Faults {
                install: false,
                start: false,
                persistent_bus_off: false,
            },
        }
    }

    fn go_bus_off(&mut self) {
        self.bus = BusStatus {
            state: BusState::BusOff,
            tx_error_counter: BUS_OFF_TX_ERROR_COUNTER,
            rx_error_counter: self.bus.rx_error_counter,
        };
        self.tx.clear();
    }

    /// Move pending transmissions to the RX queue while it has room.
    fn pump(&mut self) {
        if !self.started || self.bus.state == BusState::BusOff {
            return;
        }
        while self.rx.len() < self.depths.rx as usize {
            let Some(frame) = self.tx.pop_front() else {
                break;
            };
            if self.rx.push_back(frame).is_err() {
                break;
            }
            self.stats.frames_sent = self.stats.frames_sent.wrapping_add(1);
        }
    }
}

/// Loopback TWAI controller with queues of at most `N` frames.
pub struct LoopbackTwai<const N: usize = 64> {
    state: Mutex<CriticalSectionRawMutex, RefCell<LoopbackState<N>>>,
}

impl<const N: usize> LoopbackTwai<N> {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(LoopbackState::new())),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut LoopbackState<N>) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Deliver a frame sent by another node. Dropped (returns `false`) when
    /// the controller is not running or the RX queue is full.
    pub fn inject(&self, frame: CanFrame) -> bool {
        self.with_state(|state| {
            if !state.started || state.rx.len() >= state.depths.rx as usize {
                return false;
            }
            state.rx.push_back(frame).is_ok()
        })
    }

    /// Force the controller into bus-off. Pending transmissions are lost.
    /// Cleared by the next install.
    pub fn trigger_bus_off(&self) {
        self.with_state(|state| {
            if state.installed.is_some() {
                state.go_bus_off();
            }
        });
    }

    /// Keep the bus faulty: every install lands directly in bus-off.
    pub fn set_persistent_bus_off(&self, enabled: bool) {
        self.with_state(|state| {
            state.faults.persistent_bus_off = enabled;
            if enabled && state.installed.is_some() {
                state.go_bus_off();
            }
        });
    }

    /// Overwrite the error counters; the state follows the error-passive boundary.
    pub fn set_error_counters(&self, tx_error_counter: u32, rx_error_counter: u32) {
        self.with_state(|state| {
            let passive = tx_error_counter > ERROR_PASSIVE_THRESHOLD
                || rx_error_counter > ERROR_PASSIVE_THRESHOLD;
            state.bus = BusStatus {
                state: if passive {
                    BusState::ErrorPassive
                } else {
                    BusState::Active
                },
                tx_error_counter,
                rx_error_counter,
            };
        });
    }

    /// Make the following installs fail.
    pub fn fail_install(&self, enabled: bool) {
        self.with_state(|state| state.faults.install = enabled);
    }

    /// Make the following starts fail.
    pub fn fail_start(&self, enabled: bool) {
        self.with_state(|state| state.faults.start = enabled);
    }

    pub fn stats(&self) -> DriverStats {
        self.with_state(|state| state.stats)
    }

    /// Configuration of the live driver instance, if installed.
    pub fn installed_config(&self) -> Option<ControllerConfig> {
        self.with_state(|state| state.installed)
    }

    /// Queue depths in effect (after clamping to `N`).
    pub fn queue_depths(&self) -> QueueDepths {
        self.with_state(|state| state.depths)
    }

    pub fn is_started(&self) -> bool {
        self.with_state(|state| state.started)
    }

    /// Frames waiting in the RX queue.
    pub fn rx_pending(&self) -> usize {
        self.with_state(|state| state.rx.len())
    }

    /// Frames waiting in the TX queue.
    pub fn tx_pending(&self) -> usize {
        self.with_state(|state| state.tx.len())
    }
}

impl<const N: usize> Default for LoopbackTwai<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TwaiDriver for LoopbackTwai<N> {
    type Error = DriverError;

    fn install(&self, config: &ControllerConfig) -> Result<(), Self::Error> {
        self.with_state(|state| {
            if state.installed.is_some() {
                return Err(DriverError::InvalidState);
            }
            if state.faults.install {
                return Err(DriverError::InstallFailed);
            }
            let depths = config.queue_depths();
            state.depths = QueueDepths::new(
                depths.rx.min(N as u16),
                depths.tx.min(N as u16),
            );
            state.installed = Some(*config);
            state.started = false;
            state.bus = BusStatus::default();
            state.tx.clear();
            state.rx.clear();
            if state.faults.persistent_bus_off {
                state.go_bus_off();
            }
            state.stats.installs += 1;
            Ok(())
        })
    }

    fn uninstall(&self) -> Result<(), Self::Error> {
        self.with_state(|state| {
            if state.installed.is_none() || state.started {
                return Err(DriverError::InvalidState);
            }
            state.installed = None;
            state.tx.clear();
            state.rx.clear();
            state.stats.uninstalls += 1;
            Ok(())
        })
    }

    fn start(&self) -> Result<(), Self::Error> {
        self.with_state(|state| {
            if state.installed.is_none() || state.started {
                return Err(DriverError::InvalidState);
            }
            if state.faults.start {
                return Err(DriverError::StartFailed);
            }
            state.started = true;
            state.stats.starts += 1;
            Ok(())
        })
    }

    fn stop(&self) -> Result<(), Self::Error> {
        self.with_state(|state| {
            if !state.started {
                return Err(DriverError::InvalidState);
            }
            state.started = false;
            state.tx.clear();
            state.stats.stops += 1;
            Ok(())
        })
    }

    fn transmit(&self, frame: &CanFrame) -> nb::Result<(), Self::Error> {
        self.with_state(|state| {
            if !state.started {
                return Err(nb::Error::Other(DriverError::InvalidState));
            }
            if state.bus.state == BusState::BusOff {
                return Err(nb::Error::Other(DriverError::BusOff));
            }
            if state.tx.len() >= state.depths.tx as usize {
                return Err(nb::Error::WouldBlock);
            }
            state
                .tx
                .push_back(*frame)
                .map_err(|_| nb::Error::WouldBlock)?;
            state.pump();
            Ok(())
        })
    }

    fn receive(&self) -> nb::Result<CanFrame, Self::Error> {
        self.with_state(|state| {
            if state.installed.is_none() {
                return Err(nb::Error::Other(DriverError::InvalidState));
            }
            let frame = state.rx.pop_front().ok_or(nb::Error::WouldBlock)?;
            state.pump();
            Ok(frame)
        })
    }

    fn status(&self) -> Result<BusStatus, Self::Error> {
        self.with_state(|state| {
            if state.installed.is_none() {
                return Err(DriverError::InvalidState);
            }
            Ok(state.bus)
        })
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
