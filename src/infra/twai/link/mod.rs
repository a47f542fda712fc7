//! Frame transceiver binding the NMEA 2000 stack to a TWAI controller.
//!
//! [`TwaiLink`] exclusively owns the controller driver and exposes the
//! lifecycle contract expected by the stack ([`FrameLink`]): queue depth setup,
//! an idempotent `open`, then independent `send_frame`/`receive_frame` calls.
//! Failures stay local: they are logged and reported as `false`/`None`. The
//! `Result`-returning variants ([`TwaiLink::transmit`], [`TwaiLink::try_receive`],
//! [`TwaiLink::try_open`]) expose the reason to callers that want it.
//!
//! Bus health supervision runs next to the transceiver: [`TwaiLink::monitor`]
//! hands out the [`BusMonitor`] runner, which idles until the link is opened,
//! then samples the controller status and drives bus-off recovery.
//!
//! # Example
//!
//! ```rust,ignore
//! use korri_n2k_twai::infra::twai::{config::TwaiConfig, link::TwaiLink};
//!
//! let link = TwaiLink::new(driver, timer, TwaiConfig::builder(17, 18).build());
//! link.set_buffer_size(64, 32);
//! link.init_frame_buffers();
//! link.open();
//!
//! // Spawn/select the monitor next to the application tasks.
//! let monitor = link.monitor().run();
//!
//! link.send_frame(0x09F8_0142, 8, &payload, true).await;
//! while let Some(frame) = link.receive_frame() { /* feed the stack */ }
//! ```
use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use futures_util::{
    future::{select, Either},
    pin_mut,
};

use crate::error::LinkError;
use crate::infra::twai::config::{ControllerConfig, QueueDepths, TwaiConfig};
use crate::infra::twai::driver::{BusStatus, TwaiDriver};
use crate::infra::twai::monitor::{BusMonitor, MonitorState};
use crate::infra::twai::recovery::{RecoveryMachine, RecoveryState};
use crate::protocol::transport::{
    can_frame::CanFrame,
    traits::{can_bus::CanBus, frame_link::FrameLink, link_timer::LinkTimer},
    CAN_SEND_RETRY_MS,
};

const DRIVER_DOWN: u8 = 0;
const DRIVER_BUSY: u8 = 1;
const DRIVER_UP: u8 = 2;

/// TWAI data-link adapter.
pub struct TwaiLink<D: TwaiDriver, T: LinkTimer> {
    pub(crate) driver: D,
    pub(crate) timer: T,
    pub(crate) settings: TwaiConfig,
    /// Controller bundle; queue depths frozen once the link is open.
    config: Mutex<CriticalSectionRawMutex, Cell<ControllerConfig>>,
    /// Driver lifecycle: `DRIVER_DOWN`, `DRIVER_BUSY` or `DRIVER_UP`.
    lifecycle: AtomicU8,
    is_open: AtomicBool,
    pub(crate) monitor: MonitorState,
    pub(crate) recovery: RecoveryMachine,
}

impl<D: TwaiDriver, T: LinkTimer> TwaiLink<D, T> {
    /// Build a closed link. Nothing touches the controller before [`open`](Self::open).
    pub fn new(driver: D, timer: T, settings: TwaiConfig) -> Self {
        Self {
            driver,
            timer,
            config: Mutex::new(Cell::new(settings.controller_config())),
            settings,
            lifecycle: AtomicU8::new(DRIVER_DOWN),
            is_open: AtomicBool::new(false),
            monitor: MonitorState::new(),
            recovery: RecoveryMachine::new(),
        }
    }

    //==============================================================================CONFIGURATION

    /// Change RX/TX queue depths. Silently ignored once the link is open.
    pub fn set_buffer_size(&self, rx: u16, tx: u16) {
        let applied = self.config.lock(|cell| {
            if self.is_open() {
                return false;
            }
            cell.set(cell.get().with_queue_depths(QueueDepths::new(rx, tx)));
            true
        });
        if !applied {
            debug!("set_buffer_size({}, {}) ignored: link already open", rx, tx);
        }
    }

    /// Substitute RX=50 / TX=40 for depths still unset. No-op once open.
    pub fn init_frame_buffers(&self) {
        self.config.lock(|cell| {
            if !self.is_open() {
                let config = cell.get();
                cell.set(config.with_queue_depths(config.queue_depths().with_defaults()));
            }
        });
    }

    /// Controller bundle used at install time (and by every recovery).
    pub fn controller_config(&self) -> ControllerConfig {
        self.config.lock(|cell| cell.get())
    }

    /// Adapter settings this link was built with.
    pub fn settings(&self) -> &TwaiConfig {
        &self.settings
    }

    //==============================================================================LIFECYCLE

    /// Install and start the controller, then arm the bus monitor.
    ///
    /// Idempotent: once open, further calls return `true` without side effects.
    /// Install/start failures are logged but still reported as `true`, and the
    /// link stays open; use [`try_open`](Self::try_open) to observe them.
    pub fn open(&self) -> bool {
        let Some(config) = self.claim_open() else {
            return true;
        };
        if let Err(err) = self.bring_up(&config) {
            error!("Failed to {} TWAI driver, link left open", err.as_str());
        }
        true
    }

    /// Strict variant of [`open`](Self::open): on install/start failure the link
    /// is left closed and the error returned.
    pub fn try_open(&self) -> Result<(), LinkError<D::Error>> {
        let Some(config) = self.claim_open() else {
            return Ok(());
        };
        self.bring_up(&config).inspect_err(|_| {
            self.monitor.request_stop();
            self.is_open.store(false, Ordering::Release);
        })
    }

    /// Freeze the configuration and flip `is_open`. `None` when already open.
    fn claim_open(&self) -> Option<ControllerConfig> {
        let config = self.config.lock(|cell| {
            if self.is_open() {
                return None;
            }
            let config = cell.get();
            let config = config.with_queue_depths(config.queue_depths().with_defaults());
            cell.set(config);
            self.is_open.store(true, Ordering::Release);
            Some(config)
        })?;

        self.recovery.reset();
        self.monitor.arm();
        if !config.general.isr_in_iram {
            warn!("TWAI ISR not placed in IRAM");
        }
        Some(config)
    }

    /// Stop the monitor and release the controller. Safe to call repeatedly.
    pub fn close(&self) {
        self.monitor.request_stop();
        if self.is_open.swap(false, Ordering::AcqRel) {
            info!("Stopping TWAI driver");
            if let Err(err) = self.tear_down() {
                error!("Failed to {} TWAI driver", err.as_str());
            }
        }
    }

    /// Install then start the driver with `config`.
    ///
    /// Refused with [`LinkError::NotOpen`] once the link is closed. A `close`
    /// landing while the driver comes up is honoured by tearing it down again.
    pub(crate) fn bring_up(&self, config: &ControllerConfig) -> Result<(), LinkError<D::Error>> {
        if self
            .lifecycle
            .compare_exchange(DRIVER_DOWN, DRIVER_BUSY, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        if !self.is_open() {
            self.lifecycle.store(DRIVER_DOWN, Ordering::Release);
            return Err(LinkError::NotOpen);
        }

        info!(
            "Initializing TWAI driver: {} kbit/s, rx {} / tx {}",
            config.bitrate.kbps(),
            config.general.rx_queue_len,
            config.general.tx_queue_len
        );
        if let Err(err) = self.driver.install(config) {
            self.lifecycle.store(DRIVER_DOWN, Ordering::Release);
            return Err(LinkError::Install(err));
        }
        if let Err(err) = self.driver.start() {
            let _ = self.driver.uninstall();
            self.lifecycle.store(DRIVER_DOWN, Ordering::Release);
            return Err(LinkError::Start(err));
        }
        self.lifecycle.store(DRIVER_UP, Ordering::Release);

        // `close` skips the teardown while we are busy; catch up here.
        if !self.is_open() {
            debug!("Link closed during driver start, releasing controller");
            self.tear_down()?;
            return Err(LinkError::NotOpen);
        }
        info!("TWAI driver started successfully");
        Ok(())
    }

    /// Stop then uninstall the driver. Queued frames are lost.
    ///
    /// No-op when the driver is down or another transition owns it.
    pub(crate) fn tear_down(&self) -> Result<(), LinkError<D::Error>> {
        if self
            .lifecycle
            .compare_exchange(DRIVER_UP, DRIVER_BUSY, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        let stopped = self.driver.stop().map_err(LinkError::Stop);
        let uninstalled = self.driver.uninstall().map_err(LinkError::Uninstall);
        self.lifecycle.store(DRIVER_DOWN, Ordering::Release);
        stopped.and(uninstalled)
    }

    //==============================================================================TRAFFIC

    /// Queue one frame (see [`transmit`](Self::transmit)) and report success as a boolean.
    pub async fn send_frame(&self, id: u32, len: u8, payload: &[u8], wait_sent: bool) -> bool {
        let frame = CanFrame::from_parts(id, len, payload);
        match self.transmit(&frame, wait_sent).await {
            Ok(()) => true,
            Err(err) => {
                trace!("Frame {} dropped: {}", frame.id.raw(), err.as_str());
                false
            }
        }
    }

    /// Hand a frame to the controller.
    ///
    /// Without `wait_sent` this is a zero-wait enqueue. With it, enqueue is
    /// retried until the configured send timeout (100 ms by default) elapses.
    /// Frames are never retried past that point.
    pub async fn transmit(&self, frame: &CanFrame, wait_sent: bool) -> Result<(), LinkError<D::Error>> {
        self.ensure_ready()?;

        if !wait_sent {
            return match self.driver.transmit(frame) {
                Ok(()) => Ok(()),
                Err(nb::Error::WouldBlock) => Err(LinkError::QueueFull),
                Err(nb::Error::Other(err)) => Err(LinkError::Transmit(err)),
            };
        }

        let attempt = async {
            loop {
                match self.driver.transmit(frame) {
                    Ok(()) => return Ok(()),
                    Err(nb::Error::WouldBlock) => self.timer.delay_ms(CAN_SEND_RETRY_MS).await,
                    Err(nb::Error::Other(err)) => return Err(LinkError::Transmit(err)),
                }
            }
        };
        let deadline = self.timer.delay_ms(self.settings.send_timeout_ms);
        pin_mut!(attempt);
        pin_mut!(deadline);

        match select(attempt, deadline).await {
            Either::Left((result, _)) => result,
            Either::Right(_) => Err(LinkError::Timeout),
        }
    }

    /// Pop the next received frame, if any. Never waits.
    pub fn receive_frame(&self) -> Option<CanFrame> {
        match self.try_receive() {
            Ok(frame) => frame,
            Err(err) => {
                trace!("Receive skipped: {}", err.as_str());
                None
            }
        }
    }

    /// Pop the next received frame. `Ok(None)` when the RX queue is empty.
    pub fn try_receive(&self) -> Result<Option<CanFrame>, LinkError<D::Error>> {
        self.ensure_ready()?;
        match self.driver.receive() {
            Ok(frame) => Ok(Some(frame)),
            Err(nb::Error::WouldBlock) => Ok(None),
            Err(nb::Error::Other(err)) => Err(LinkError::Receive(err)),
        }
    }

    /// Traffic is only accepted while open and outside a recovery cycle.
    fn ensure_ready(&self) -> Result<(), LinkError<D::Error>> {
        if !self.is_open() {
            return Err(LinkError::NotOpen);
        }
        if self.recovery.state() != RecoveryState::Running {
            return Err(LinkError::Recovering);
        }
        Ok(())
    }

    //==============================================================================STATUS

    /// Fresh snapshot of the controller status registers.
    pub fn bus_status(&self) -> Result<BusStatus, LinkError<D::Error>> {
        self.driver.status().map_err(LinkError::Status)
    }

    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Acquire)
    }

    /// Current step of the bus-off recovery state machine.
    pub fn recovery_state(&self) -> RecoveryState {
        self.recovery.state()
    }

    /// Recovery cycles completed since the link was opened.
    pub fn recovery_count(&self) -> u32 {
        self.recovery.cycles()
    }

    /// Whether a [`BusMonitor`] runner is currently polling.
    pub fn monitor_running(&self) -> bool {
        self.monitor.is_running()
    }

    /// Underlying controller driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    //==============================================================================RUNNERS

    /// Bus health monitor runner for this link.
    pub fn monitor(&self) -> BusMonitor<'_, D, T> {
        BusMonitor::new(self)
    }

    /// [`CanBus`] view of this link for the NMEA 2000 stack.
    pub fn port(&self) -> CanPort<'_, D, T> {
        CanPort { link: self }
    }
}

impl<D: TwaiDriver, T: LinkTimer> Drop for TwaiLink<D, T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<D: TwaiDriver, T: LinkTimer> FrameLink for TwaiLink<D, T> {
    fn set_buffer_size(&self, rx: u16, tx: u16) {
        TwaiLink::set_buffer_size(self, rx, tx)
    }

    fn init_frame_buffers(&self) {
        TwaiLink::init_frame_buffers(self)
    }

    fn open(&self) -> bool {
        TwaiLink::open(self)
    }

    fn send_frame<'a>(
        &'a self,
        id: u32,
        len: u8,
        payload: &'a [u8],
        wait_sent: bool,
    ) -> impl core::future::Future<Output = bool> + 'a {
        TwaiLink::send_frame(self, id, len, payload, wait_sent)
    }

    fn receive_frame(&self) -> Option<CanFrame> {
        TwaiLink::receive_frame(self)
    }
}

//==================================================================================CAN_PORT
/// Borrowed [`CanBus`] implementation over a [`TwaiLink`].
///
/// `send` waits for queue space up to the send timeout. `recv` polls the RX
/// queue at the configured interval and waits out bus-off recoveries.
pub struct CanPort<'l, D: TwaiDriver, T: LinkTimer> {
    link: &'l TwaiLink<D, T>,
}

impl<'l, D: TwaiDriver, T: LinkTimer> CanBus for CanPort<'l, D, T> {
    type Error = LinkError<D::Error>;

    async fn send<'a>(&'a mut self, frame: &'a CanFrame) -> Result<(), Self::Error> {
        self.link.transmit(frame, true).await
    }

    async fn recv<'a>(&'a mut self) -> Result<CanFrame, Self::Error> {
        loop {
            match self.link.try_receive() {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) | Err(LinkError::Recovering) => {}
                Err(err) => return Err(err),
            }
            self.link
                .timer
                .delay_ms(self.link.settings.receive_poll_ms)
                .await;
        }
    }
}
