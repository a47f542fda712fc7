//! Bus health monitor.
//!
//! [`BusMonitor`] borrows its [`TwaiLink`] and samples the controller status
//! once per monitor interval:
//!
//! * bus-off → the recovery state machine runs inline, polling pauses meanwhile;
//! * TX or RX error counter above 127 → warning only;
//! * anything else → nothing to do.
//!
//! The runner future is executor-agnostic: spawn it once, or `select` it next to
//! the application's own work. It idles while the link is closed, polls while it
//! is open, and goes back to idle when [`TwaiLink::close`] requests a stop, so
//! one runner supervises every open/close cycle of the link. It never returns on
//! its own: dropping it is the way to terminate it, and is always safe, even in
//! the middle of a recovery.
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use futures_util::{
    future::{select, Either},
    pin_mut,
};

use crate::infra::twai::driver::{BusHealth, TwaiDriver};
use crate::infra::twai::link::TwaiLink;
use crate::protocol::transport::traits::link_timer::LinkTimer;

//==================================================================================MONITOR_STATE
/// Flags shared between the link and its monitor runner.
pub(crate) struct MonitorState {
    /// A runner future exists for this link.
    attached: AtomicBool,
    /// The runner is polling an open link.
    running: AtomicBool,
    stop_requested: AtomicBool,
    /// Wakes the runner on open and on stop requests.
    wake: Signal<CriticalSectionRawMutex, ()>,
}

impl MonitorState {
    pub(crate) const fn new() -> Self {
        Self {
            attached: AtomicBool::new(false),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            wake: Signal::new(),
        }
    }

    /// Clear a previous stop request and wake an idle runner.
    pub(crate) fn arm(&self) {
        self.stop_requested.store(false, Ordering::Release);
        self.wake.signal(());
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.wake.signal(());
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Wait `millis` ms unless a stop is requested first.
    /// Returns `true` when the wait ended because of a stop request.
    pub(crate) async fn sleep_or_stop<T: LinkTimer>(&self, timer: &T, millis: u32) -> bool {
        let delay = timer.delay_ms(millis);
        pin_mut!(delay);

        loop {
            if self.stop_requested() {
                return true;
            }
            let wake = self.wake.wait();
            pin_mut!(wake);
            match select(delay.as_mut(), wake).await {
                Either::Left(_) => return self.stop_requested(),
                // Stale wake-ups (e.g. from `arm`) do not shorten the wait.
                Either::Right(_) => continue,
            }
        }
    }
}

/// Releases the runner slot when the runner is dropped.
struct RunnerGuard<'a>(&'a MonitorState);

impl Drop for RunnerGuard<'_> {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
        self.0.attached.store(false, Ordering::Release);
    }
}

//==================================================================================BUS_MONITOR
/// Runner sampling the bus status of one link.
pub struct BusMonitor<'l, D: TwaiDriver, T: LinkTimer> {
    link: &'l TwaiLink<D, T>,
}

impl<'l, D: TwaiDriver, T: LinkTimer> BusMonitor<'l, D, T> {
    pub(crate) fn new(link: &'l TwaiLink<D, T>) -> Self {
        Self { link }
    }

    /// Supervise the link for as long as the future is polled.
    ///
    /// Returns immediately when another runner is already attached to this link.
    pub async fn run(self) {
        let state = &self.link.monitor;
        if state.attached.swap(true, Ordering::AcqRel) {
            warn!("Bus monitor already running");
            return;
        }
        let _guard = RunnerGuard(state);
        let interval = self.link.settings.monitor_interval_ms;

        loop {
            while state.stop_requested() || !self.link.is_open() {
                state.wake.wait().await;
            }

            state.running.store(true, Ordering::Release);
            info!("Bus monitor started");
            loop {
                self.poll_once().await;
                if state.sleep_or_stop(&self.link.timer, interval).await {
                    break;
                }
            }
            state.running.store(false, Ordering::Release);
            info!("Bus monitor stopped");
        }
    }

    /// Sample the controller once and react to what it reports.
    ///
    /// `None` when the status could not be read (driver not installed).
    pub async fn poll_once(&self) -> Option<BusHealth> {
        let status = match self.link.bus_status() {
            Ok(status) => status,
            Err(err) => {
                trace!("Bus status unavailable: {}", err.as_str());
                return None;
            }
        };

        let health = status.health();
        match health {
            BusHealth::BusOff => {
                error!("Bus-off condition detected");
                self.link.recover().await;
            }
            BusHealth::ErrorPassive => {
                warn!(
                    "High error counters detected: TX={}, RX={}",
                    status.tx_error_counter,
                    status.rx_error_counter
                );
                self.link.recovery.clear_streak();
            }
            BusHealth::Healthy => self.link.recovery.clear_streak(),
        }
        Some(health)
    }
}
