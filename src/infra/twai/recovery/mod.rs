//! Bus-off recovery state machine.
//!
//! ```text
//! Running ──bus-off──▶ Stopping ──▶ Stopped ──restart delay──▶ Reinitializing ──▶ Running
//! ```
//!
//! * `Stopping`: the controller is stopped and uninstalled. Frames still queued
//!   in either direction are lost.
//! * `Stopped`: unconditional pause (1 s by default) whatever the fault.
//! * `Reinitializing`: reinstall and restart with the configuration frozen at open.
//!
//! Send/receive are refused for the whole cycle and resume transparently
//! afterwards. A failed restart is only logged: the next attempt happens when
//! the monitor observes bus-off again. Repeated bus-off events each run a full
//! cycle with the same delay; [`RecoveryPolicy`] can cap consecutive restarts,
//! unlimited by default.
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::error::LinkError;
use crate::infra::twai::driver::TwaiDriver;
use crate::infra::twai::link::TwaiLink;
use crate::infra::twai::RECOVERY_RESTART_DELAY_MS;
use crate::protocol::transport::traits::link_timer::LinkTimer;

//==================================================================================POLICY
/// Tunables for repeated bus-off handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecoveryPolicy {
    /// Pause between stopping and reinstalling the controller (ms).
    pub restart_delay_ms: u32,
    /// Maximum restarts without the bus ever leaving bus-off in between.
    /// `None` retries forever.
    pub max_consecutive_restarts: Option<u32>,
}

impl RecoveryPolicy {
    /// Fixed 1 s delay, no retry limit.
    pub const UNLIMITED: Self = Self {
        restart_delay_ms: RECOVERY_RESTART_DELAY_MS,
        max_consecutive_restarts: None,
    };

    #[inline]
    pub const fn with_restart_delay_ms(mut self, millis: u32) -> Self {
        self.restart_delay_ms = millis;
        self
    }

    #[inline]
    pub const fn with_max_consecutive_restarts(mut self, limit: u32) -> Self {
        self.max_consecutive_restarts = Some(limit);
        self
    }

    /// Whether the `attempt`-th consecutive restart (1-based) may run.
    pub const fn allows(&self, attempt: u32) -> bool {
        match self.max_consecutive_restarts {
            Some(limit) => attempt <= limit,
            None => true,
        }
    }
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::UNLIMITED
    }
}

//==================================================================================STATE
/// Steps of a recovery cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RecoveryState {
    Running = 0,
    Stopping = 1,
    Stopped = 2,
    Reinitializing = 3,
}

impl RecoveryState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => RecoveryState::Stopping,
            2 => RecoveryState::Stopped,
            3 => RecoveryState::Reinitializing,
            _ => RecoveryState::Running,
        }
    }
}

/// How a recovery cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecoveryOutcome {
    /// Controller reinstalled and restarted.
    Recovered,
    /// Reinstall or restart failed; waiting for the next bus-off observation.
    RestartFailed,
    /// Link closed during the cycle; the controller is left down.
    Aborted,
    /// Consecutive restart limit reached; nothing was done.
    LimitReached,
}

/// Recovery bookkeeping shared by the link (traffic gating) and the monitor.
pub(crate) struct RecoveryMachine {
    state: AtomicU8,
    /// Completed cycles since open.
    cycles: AtomicU32,
    /// Restarts since the monitor last saw the bus out of bus-off.
    streak: AtomicU32,
}

impl RecoveryMachine {
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicU8::new(RecoveryState::Running as u8),
            cycles: AtomicU32::new(0),
            streak: AtomicU32::new(0),
        }
    }

    pub(crate) fn state(&self) -> RecoveryState {
        RecoveryState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn enter(&self, state: RecoveryState) {
        debug!("Recovery state -> {}", state as u8);
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn cycles(&self) -> u32 {
        self.cycles.load(Ordering::Acquire)
    }

    pub(crate) fn clear_streak(&self) {
        self.streak.store(0, Ordering::Release);
    }

    /// Back to a fresh `Running` machine (on open).
    pub(crate) fn reset(&self) {
        self.state.store(RecoveryState::Running as u8, Ordering::Release);
        self.cycles.store(0, Ordering::Release);
        self.streak.store(0, Ordering::Release);
    }
}

//==================================================================================CYCLE
impl<D: TwaiDriver, T: LinkTimer> TwaiLink<D, T> {
    /// Run one stop → delay → reinstall → restart cycle.
    ///
    /// Normally driven by the [`BusMonitor`](crate::infra::twai::monitor::BusMonitor)
    /// when it observes bus-off.
    pub async fn recover(&self) -> RecoveryOutcome {
        let policy = self.settings.recovery;
        let attempt = self.recovery.streak.load(Ordering::Acquire) + 1;
        if !policy.allows(attempt) {
            error!(
                "Bus-off persists after {} restarts, recovery suspended",
                attempt - 1
            );
            return RecoveryOutcome::LimitReached;
        }
        self.recovery.streak.store(attempt, Ordering::Release);
        info!("Handling bus error: reinitializing TWAI driver");

        self.recovery.enter(RecoveryState::Stopping);
        if let Err(err) = self.tear_down() {
            error!("Failed to {} TWAI driver during recovery", err.as_str());
        }

        self.recovery.enter(RecoveryState::Stopped);
        if self
            .monitor
            .sleep_or_stop(&self.timer, policy.restart_delay_ms)
            .await
        {
            info!("Recovery aborted: link closing");
            return RecoveryOutcome::Aborted;
        }

        // `bring_up` re-checks `is_open` while it owns the driver, so a close
        // racing this step never leaves a restarted controller behind.
        self.recovery.enter(RecoveryState::Reinitializing);
        let config = self.controller_config();
        let outcome = match self.bring_up(&config) {
            Ok(()) => RecoveryOutcome::Recovered,
            Err(LinkError::NotOpen) => {
                info!("Recovery aborted: link closed");
                return RecoveryOutcome::Aborted;
            }
            Err(err) => {
                error!("Failed to {} TWAI driver during recovery", err.as_str());
                RecoveryOutcome::RestartFailed
            }
        };

        self.recovery.cycles.fetch_add(1, Ordering::AcqRel);
        self.recovery.enter(RecoveryState::Running);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::twai::config::TwaiConfig;
    use crate::infra::twai::driver::loopback::LoopbackTwai;

    struct NoDelay;

    impl LinkTimer for NoDelay {
        async fn delay_ms(&self, _millis: u32) {}
    }

    #[test]
    fn test_restart_refused_once_closed() {
        let link = TwaiLink::new(
            LoopbackTwai::<8>::new(),
            NoDelay,
            TwaiConfig::builder(17, 18).queue_depths(4, 4).build(),
        );
        let config = link.controller_config();

        assert!(matches!(link.bring_up(&config), Err(LinkError::NotOpen)));
        assert_eq!(link.driver().stats().installs, 0);
        assert!(link.driver().installed_config().is_none());
    }

    #[test]
    fn test_default_policy_is_unlimited() {
        let policy = RecoveryPolicy::default();
        assert_eq!(policy.restart_delay_ms, 1000);
        assert!(policy.allows(1));
        assert!(policy.allows(u32::MAX));
    }

    #[test]
    fn test_limited_policy() {
        let policy = RecoveryPolicy::UNLIMITED
            .with_restart_delay_ms(20)
            .with_max_consecutive_restarts(2);
        assert_eq!(policy.restart_delay_ms, 20);
        assert!(policy.allows(1));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
    }

    #[test]
    fn test_state_round_trip() {
        let machine = RecoveryMachine::new();
        for state in [
            RecoveryState::Stopping,
            RecoveryState::Stopped,
            RecoveryState::Reinitializing,
            RecoveryState::Running,
        ] {
            machine.enter(state);
            assert_eq!(machine.state(), state);
        }
        machine.enter(RecoveryState::Stopped);
        machine.reset();
        assert_eq!(machine.state(), RecoveryState::Running);
        assert_eq!(machine.cycles(), 0);
    }
}
