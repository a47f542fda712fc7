//! Controller configuration derivation: bit-rate → timing profile, queue depth
//! defaults, and the immutable bundle (timing, acceptance filter, general
//! options) handed to the driver at install time.
//!
//! # Example
//!
//! ```
//! use korri_n2k_twai::infra::twai::config::{Bitrate, TwaiConfig};
//!
//! let config = TwaiConfig::builder(17, 18)
//!     .bitrate(Bitrate::Kbps250)
//!     .queue_depths(64, 32)
//!     .build();
//!
//! let controller = config.controller_config();
//! assert_eq!(controller.general.rx_queue_len, 64);
//! assert_eq!(controller.timing.bitrate(80_000_000), 250_000);
//! ```
use crate::infra::twai::recovery::RecoveryPolicy;
use crate::infra::twai::MONITOR_INTERVAL_MS;
use crate::protocol::transport::{CAN_RECEIVE_POLL_MS, CAN_SEND_TIMEOUT_MS};

/// Controller source clock the timing table is computed for (APB, 80 MHz).
pub const APB_CLOCK_HZ: u32 = 80_000_000;

/// RX queue depth substituted when the user left it unset (zero).
pub const DEFAULT_RX_QUEUE_LEN: u16 = 50;

/// TX queue depth substituted when the user left it unset (zero).
pub const DEFAULT_TX_QUEUE_LEN: u16 = 40;

//==================================================================================BITRATE
/// Supported nominal bit-rates. NMEA 2000 runs at 250 kbit/s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bitrate {
    Kbps25,
    Kbps50,
    Kbps100,
    Kbps125,
    #[default]
    Kbps250,
    Kbps500,
    Kbps1000,
}

impl Bitrate {
    /// Map a rate expressed in kbit/s. Unknown rates fall back to 250 kbit/s.
    pub const fn from_kbps(kbps: u32) -> Self {
        match kbps {
            25 => Bitrate::Kbps25,
            50 => Bitrate::Kbps50,
            100 => Bitrate::Kbps100,
            125 => Bitrate::Kbps125,
            250 => Bitrate::Kbps250,
            500 => Bitrate::Kbps500,
            1000 => Bitrate::Kbps1000,
            _ => Bitrate::Kbps250,
        }
    }

    /// Nominal rate in kbit/s.
    pub const fn kbps(self) -> u32 {
        match self {
            Bitrate::Kbps25 => 25,
            Bitrate::Kbps50 => 50,
            Bitrate::Kbps100 => 100,
            Bitrate::Kbps125 => 125,
            Bitrate::Kbps250 => 250,
            Bitrate::Kbps500 => 500,
            Bitrate::Kbps1000 => 1000,
        }
    }

    /// Fixed timing profile for this rate.
    pub const fn timing(self) -> TimingConfig {
        match self {
            Bitrate::Kbps25 => TimingConfig::new(128, 16, 8, 3),
            Bitrate::Kbps50 => TimingConfig::new(80, 15, 4, 3),
            Bitrate::Kbps100 => TimingConfig::new(40, 15, 4, 3),
            Bitrate::Kbps125 => TimingConfig::new(32, 15, 4, 3),
            Bitrate::Kbps250 => TimingConfig::new(16, 15, 4, 3),
            Bitrate::Kbps500 => TimingConfig::new(8, 15, 4, 3),
            Bitrate::Kbps1000 => TimingConfig::new(4, 15, 4, 3),
        }
    }
}

//==================================================================================TIMING
/// Bit timing registers for one nominal rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingConfig {
    /// Baud-rate prescaler.
    pub brp: u32,
    /// Time segment 1 (propagation + phase 1), in time quanta.
    pub tseg_1: u8,
    /// Time segment 2 (phase 2), in time quanta.
    pub tseg_2: u8,
    /// Synchronisation jump width, in time quanta.
    pub sjw: u8,
    /// Sample each bit three times instead of once.
    pub triple_sampling: bool,
}

impl TimingConfig {
    const fn new(brp: u32, tseg_1: u8, tseg_2: u8, sjw: u8) -> Self {
        Self {
            brp,
            tseg_1,
            tseg_2,
            sjw,
            triple_sampling: false,
        }
    }

    /// Time quanta per bit (sync segment + both time segments).
    pub const fn quanta_per_bit(&self) -> u32 {
        1 + self.tseg_1 as u32 + self.tseg_2 as u32
    }

    /// Resulting nominal bit-rate (bit/s) for the given source clock.
    pub const fn bitrate(&self, clock_hz: u32) -> u32 {
        clock_hz / (self.brp * self.quanta_per_bit())
    }
}

//==================================================================================FILTER
/// Acceptance filter registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FilterConfig {
    pub acceptance_code: u32,
    pub acceptance_mask: u32,
    pub single_filter: bool,
}

impl FilterConfig {
    /// No hardware filtering: every frame reaches the protocol stack.
    pub const ACCEPT_ALL: Self = Self {
        acceptance_code: 0,
        acceptance_mask: 0xFFFF_FFFF,
        single_filter: true,
    };

    /// Whether this filter lets every identifier through.
    pub const fn accepts_all(&self) -> bool {
        self.acceptance_mask == 0xFFFF_FFFF
    }
}

//==================================================================================GENERAL
/// Controller operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TwaiMode {
    /// Transmit, receive, and acknowledge.
    #[default]
    Normal,
    /// Transmit without requiring an acknowledgement (self test).
    NoAck,
    /// Receive only; never drives the bus.
    ListenOnly,
}

/// General driver options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GeneralConfig {
    pub mode: TwaiMode,
    pub tx_pin: u8,
    pub rx_pin: u8,
    /// Controller instance on chips with more than one TWAI peripheral.
    pub controller_id: u8,
    pub tx_queue_len: u16,
    pub rx_queue_len: u16,
    /// Place the driver interrupt handler in IRAM. Affects responsiveness
    /// while flash is busy (e.g. OTA), not the functional contract.
    pub isr_in_iram: bool,
}

/// RX/TX queue depths. Zero means "unset".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueDepths {
    pub rx: u16,
    pub tx: u16,
}

impl QueueDepths {
    pub const fn new(rx: u16, tx: u16) -> Self {
        Self { rx, tx }
    }

    /// Replace unset depths with RX=50 / TX=40.
    pub const fn with_defaults(self) -> Self {
        Self {
            rx: if self.rx == 0 {
                DEFAULT_RX_QUEUE_LEN
            } else {
                self.rx
            },
            tx: if self.tx == 0 {
                DEFAULT_TX_QUEUE_LEN
            } else {
                self.tx
            },
        }
    }
}

//==================================================================================CONTROLLER_CONFIG
/// Immutable bundle consumed by [`TwaiDriver::install`](crate::infra::twai::driver::TwaiDriver::install).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerConfig {
    pub bitrate: Bitrate,
    pub timing: TimingConfig,
    pub filter: FilterConfig,
    pub general: GeneralConfig,
}

impl ControllerConfig {
    /// Queue depths currently carried by the bundle.
    pub const fn queue_depths(&self) -> QueueDepths {
        QueueDepths::new(self.general.rx_queue_len, self.general.tx_queue_len)
    }

    /// Copy with different queue depths.
    pub const fn with_queue_depths(mut self, depths: QueueDepths) -> Self {
        self.general.rx_queue_len = depths.rx;
        self.general.tx_queue_len = depths.tx;
        self
    }
}

/// Derive the controller configuration for a requested bit-rate.
///
/// Queue depths are passed through as given; zero stays "unset" until the
/// link substitutes defaults at open time.
pub const fn build_config(
    bitrate: Bitrate,
    tx_pin: u8,
    rx_pin: u8,
    controller_id: u8,
    rx_depth: u16,
    tx_depth: u16,
) -> ControllerConfig {
    ControllerConfig {
        bitrate,
        timing: bitrate.timing(),
        filter: FilterConfig::ACCEPT_ALL,
        general: GeneralConfig {
            mode: TwaiMode::Normal,
            tx_pin,
            rx_pin,
            controller_id,
            tx_queue_len: tx_depth,
            rx_queue_len: rx_depth,
            isr_in_iram: false,
        },
    }
}

//==================================================================================TWAI_CONFIG
/// Adapter configuration: controller parameters plus link timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwaiConfig {
    pub bitrate: Bitrate,
    pub tx_pin: u8,
    pub rx_pin: u8,
    pub controller_id: u8,
    pub queue_depths: QueueDepths,
    pub isr_in_iram: bool,
    /// Interval between two bus status samples (ms).
    pub monitor_interval_ms: u32,
    /// Upper bound for a blocking send (ms).
    pub send_timeout_ms: u32,
    /// RX polling interval used by the async `CanBus` receiver (ms).
    pub receive_poll_ms: u32,
    pub recovery: RecoveryPolicy,
}

impl TwaiConfig {
    /// Start a builder for the given pins; everything else uses defaults.
    #[inline]
    pub const fn builder(tx_pin: u8, rx_pin: u8) -> TwaiConfigBuilder {
        TwaiConfigBuilder::new(tx_pin, rx_pin)
    }

    /// Controller bundle derived from this configuration.
    pub const fn controller_config(&self) -> ControllerConfig {
        let mut config = build_config(
            self.bitrate,
            self.tx_pin,
            self.rx_pin,
            self.controller_id,
            self.queue_depths.rx,
            self.queue_depths.tx,
        );
        config.general.isr_in_iram = self.isr_in_iram;
        config
    }
}

/// Fluent builder for [`TwaiConfig`].
#[derive(Debug, Clone, Copy)]
pub struct TwaiConfigBuilder {
    config: TwaiConfig,
}

impl TwaiConfigBuilder {
    #[inline]
    pub const fn new(tx_pin: u8, rx_pin: u8) -> Self {
        Self {
            config: TwaiConfig {
                bitrate: Bitrate::Kbps250,
                tx_pin,
                rx_pin,
                controller_id: 0,
                queue_depths: QueueDepths::new(0, 0),
                isr_in_iram: false,
                monitor_interval_ms: MONITOR_INTERVAL_MS,
                send_timeout_ms: CAN_SEND_TIMEOUT_MS,
                receive_poll_ms: CAN_RECEIVE_POLL_MS,
                recovery: RecoveryPolicy::UNLIMITED,
            },
        }
    }

    #[inline]
    pub const fn bitrate(mut self, bitrate: Bitrate) -> Self {
        self.config.bitrate = bitrate;
        self
    }

    #[inline]
    pub const fn controller_id(mut self, controller_id: u8) -> Self {
        self.config.controller_id = controller_id;
        self
    }

    /// Initial RX/TX queue depths. Zero keeps the default for that queue.
    #[inline]
    pub const fn queue_depths(mut self, rx: u16, tx: u16) -> Self {
        self.config.queue_depths = QueueDepths::new(rx, tx);
        self
    }

    #[inline]
    pub const fn isr_in_iram(mut self, value: bool) -> Self {
        self.config.isr_in_iram = value;
        self
    }

    #[inline]
    pub const fn monitor_interval_ms(mut self, millis: u32) -> Self {
        self.config.monitor_interval_ms = millis;
        self
    }

    #[inline]
    pub const fn send_timeout_ms(mut self, millis: u32) -> Self {
        self.config.send_timeout_ms = millis;
        self
    }

    #[inline]
    pub const fn receive_poll_ms(mut self, millis: u32) -> Self {
        self.config.receive_poll_ms = millis;
        self
    }

    #[inline]
    pub const fn recovery(mut self, policy: RecoveryPolicy) -> Self {
        self.config.recovery = policy;
        self
    }

    #[inline]
    pub const fn build(self) -> TwaiConfig {
        self.config
    }
}
