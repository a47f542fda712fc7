//! Asynchronous timer abstraction providing the delays required by the
//! blocking send path, the bus health monitor, and bus-off recovery.

/// Timer trait abstraction. Takes `&self` because the monitor and the
/// sending context share one timer.
pub trait LinkTimer {
    /// Asynchronously wait for `millis` milliseconds.
    fn delay_ms(&self, millis: u32) -> impl core::future::Future<Output = ()> + '_;
}

/// [`LinkTimer`] backed by `embassy_time::Timer`.
///
/// ```ignore
/// use korri_n2k_twai::infra::twai::{config::TwaiConfig, link::TwaiLink};
/// use korri_n2k_twai::protocol::transport::traits::link_timer::EmbassyTimer;
///
/// let link = TwaiLink::new(driver, EmbassyTimer, TwaiConfig::builder(17, 18).build());
/// ```
#[cfg(feature = "embassy-timer")]
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyTimer;

#[cfg(feature = "embassy-timer")]
impl LinkTimer for EmbassyTimer {
    async fn delay_ms(&self, millis: u32) {
        embassy_time::Timer::after(embassy_time::Duration::from_millis(millis as u64)).await;
    }
}
