/// Test doubles and helpers shared by the link integration tests.
use korri_n2k_twai::infra::twai::{
    config::TwaiConfig,
    driver::loopback::LoopbackTwai,
    link::TwaiLink,
    recovery::RecoveryPolicy,
};
use korri_n2k_twai::protocol::transport::traits::link_timer::LinkTimer;
use tokio::time::{sleep, Duration, Instant};

/// Loopback controller with enough room for the default 50/40 queue depths.
#[allow(dead_code)]
pub type TestDriver = LoopbackTwai<64>;

#[allow(dead_code)]
pub type TestLink = TwaiLink<TestDriver, MockTimer>;

/// Monitor interval used by the tests (ms).
#[allow(dead_code)]
pub const MONITOR_INTERVAL_MS: u32 = 20;

/// Restart delay used by the tests (ms).
#[allow(dead_code)]
pub const RESTART_DELAY_MS: u32 = 60;

#[derive(Clone, Copy)]
#[allow(dead_code)]
/// Timer based on `tokio::time::sleep` to drive delays in tests.
pub struct MockTimer;

impl LinkTimer for MockTimer {
    async fn delay_ms(&self, millis: u32) {
        sleep(Duration::from_millis(millis as u64)).await;
    }
}

#[allow(dead_code)]
/// Configuration with shortened monitor and recovery timings.
pub fn fast_config() -> TwaiConfig {
    TwaiConfig::builder(17, 18)
        .isr_in_iram(true)
        .monitor_interval_ms(MONITOR_INTERVAL_MS)
        .receive_poll_ms(2)
        .recovery(RecoveryPolicy::UNLIMITED.with_restart_delay_ms(RESTART_DELAY_MS))
        .build()
}

#[allow(dead_code)]
/// Closed link over a fresh loopback controller.
pub fn new_link(config: TwaiConfig) -> TestLink {
    TwaiLink::new(TestDriver::new(), MockTimer, config)
}

#[allow(dead_code)]
/// Poll `condition` every 2 ms; panic with `what` after `timeout_ms`.
pub async fn wait_until(what: &str, timeout_ms: u64, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while !condition() {
        if Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        sleep(Duration::from_millis(2)).await;
    }
}
