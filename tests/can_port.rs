//! `CanBus` view of the link, as consumed by the NMEA 2000 stack.
mod helpers;

use helpers::{fast_config, new_link, wait_until, RESTART_DELAY_MS};
use korri_n2k_twai::error::LinkError;
use korri_n2k_twai::infra::twai::recovery::{RecoveryOutcome, RecoveryState};
use korri_n2k_twai::protocol::transport::{can_frame::CanFrame, traits::can_bus::CanBus};
use tokio::time::{sleep, timeout, Duration, Instant};

/// ISO address claim from source address 0x23.
const ADDRESS_CLAIM_ID: u32 = 0x18EE_FF23;

#[tokio::test]
async fn send_then_recv_through_port() {
    let link = new_link(fast_config());
    link.open();
    let mut port = link.port();

    let name = [0x01, 0x00, 0xC0, 0x0C, 0x00, 0x82, 0xA0, 0xC0];
    let claim = CanFrame::with_payload(ADDRESS_CLAIM_ID, &name);
    port.send(&claim).await.expect("claim queued");

    let echoed = port.recv().await.expect("claim looped back");
    assert_eq!(echoed, claim);
    assert_eq!(echoed.id.source_address(), 0x23);
}

#[tokio::test]
async fn recv_waits_for_remote_traffic() {
    let link = new_link(fast_config());
    link.open();
    let mut port = link.port();
    let remote = CanFrame::with_payload(0x09F8_0117, &[0x10, 0x20]);

    let (received, _) = tokio::join!(port.recv(), async {
        sleep(Duration::from_millis(15)).await;
        assert!(link.driver().inject(remote));
    });
    assert_eq!(received.expect("remote frame"), remote);
}

#[tokio::test]
async fn port_on_closed_link_fails_fast() {
    let link = new_link(fast_config());
    let mut port = link.port();

    let frame = CanFrame::with_payload(ADDRESS_CLAIM_ID, &[0]);
    assert!(matches!(port.send(&frame).await, Err(LinkError::NotOpen)));

    let result = timeout(Duration::from_millis(50), port.recv()).await;
    assert!(matches!(result, Ok(Err(LinkError::NotOpen))));
}

#[tokio::test]
async fn send_refused_while_recovering() {
    let link = new_link(fast_config());
    link.open();
    link.driver().trigger_bus_off();

    let (outcome, _) = tokio::join!(link.recover(), async {
        wait_until("recovery pause", 200, || {
            link.recovery_state() == RecoveryState::Stopped
        })
        .await;
        let mut port = link.port();
        let frame = CanFrame::with_payload(ADDRESS_CLAIM_ID, &[0]);
        assert!(matches!(port.send(&frame).await, Err(LinkError::Recovering)));
    });
    assert_eq!(outcome, RecoveryOutcome::Recovered);
}

#[tokio::test]
async fn recv_waits_out_a_recovery() {
    let link = new_link(fast_config());
    link.open();
    link.driver().trigger_bus_off();
    let remote = CanFrame::with_payload(0x09F1_1223, &[0xAA]);

    let started = Instant::now();
    let (outcome, received) = tokio::join!(link.recover(), async {
        let mut port = link.port();
        let receiving = port.recv();
        let feeder = async {
            wait_until("recovery end", 500, || link.recovery_count() == 1).await;
            assert!(link.driver().inject(remote));
        };
        let (received, _) = tokio::join!(receiving, feeder);
        received
    });

    assert_eq!(outcome, RecoveryOutcome::Recovered);
    assert_eq!(received.expect("frame after recovery"), remote);
    assert!(started.elapsed() >= Duration::from_millis(RESTART_DELAY_MS as u64));
}
