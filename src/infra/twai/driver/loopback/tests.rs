//! Loopback controller tests: lifecycle rules, queue bounds, fault injection.
use super::*;
use crate::infra::twai::config::{build_config, Bitrate};

fn config(rx: u16, tx: u16) -> ControllerConfig {
    build_config(Bitrate::Kbps250, 17, 18, 0, rx, tx)
}

fn running(rx: u16, tx: u16) -> LoopbackTwai<16> {
    let driver = LoopbackTwai::<16>::new();
    driver.install(&config(rx, tx)).unwrap();
    driver.start().unwrap();
    driver
}

#[test]
/// Install/start/stop/uninstall enforce the driver lifecycle order.
fn test_lifecycle_order() {
    let driver = LoopbackTwai::<16>::new();
    assert_eq!(driver.start(), Err(DriverError::InvalidState));
    assert_eq!(driver.status(), Err(DriverError::InvalidState));

    driver.install(&config(4, 4)).unwrap();
    assert_eq!(driver.install(&config(4, 4)), Err(DriverError::InvalidState));
    driver.start().unwrap();
    assert_eq!(driver.uninstall(), Err(DriverError::InvalidState));
    driver.stop().unwrap();
    assert_eq!(driver.stop(), Err(DriverError::InvalidState));
    driver.uninstall().unwrap();

    let stats = driver.stats();
    assert_eq!(stats.installs, 1);
    assert_eq!(stats.starts, 1);
    assert_eq!(stats.stops, 1);
    assert_eq!(stats.uninstalls, 1);
    assert!(driver.installed_config().is_none());
}

#[test]
/// Transmitted frames come back through the RX queue unchanged.
fn test_self_reception() {
    let driver = running(4, 4);
    let frame = CanFrame::with_payload(0x09F8_0142, &[1, 2, 3]);
    driver.transmit(&frame).unwrap();
    assert_eq!(driver.receive(), Ok(frame));
    assert_eq!(driver.receive(), Err(nb::Error::WouldBlock));
    assert_eq!(driver.stats().frames_sent, 1);
}

#[test]
/// With nobody reading, RX then TX fill up and the next enqueue would block.
fn test_queue_bounds() {
    let driver = running(3, 2);
    let frame = CanFrame::with_payload(0x09F8_0142, &[0xAA]);
    for _ in 0..5 {
        driver.transmit(&frame).unwrap();
    }
    assert_eq!(driver.rx_pending(), 3);
    assert_eq!(driver.tx_pending(), 2);
    assert_eq!(driver.transmit(&frame), Err(nb::Error::WouldBlock));

    // Reading one frame lets a pending transmission through.
    driver.receive().unwrap();
    assert_eq!(driver.rx_pending(), 3);
    assert_eq!(driver.tx_pending(), 1);
    driver.transmit(&frame).unwrap();
}

#[test]
/// Depths larger than the backing storage are clamped.
fn test_depths_clamped_to_capacity() {
    let driver = running(50, 40);
    assert_eq!(driver.queue_depths(), QueueDepths::new(16, 16));
}

#[test]
/// Bus-off refuses transmissions, drops the TX queue, and is cleared by reinstall.
fn test_bus_off_and_reinstall() {
    let driver = running(1, 4);
    let frame = CanFrame::with_payload(0x09F8_0142, &[7]);
    driver.transmit(&frame).unwrap();
    driver.transmit(&frame).unwrap();
    assert_eq!(driver.tx_pending(), 1);

    driver.trigger_bus_off();
    assert_eq!(driver.status().unwrap().state, BusState::BusOff);
    assert_eq!(driver.tx_pending(), 0);
    assert_eq!(
        driver.transmit(&frame),
        Err(nb::Error::Other(DriverError::BusOff))
    );

    driver.stop().unwrap();
    driver.uninstall().unwrap();
    driver.install(&config(1, 4)).unwrap();
    driver.start().unwrap();
    assert_eq!(driver.status().unwrap(), BusStatus::default());
    assert_eq!(driver.rx_pending(), 0);
    driver.transmit(&frame).unwrap();
}

#[test]
/// A persistent fault puts every fresh install straight into bus-off.
fn test_persistent_bus_off() {
    let driver = running(4, 4);
    driver.set_persistent_bus_off(true);
    assert_eq!(driver.status().unwrap().state, BusState::BusOff);

    driver.stop().unwrap();
    driver.uninstall().unwrap();
    driver.install(&config(4, 4)).unwrap();
    assert_eq!(driver.status().unwrap().state, BusState::BusOff);

    driver.set_persistent_bus_off(false);
    driver.uninstall().unwrap();
    driver.install(&config(4, 4)).unwrap();
    assert_eq!(driver.status().unwrap().state, BusState::Active);
}

#[test]
/// Error counters drive the reported state across the 127 boundary.
fn test_error_counters() {
    let driver = running(4, 4);
    driver.set_error_counters(127, 10);
    assert_eq!(driver.status().unwrap().state, BusState::Active);
    driver.set_error_counters(128, 10);
    let status = driver.status().unwrap();
    assert_eq!(status.state, BusState::ErrorPassive);
    assert_eq!(status.tx_error_counter, 128);
    assert_eq!(status.rx_error_counter, 10);
}

#[test]
/// Injected failures surface from install and start.
fn test_injected_failures() {
    let driver = LoopbackTwai::<16>::new();
    driver.fail_install(true);
    assert_eq!(driver.install(&config(4, 4)), Err(DriverError::InstallFailed));
    driver.fail_install(false);
    driver.install(&config(4, 4)).unwrap();
    driver.fail_start(true);
    assert_eq!(driver.start(), Err(DriverError::StartFailed));
    assert!(!driver.is_started());
}

#[test]
/// Remote traffic is only accepted while running and within the RX depth.
fn test_inject() {
    let driver = LoopbackTwai::<16>::new();
    let frame = CanFrame::with_payload(0x0DF1_0B23, &[0x11; 8]);
    assert!(!driver.inject(frame));

    driver.install(&config(1, 1)).unwrap();
    driver.start().unwrap();
    assert!(driver.inject(frame));
    assert!(!driver.inject(frame));
    assert_eq!(driver.receive(), Ok(frame));
}
