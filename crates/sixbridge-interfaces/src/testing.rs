//! Generic conformance assertions for [`Interface`] implementations.
//!
//! ```rust,ignore
//! use sixbridge_interfaces::testing;
//!
//! let iface = SerialInterface::new(config, reader, writer);
//! testing::assert_pre_start_conformance(&iface).await;
//! iface.start().await?;
//! testing::assert_stop_conformance(&iface).await;
//! ```

use crate::error::InterfaceError;
use crate::traits::Interface;

/// Assert that the interface has a non-empty name.
pub fn assert_has_name(iface: &impl Interface) {
    assert!(!iface.name().is_empty(), "interface name must not be empty");
}

/// Assert that the interface reports `is_connected() == false` before `start()`.
pub fn assert_not_connected_before_start(iface: &impl Interface) {
    assert!(
        !iface.is_connected(),
        "interface should not be connected before start()"
    );
}

/// Assert that the interface can carry a full IPv6 minimum-MTU datagram.
pub fn assert_mtu_fits_ipv6(iface: &impl Interface) {
    assert!(iface.mtu() >= 1280, "MTU below the IPv6 minimum");
}

/// Assert that transmitting before `start()` returns an error.
pub async fn assert_transmit_before_start_fails(iface: &impl Interface) {
    let result = iface.transmit(&[0x00, 0x00, 0x00]).await;
    assert!(result.is_err(), "transmit should fail before start()");
}

/// Assert that the transmit error before `start()` is `NotConnected`.
pub async fn assert_transmit_error_is_expected(iface: &impl Interface) {
    match iface.transmit(&[0x00, 0x00, 0x00]).await {
        Err(InterfaceError::NotConnected) => {}
        Err(e) => panic!("unexpected error variant from transmit before start: {e}"),
        Ok(()) => panic!("transmit should fail before start()"),
    }
}

/// Assert that `stop()` succeeds and `is_connected()` becomes false afterward.
pub async fn assert_stop_is_clean(iface: &impl Interface) {
    let result = iface.stop().await;
    assert!(result.is_ok(), "stop() should succeed: {:?}", result.err());
    assert!(
        !iface.is_connected(),
        "is_connected() should be false after stop()"
    );
}

/// Assert that calling `stop()` a second time does not error or panic.
pub async fn assert_double_stop_is_idempotent(iface: &impl Interface) {
    let _ = iface.stop().await;
    let result = iface.stop().await;
    assert!(
        result.is_ok(),
        "second stop() should be idempotent: {:?}",
        result.err()
    );
}

/// Run all pre-start conformance checks on an interface.
pub async fn assert_pre_start_conformance(iface: &impl Interface) {
    assert_has_name(iface);
    assert_mtu_fits_ipv6(iface);
    assert_not_connected_before_start(iface);
    assert_transmit_before_start_fails(iface).await;
}

/// Run all stop-related conformance checks on an interface.
pub async fn assert_stop_conformance(iface: &impl Interface) {
    assert_stop_is_clean(iface).await;
    assert_double_stop_is_idempotent(iface).await;
}
