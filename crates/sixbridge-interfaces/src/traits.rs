//! Core interface traits.

use std::net::Ipv6Addr;

use sixbridge_core::constants::LINK_MTU;

use crate::error::InterfaceError;

/// Async trait implemented by the serial link and the TUN device.
///
/// Protocol state machines produce `Vec<u8>` packets rather than performing I/O
/// directly; implementations bridge that to the device.
pub trait Interface: Send + Sync {
    // -- Identity --

    /// Human-readable name (e.g. "serial[/dev/ttyUSB0]" or the TUN ifname).
    fn name(&self) -> &str;

    // -- Capabilities --

    /// Maximum transmission unit. Defaults to the IPv6 minimum link MTU.
    fn mtu(&self) -> usize {
        LINK_MTU
    }

    /// Whether the interface is currently open and operational.
    fn is_connected(&self) -> bool;

    // -- Async I/O --

    /// Open the device and spawn its read loop.
    fn start(&self) -> impl Future<Output = Result<(), InterfaceError>> + Send;

    /// Stop the read loop and release resources. Calling it twice is harmless.
    fn stop(&self) -> impl Future<Output = Result<(), InterfaceError>> + Send;

    /// Transmit one packet.
    fn transmit(&self, data: &[u8]) -> impl Future<Output = Result<(), InterfaceError>> + Send;

    /// Receive the next packet. Returns [`InterfaceError::Stopped`] once the
    /// read loop has ended and every buffered packet has been drained.
    fn receive(&self) -> impl Future<Output = Result<Vec<u8>, InterfaceError>> + Send;
}

/// A host-facing IPv6 device that can be given addresses.
pub trait TunDevice: Interface {
    /// Assign `addr/prefix_len` to the device.
    fn add_address(
        &self,
        addr: Ipv6Addr,
        prefix_len: u8,
    ) -> impl Future<Output = Result<(), InterfaceError>> + Send;

    /// Bring the link up.
    fn set_up(&self) -> impl Future<Output = Result<(), InterfaceError>> + Send;
}
