//! Host-side I/O for the 6LoWPAN serial bridge.
//!
//! This crate provides the SLIP-framed serial link to the node, the TUN
//! device facing the host's IPv6 stack, and the `ip` commands used to
//! configure the TUN device.

pub mod error;
pub mod framing;
pub mod netconf;
pub mod serial;
pub mod testing;
pub mod traits;
pub mod tun;

pub use error::InterfaceError;
pub use framing::{SerialFrame, SlipDecoder};
pub use serial::{DeviceSerial, SerialConfig, SerialInterface};
pub use traits::{Interface, TunDevice};
pub use tun::{TunConfig, TunInterface};
