//! Core types, constants, and wire formats for the 6LoWPAN serial bridge.
//!
//! This crate defines the packet wire formats exchanged between the host border
//! router and the LoWPAN node, the SLIP framing used on the serial line, and the
//! RFC 1982 serial-number arithmetic that keeps sequence numbers wrap-safe.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod constants;
pub mod error;
pub mod framing;
pub mod packet;
pub mod serial;

pub use constants::{ConfType, PacketType};
pub use error::{FramingError, PacketError};
pub use packet::config::{AddrPacket, ContextPacket, SynPacket};
pub use packet::Header;
pub use serial::{SerialNumber, SerialOrdering, in_window, serial_add, serial_compare};
