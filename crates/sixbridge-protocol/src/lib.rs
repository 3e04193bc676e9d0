//! Protocol state machines for the 6LoWPAN serial bridge.
//!
//! This crate implements the sliding-window flow control that gives the serial
//! link reliable, in-order delivery, and the multiplexer that tags payloads
//! with their packet type. Nothing here performs I/O: state machines return the
//! bytes to transmit and the packets to deliver.

pub mod error;
pub mod mux;
pub mod window;

pub use error::{MuxError, WindowError};
pub use mux::Inbound;
pub use window::SlidingWindow;
