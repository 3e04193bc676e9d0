//! Packet-type multiplexing over the flow-controlled link.
//!
//! Outbound payloads are wrapped with the header for their type before they
//! enter the send window; inbound packets released by the receive window are
//! classified into [`Inbound`] values for the router to act on.

pub mod inbound;
pub mod outbound;

pub use inbound::{Inbound, demultiplex};
pub use outbound::{wrap_addr, wrap_context, wrap_ipv6, wrap_raw};
