//! Protocol error types.

use sixbridge_core::error::PacketError;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("invalid window size {0}: must be a power of two between 1 and {max}", max = crate::window::MAX_WINDOW)]
    InvalidSize(u8),

    #[error("send window full: {outstanding} frames unacknowledged")]
    Full { outstanding: u8 },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MuxError {
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("not an IPv6 datagram (version {0})")]
    NotIpv6(u8),

    #[error("truncated datagram: header declares {declared} bytes, got {actual}")]
    TruncatedDatagram { declared: usize, actual: usize },

    #[error("acknowledgement reached the demultiplexer")]
    UnexpectedAck,

    #[error("unexpected configuration packet: {0}")]
    UnexpectedConfig(&'static str),
}
