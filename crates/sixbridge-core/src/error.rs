//! Error types for the sixbridge-core crate.

use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    TooShort { min: usize, actual: usize },
    TooLong { max: usize, actual: usize },
    NonZeroReserved(u8),
    InvalidPacketType(u8),
    InvalidConfType(u8),
    UnexpectedPacketType { expected: u8, actual: u8 },
    UnexpectedConfType { expected: u8, actual: u8 },
    UnsupportedEthertype(u16),
    InvalidContextId(u8),
    InvalidPrefixLength(u8),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::TooShort { min, actual } => {
                write!(
                    f,
                    "packet too short: need at least {min} bytes, got {actual}"
                )
            }
            PacketError::TooLong { max, actual } => {
                write!(f, "packet too long: at most {max} bytes, got {actual}")
            }
            PacketError::NonZeroReserved(v) => write!(f, "reserved byte is 0x{v:02x}"),
            PacketError::InvalidPacketType(v) => write!(f, "invalid packet type: {v}"),
            PacketError::InvalidConfType(v) => write!(f, "invalid configuration type: {v}"),
            PacketError::UnexpectedPacketType { expected, actual } => {
                write!(f, "unexpected packet type: expected {expected}, got {actual}")
            }
            PacketError::UnexpectedConfType { expected, actual } => {
                write!(
                    f,
                    "unexpected configuration type: expected {expected}, got {actual}"
                )
            }
            PacketError::UnsupportedEthertype(v) => write!(f, "unsupported ethertype: 0x{v:04x}"),
            PacketError::InvalidContextId(v) => write!(f, "invalid context id: {v}"),
            PacketError::InvalidPrefixLength(v) => write!(f, "invalid prefix length: {v}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PacketError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    MissingTerminator,
    IncompleteEscape,
    InvalidEscapeSequence(u8),
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingError::MissingTerminator => write!(f, "missing frame terminator"),
            FramingError::IncompleteEscape => write!(f, "incomplete escape sequence"),
            FramingError::InvalidEscapeSequence(v) => {
                write!(f, "invalid escape sequence: 0x{v:02x}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FramingError {}
