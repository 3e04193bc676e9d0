//! Wire constants and packet discriminators for the border-router link.

use crate::error::PacketError;

/// Largest IPv6 datagram carried over the serial link.
pub const LINK_MTU: usize = 1280;

/// `reserved(1) + type(1) + seq_num(1)`.
pub const HEADER_SIZE: usize = 3;
/// Common header + `ethertype(2)`.
pub const L3_HEADER_SIZE: usize = HEADER_SIZE + 2;
/// Common header + `conftype(1)`.
pub const CONF_HEADER_SIZE: usize = HEADER_SIZE + 1;

/// Upper bound on the size of any packet on the link, before SLIP escaping.
pub const BUFFER_SIZE: usize = L3_HEADER_SIZE + LINK_MTU;

/// `reserved, type, next_seq_num, conftype, next_exp, addr(16)`.
pub const SYN_PACKET_SIZE: usize = CONF_HEADER_SIZE + 1 + 16;
/// Config header + `version(2)` + `addr(16)`.
pub const ADDR_PACKET_SIZE: usize = CONF_HEADER_SIZE + 2 + 16;
/// Config header + `version(2), cid(1), prefix(16), len(1), comp(1), lifetime(2)`.
pub const CONTEXT_PACKET_SIZE: usize = CONF_HEADER_SIZE + 2 + 1 + 16 + 1 + 1 + 2;

/// Number of 6LoWPAN compression contexts a node can hold.
pub const MAXIMUM_CONTEXTS: usize = 16;

/// Longest prefix a compression context may carry, in bits.
pub const MAX_PREFIX_LEN: u8 = 128;

pub const ETHERTYPE_IPV6: u16 = 0x86DD;

pub const IPV6_HEADER_SIZE: usize = 40;

/// Value of the leading reserved byte on every protocol packet.
///
/// Anything on the serial line that starts with a different byte is
/// diagnostic text from the node.
pub const RESERVED: u8 = 0x00;

/// Packet type carried in the second header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Raw = 0,
    Ack = 1,
    Config = 2,
    L3 = 3,
}

impl PacketType {
    pub fn from_u8(v: u8) -> Result<Self, PacketError> {
        match v {
            0 => Ok(PacketType::Raw),
            1 => Ok(PacketType::Ack),
            2 => Ok(PacketType::Config),
            3 => Ok(PacketType::L3),
            _ => Err(PacketError::InvalidPacketType(v)),
        }
    }
}

/// Configuration sub-type carried after the common header of CONFIG packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConfType {
    Syn = 0,
    SynAck = 1,
    Context = 2,
    IpAddr = 3,
}

impl ConfType {
    pub fn from_u8(v: u8) -> Result<Self, PacketError> {
        match v {
            0 => Ok(ConfType::Syn),
            1 => Ok(ConfType::SynAck),
            2 => Ok(ConfType::Context),
            3 => Ok(ConfType::IpAddr),
            _ => Err(PacketError::InvalidConfType(v)),
        }
    }
}
