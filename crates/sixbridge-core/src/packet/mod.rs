//! Packet wire formats for the border-router link.
//!
//! Every packet starts with a three byte common header:
//! `reserved(1) = 0x00 || type(1) || seq_num(1)`. L3 packets follow it with a
//! big-endian ethertype, CONFIG packets with a `conftype` byte and a
//! type-specific body (see [`config`]).

pub mod config;

extern crate alloc;
use alloc::vec::Vec;

use crate::constants::{
    CONF_HEADER_SIZE, ConfType, HEADER_SIZE, L3_HEADER_SIZE, LINK_MTU, PacketType, RESERVED,
};
use crate::error::PacketError;

/// The common header shared by all packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub packet_type: PacketType,
    pub seq_num: u8,
}

impl Header {
    pub fn new(packet_type: PacketType, seq_num: u8) -> Self {
        Self {
            packet_type,
            seq_num,
        }
    }

    /// Parse the common header from the front of a packet.
    pub fn parse(raw: &[u8]) -> Result<Self, PacketError> {
        if raw.len() < HEADER_SIZE {
            return Err(PacketError::TooShort {
                min: HEADER_SIZE,
                actual: raw.len(),
            });
        }
        if raw[0] != RESERVED {
            return Err(PacketError::NonZeroReserved(raw[0]));
        }
        Ok(Self {
            packet_type: PacketType::from_u8(raw[1])?,
            seq_num: raw[2],
        })
    }

    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        [RESERVED, self.packet_type as u8, self.seq_num]
    }
}

/// Overwrite the sequence number of an already encoded packet.
///
/// Packets are built with a placeholder sequence number; the flow control
/// engine stamps the real one when it takes a send slot.
pub fn set_seq_num(packet: &mut [u8], seq_num: u8) {
    if packet.len() >= HEADER_SIZE {
        packet[2] = seq_num;
    }
}

/// Build an acknowledgement for `seq_num`.
pub fn ack_packet(seq_num: u8) -> [u8; HEADER_SIZE] {
    Header::new(PacketType::Ack, seq_num).to_bytes()
}

/// Wrap diagnostic bytes in a RAW packet.
pub fn raw_packet(text: &[u8]) -> Result<Vec<u8>, PacketError> {
    if text.len() > LINK_MTU {
        return Err(PacketError::TooLong {
            max: LINK_MTU,
            actual: text.len(),
        });
    }
    let mut buf = Vec::with_capacity(HEADER_SIZE + text.len());
    buf.extend_from_slice(&Header::new(PacketType::Raw, 0).to_bytes());
    buf.extend_from_slice(text);
    Ok(buf)
}

/// Wrap a network-layer datagram in an L3 packet.
pub fn l3_packet(ethertype: u16, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
    if payload.len() > LINK_MTU {
        return Err(PacketError::TooLong {
            max: LINK_MTU,
            actual: payload.len(),
        });
    }
    let mut buf = Vec::with_capacity(L3_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&Header::new(PacketType::L3, 0).to_bytes());
    buf.extend_from_slice(&ethertype.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Split an L3 packet into its ethertype and datagram.
pub fn parse_l3(raw: &[u8]) -> Result<(u16, &[u8]), PacketError> {
    expect_type(raw, PacketType::L3, L3_HEADER_SIZE)?;
    let ethertype = u16::from_be_bytes([raw[3], raw[4]]);
    Ok((ethertype, &raw[L3_HEADER_SIZE..]))
}

/// Read the `conftype` of a CONFIG packet.
pub fn conf_type(raw: &[u8]) -> Result<ConfType, PacketError> {
    expect_type(raw, PacketType::Config, CONF_HEADER_SIZE)?;
    ConfType::from_u8(raw[3])
}

pub(crate) fn expect_type(raw: &[u8], expected: PacketType, min: usize) -> Result<(), PacketError> {
    let header = Header::parse(raw)?;
    if header.packet_type != expected {
        return Err(PacketError::UnexpectedPacketType {
            expected: expected as u8,
            actual: header.packet_type as u8,
        });
    }
    if raw.len() < min {
        return Err(PacketError::TooShort {
            min,
            actual: raw.len(),
        });
    }
    Ok(())
}
