//! CONFIG packet bodies: handshake, address assignment, compression contexts.

extern crate alloc;
use alloc::vec::Vec;
use core::net::Ipv6Addr;

use crate::constants::{
    ADDR_PACKET_SIZE, CONF_HEADER_SIZE, CONTEXT_PACKET_SIZE, ConfType, MAX_PREFIX_LEN,
    MAXIMUM_CONTEXTS, PacketType, RESERVED, SYN_PACKET_SIZE,
};
use crate::error::PacketError;
use crate::packet::expect_type;

fn config_header(conftype: ConfType, capacity: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(capacity);
    buf.extend_from_slice(&[RESERVED, PacketType::Config as u8, 0, conftype as u8]);
    buf
}

fn expect_config(raw: &[u8], expected: ConfType, min: usize) -> Result<(), PacketError> {
    expect_type(raw, PacketType::Config, CONF_HEADER_SIZE)?;
    let actual = ConfType::from_u8(raw[3])?;
    if actual != expected {
        return Err(PacketError::UnexpectedConfType {
            expected: expected as u8,
            actual: actual as u8,
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

fn addr_at(raw: &[u8], offset: usize) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&raw[offset..offset + 16]);
    Ipv6Addr::from(octets)
}

/// Connection request sent by the host until the node answers with SYNACK.
///
/// Unlike every other packet the third byte is not a sequence number of this
/// packet but the first sequence number the host will use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynPacket {
    pub next_seq_num: u8,
    pub next_exp: u8,
    pub addr: Ipv6Addr,
}

impl SynPacket {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SYN_PACKET_SIZE);
        buf.extend_from_slice(&[
            RESERVED,
            PacketType::Config as u8,
            self.next_seq_num,
            ConfType::Syn as u8,
            self.next_exp,
        ]);
        buf.extend_from_slice(&self.addr.octets());
        buf
    }

    pub fn decode(raw: &[u8]) -> Result<Self, PacketError> {
        expect_config(raw, ConfType::Syn, SYN_PACKET_SIZE)?;
        Ok(Self {
            next_seq_num: raw[2],
            next_exp: raw[4],
            addr: addr_at(raw, 5),
        })
    }
}

/// Address assignment pushed to (or received from) the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrPacket {
    pub version: u16,
    pub addr: Ipv6Addr,
}

impl AddrPacket {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = config_header(ConfType::IpAddr, ADDR_PACKET_SIZE);
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(&self.addr.octets());
        buf
    }

    pub fn decode(raw: &[u8]) -> Result<Self, PacketError> {
        expect_config(raw, ConfType::IpAddr, ADDR_PACKET_SIZE)?;
        Ok(Self {
            version: u16::from_be_bytes([raw[4], raw[5]]),
            addr: addr_at(raw, 6),
        })
    }
}

/// A 6LoWPAN header-compression context as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextPacket {
    pub version: u16,
    pub cid: u8,
    pub prefix: Ipv6Addr,
    /// Prefix length in bits.
    pub len: u8,
    /// Whether the context may be used for compression.
    pub comp: bool,
    /// Remaining validity in minutes; zero withdraws the context.
    pub lifetime: u16,
}

impl ContextPacket {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = config_header(ConfType::Context, CONTEXT_PACKET_SIZE);
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.push(self.cid);
        buf.extend_from_slice(&self.prefix.octets());
        buf.push(self.len);
        buf.push(u8::from(self.comp));
        buf.extend_from_slice(&self.lifetime.to_be_bytes());
        buf
    }

    pub fn decode(raw: &[u8]) -> Result<Self, PacketError> {
        expect_config(raw, ConfType::Context, CONTEXT_PACKET_SIZE)?;
        let cid = raw[6];
        if cid as usize >= MAXIMUM_CONTEXTS {
            return Err(PacketError::InvalidContextId(cid));
        }
        let len = raw[23];
        if len > MAX_PREFIX_LEN {
            return Err(PacketError::InvalidPrefixLength(len));
        }
        Ok(Self {
            version: u16::from_be_bytes([raw[4], raw[5]]),
            cid,
            prefix: addr_at(raw, 7),
            len,
            comp: raw[24] != 0,
            lifetime: u16::from_be_bytes([raw[25], raw[26]]),
        })
    }
}
