//! Classifying packets delivered by the receive window.

use sixbridge_core::constants::{ConfType, ETHERTYPE_IPV6, HEADER_SIZE, PacketType};
use sixbridge_core::error::PacketError;
use sixbridge_core::packet::{conf_type, parse_l3};
use sixbridge_core::{AddrPacket, ContextPacket, Header};

use crate::error::MuxError;

/// A demultiplexed inbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Human-readable text from the node.
    Diagnostic(String),
    /// An IPv6 datagram for the TUN device.
    Ipv6(Vec<u8>),
    /// The node accepted our connection request.
    SynAck,
    /// A compression context pushed by the node.
    Context(ContextPacket),
    /// An address the node asks us to configure.
    Address(AddrPacket),
}

/// Classify a packet by its type and configuration sub-type.
pub fn demultiplex(packet: &[u8]) -> Result<Inbound, MuxError> {
    let header = Header::parse(packet)?;
    match header.packet_type {
        PacketType::Raw => {
            let text = String::from_utf8_lossy(&packet[HEADER_SIZE..]);
            let text = text.trim_end_matches(['\0', '\r', '\n']);
            Ok(Inbound::Diagnostic(text.to_string()))
        }
        PacketType::L3 => {
            let (ethertype, datagram) = parse_l3(packet)?;
            if ethertype != ETHERTYPE_IPV6 {
                return Err(PacketError::UnsupportedEthertype(ethertype).into());
            }
            Ok(Inbound::Ipv6(datagram.to_vec()))
        }
        PacketType::Config => match conf_type(packet)? {
            ConfType::SynAck => Ok(Inbound::SynAck),
            ConfType::Context => Ok(Inbound::Context(ContextPacket::decode(packet)?)),
            ConfType::IpAddr => Ok(Inbound::Address(AddrPacket::decode(packet)?)),
            ConfType::Syn => Err(MuxError::UnexpectedConfig("SYN")),
        },
        PacketType::Ack => Err(MuxError::UnexpectedAck),
    }
}
