//! Wrapping payloads for transmission.

use std::net::Ipv6Addr;

use sixbridge_core::constants::{ETHERTYPE_IPV6, IPV6_HEADER_SIZE};
use sixbridge_core::packet::{l3_packet, raw_packet};
use sixbridge_core::{AddrPacket, ContextPacket};

use crate::error::MuxError;

/// Wrap an IPv6 datagram in an L3 packet.
///
/// The datagram length is taken from the IPv6 payload-length field, so
/// trailing bytes beyond it (padding from the TUN read) are not sent.
pub fn wrap_ipv6(datagram: &[u8]) -> Result<Vec<u8>, MuxError> {
    if datagram.len() < IPV6_HEADER_SIZE {
        return Err(MuxError::TruncatedDatagram {
            declared: IPV6_HEADER_SIZE,
            actual: datagram.len(),
        });
    }
    let version = datagram[0] >> 4;
    if version != 6 {
        return Err(MuxError::NotIpv6(version));
    }

    let payload_len = u16::from_be_bytes([datagram[4], datagram[5]]) as usize;
    let total = IPV6_HEADER_SIZE + payload_len;
    if datagram.len() < total {
        return Err(MuxError::TruncatedDatagram {
            declared: total,
            actual: datagram.len(),
        });
    }

    let packet = l3_packet(ETHERTYPE_IPV6, &datagram[..total])?;
    tracing::trace!(len = total, "mux: wrapped IPv6 datagram");
    Ok(packet)
}

/// Wrap a compression context update.
pub fn wrap_context(context: &ContextPacket) -> Vec<u8> {
    tracing::trace!(
        cid = context.cid,
        version = context.version,
        lifetime = context.lifetime,
        "mux: wrapped context"
    );
    context.encode()
}

/// Wrap an address assignment.
pub fn wrap_addr(version: u16, addr: Ipv6Addr) -> Vec<u8> {
    tracing::trace!(version, %addr, "mux: wrapped address");
    AddrPacket { version, addr }.encode()
}

/// Wrap diagnostic text.
pub fn wrap_raw(text: &str) -> Result<Vec<u8>, MuxError> {
    Ok(raw_packet(text.as_bytes())?)
}
