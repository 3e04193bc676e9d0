//! Typed send helpers over the flow-controlled link.

use std::net::Ipv6Addr;
use std::sync::Arc;

use sixbridge_core::ContextPacket;
use sixbridge_protocol::mux::{wrap_addr, wrap_context, wrap_ipv6};

use crate::error::RouterError;
use crate::link::FlowControl;

/// Wraps payloads with their packet header and hands them to the link.
#[derive(Clone)]
pub struct Multiplexer {
    flow: Arc<FlowControl>,
}

impl Multiplexer {
    pub fn new(flow: Arc<FlowControl>) -> Self {
        Self { flow }
    }

    /// Send an IPv6 datagram. Returns the sequence number it went out under.
    pub async fn send_ipv6(&self, datagram: &[u8]) -> Result<u8, RouterError> {
        let packet = wrap_ipv6(datagram)?;
        Ok(self.flow.send(packet).await?)
    }

    /// Push a compression context record to the node.
    pub async fn send_context(&self, context: &ContextPacket) -> Result<u8, RouterError> {
        Ok(self.flow.send(wrap_context(context)).await?)
    }

    /// Push an address assignment to the node.
    pub async fn send_addr(&self, version: u16, addr: Ipv6Addr) -> Result<u8, RouterError> {
        Ok(self.flow.send(wrap_addr(version, addr)).await?)
    }
}
