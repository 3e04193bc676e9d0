//! Error types for the border router.

use sixbridge_core::PacketError;
use sixbridge_interfaces::InterfaceError;
use sixbridge_protocol::{MuxError, WindowError};

/// Errors raised by the flow-control engine.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("handshake not answered after {attempts} SYN attempts")]
    HandshakeTimeout { attempts: u32 },
    #[error("peer unreachable: retransmission limit reached")]
    PeerUnreachable,
    #[error("link closed")]
    LinkClosed,
    #[error("window error: {0}")]
    Window(#[from] WindowError),
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
}

/// Errors that can occur while running the border router.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("interface error: {0}")]
    Interface(#[from] InterfaceError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("flow control error: {0}")]
    Flow(#[from] FlowError),
    #[error("multiplexer error: {0}")]
    Mux(#[from] MuxError),
    #[error("context id {0} out of range")]
    InvalidContextId(u8),
    #[error("no context cached for id {0}")]
    ContextNotFound(u8),
    #[error("router not started")]
    NotStarted,
    #[error("router already running")]
    AlreadyRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            FlowError::HandshakeTimeout { attempts: 3 }.to_string(),
            "handshake not answered after 3 SYN attempts"
        );
        assert_eq!(
            RouterError::ContextNotFound(4).to_string(),
            "no context cached for id 4"
        );
        let err: RouterError = FlowError::PeerUnreachable.into();
        assert!(err.to_string().contains("retransmission limit"));
    }

    #[test]
    fn window_error_converts() {
        let err: FlowError = WindowError::InvalidSize(3).into();
        assert!(matches!(err, FlowError::Window(WindowError::InvalidSize(3))));
    }
}
