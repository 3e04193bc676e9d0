//! Streaming SLIP decoder for the serial line.
//!
//! The node shares one UART between protocol packets and human-readable log
//! output. Protocol packets always begin with the reserved zero byte; a frame
//! whose first byte is anything else is a text line terminated by `\n`.
//!
//! - Packet mode: unescaped END terminates, ESC + ESC_END / ESC + ESC_ESC
//!   decode to END / ESC.
//! - Text mode: bytes are copied verbatim up to the newline.
//! - A frame that would exceed the buffer is emitted truncated, and the rest
//!   of it is skipped up to its terminator.

use sixbridge_core::constants::{BUFFER_SIZE, RESERVED};
use sixbridge_core::framing::slip::{END, ESC, ESC_END, ESC_ESC};

/// A complete unit read from the serial line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialFrame {
    /// A protocol packet, unescaped, starting with the reserved byte.
    Packet(Vec<u8>),
    /// A diagnostic line printed by the node, without its line ending.
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Between frames.
    Idle,
    Packet,
    Text,
    /// Dropping the remainder of a truncated frame up to `terminator`.
    Skip { terminator: u8 },
}

/// Stateful decoder that turns serial chunks into [`SerialFrame`]s.
pub struct SlipDecoder {
    buffer: Vec<u8>,
    max_len: usize,
    mode: Mode,
    escaped: bool,
}

impl SlipDecoder {
    pub fn new() -> Self {
        Self::with_max_len(BUFFER_SIZE)
    }

    /// A decoder that never buffers more than `max_len` bytes of one frame.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_len),
            max_len,
            mode: Mode::Idle,
            escaped: false,
        }
    }

    /// Feed bytes read from the line and collect every frame they complete.
    pub fn feed(&mut self, data: &[u8]) -> Vec<SerialFrame> {
        let mut frames = Vec::new();
        for &byte in data {
            if let Some(frame) = self.push(byte) {
                frames.push(frame);
            }
        }
        frames
    }

    fn push(&mut self, byte: u8) -> Option<SerialFrame> {
        match self.mode {
            Mode::Idle => match byte {
                // Empty frame, usually a line flush before a packet.
                END => None,
                RESERVED => {
                    self.mode = Mode::Packet;
                    self.store(byte)
                }
                _ => {
                    self.mode = Mode::Text;
                    self.push_text(byte)
                }
            },
            Mode::Packet => self.push_packet(byte),
            Mode::Text => self.push_text(byte),
            Mode::Skip { terminator } => {
                if byte == terminator {
                    self.mode = Mode::Idle;
                }
                None
            }
        }
    }

    fn push_packet(&mut self, byte: u8) -> Option<SerialFrame> {
        if self.escaped {
            self.escaped = false;
            return match byte {
                ESC_END => self.store(END),
                ESC_ESC => self.store(ESC),
                other => {
                    tracing::debug!("slip: dropping invalid escape 0x{other:02x}");
                    None
                }
            };
        }
        match byte {
            END => Some(self.finish()),
            ESC => {
                self.escaped = true;
                None
            }
            _ => self.store(byte),
        }
    }

    fn push_text(&mut self, byte: u8) -> Option<SerialFrame> {
        if byte == b'\n' {
            return Some(self.finish());
        }
        self.store(byte)
    }

    /// Append a decoded byte, truncating the frame when the buffer is full.
    fn store(&mut self, byte: u8) -> Option<SerialFrame> {
        if self.buffer.len() < self.max_len {
            self.buffer.push(byte);
            return None;
        }
        let terminator = if self.mode == Mode::Text { b'\n' } else { END };
        tracing::warn!(
            max_len = self.max_len,
            "slip: frame exceeds buffer, truncating"
        );
        let frame = self.finish();
        self.mode = Mode::Skip { terminator };
        Some(frame)
    }

    fn finish(&mut self) -> SerialFrame {
        let bytes = std::mem::take(&mut self.buffer);
        let frame = match self.mode {
            Mode::Text => {
                let line = String::from_utf8_lossy(&bytes);
                SerialFrame::Text(line.trim_end_matches('\r').to_string())
            }
            _ => SerialFrame::Packet(bytes),
        };
        self.mode = Mode::Idle;
        self.escaped = false;
        frame
    }
}

impl Default for SlipDecoder {
    fn default() -> Self {
        Self::new()
    }
}
