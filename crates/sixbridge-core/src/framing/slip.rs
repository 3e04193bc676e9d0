//! SLIP byte-stuffing framing (RFC 1055).
//!
//! Packets on the serial line are escaped and terminated by a single END byte.
//! The streaming decoder used on live links lives in `sixbridge-interfaces`;
//! this module holds the encoder and a strict whole-frame decoder.

extern crate alloc;
use alloc::vec::Vec;

use crate::error::FramingError;

pub const END: u8 = 0xC0;
pub const ESC: u8 = 0xDB;
pub const ESC_END: u8 = 0xDC;
pub const ESC_ESC: u8 = 0xDD;

/// Escape special bytes in data using SLIP byte-stuffing.
///
/// Replaces END (0xC0) with ESC + ESC_END, and ESC (0xDB) with ESC + ESC_ESC.
pub fn slip_escape(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    for &byte in data {
        match byte {
            END => {
                result.push(ESC);
                result.push(ESC_END);
            }
            ESC => {
                result.push(ESC);
                result.push(ESC_ESC);
            }
            _ => result.push(byte),
        }
    }
    result
}

/// Frame data for the wire: escape(data) + END.
pub fn slip_encode(data: &[u8]) -> Vec<u8> {
    let mut framed = slip_escape(data);
    framed.push(END);
    framed
}

/// Decode one SLIP frame.
///
/// Decoding stops at the first unescaped END; anything after it is ignored.
pub fn slip_decode(framed: &[u8]) -> Result<Vec<u8>, FramingError> {
    let mut result = Vec::with_capacity(framed.len());
    let mut bytes = framed.iter();
    while let Some(&byte) = bytes.next() {
        match byte {
            END => return Ok(result),
            ESC => match bytes.next() {
                Some(&ESC_END) => result.push(END),
                Some(&ESC_ESC) => result.push(ESC),
                Some(&other) => return Err(FramingError::InvalidEscapeSequence(other)),
                None => return Err(FramingError::IncompleteEscape),
            },
            _ => result.push(byte),
        }
    }
    Err(FramingError::MissingTerminator)
}
