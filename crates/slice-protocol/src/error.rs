//! Error types for the wire codecs

use thiserror::Error;

/// Errors produced while decoding a single frame or command
#[derive(Debug, Error)]
pub enum ParseError {
    /// Frame is shorter than its fixed header or a declared length
    #[error("truncated frame: needed {needed} more bytes at offset {offset}")]
    Truncated {
        /// Byte offset at which the reader ran out of data
        offset: usize,
        /// Additional bytes required to finish the read
        needed: usize,
    },

    /// Magic number did not match the expected protocol constant
    #[error("bad magic: expected {expected:#010x}, got {got:#010x}")]
    BadMagic {
        /// Magic value the protocol requires
        expected: u32,
        /// Magic value found on the wire
        got: u32,
    },

    /// A declared length field is outside the allowed range
    #[error("invalid length field: {0}")]
    InvalidLength(u32),

    /// A numeric field could not be parsed
    #[error("invalid number: {0}")]
    InvalidNumber(String),

    /// A frequency field could not be parsed
    #[error("invalid frequency: {0}")]
    InvalidFrequency(String),

    /// Generic malformed frame
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Errors spanning more than one frame (session-level protocol faults)
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Underlying frame could not be decoded
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The peer violated the framing rules for its dialect
    #[error("framing violation: {0}")]
    Framing(String),
}
