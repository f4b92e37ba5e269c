//! CAT dialect C: HRD v5 binary framing
//!
//! Little-endian frames wrapping the dialect-B command grammar:
//!
//! ```text
//! total_len:u32     (includes these four bytes)
//! magic1:u32 = 0x1234ABCD
//! magic2:u32 = 0xABCD1234
//! checksum:u32 = 0
//! command: null-terminated UTF-16LE
//! ```
//!
//! Responses echo the same framing and magics.

use crate::error::ParseError;

/// First frame magic
pub const MAGIC1: u32 = 0x1234_ABCD;

/// Second frame magic
pub const MAGIC2: u32 = 0xABCD_1234;

/// Fixed part of a frame: length + two magics + checksum
pub const HEADER_LEN: usize = 16;

/// Sanity cap on declared frame length
pub const MAX_FRAME_LEN: u32 = 65_535;

/// Try to pull one frame's command string out of `buf`
///
/// Returns `Ok(Some((command, consumed)))` when a whole frame is buffered,
/// `Ok(None)` when more bytes are needed.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(String, usize)>, ParseError> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let total_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if total_len < HEADER_LEN as u32 || total_len > MAX_FRAME_LEN {
        return Err(ParseError::InvalidLength(total_len));
    }
    let total_len = total_len as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    let magic1 = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let magic2 = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    if magic1 != MAGIC1 {
        return Err(ParseError::BadMagic { expected: MAGIC1, got: magic1 });
    }
    if magic2 != MAGIC2 {
        return Err(ParseError::BadMagic { expected: MAGIC2, got: magic2 });
    }
    // Checksum at 12..16 is always written as zero and never verified.

    let payload = &buf[HEADER_LEN..total_len];
    let mut units = Vec::with_capacity(payload.len() / 2);
    for pair in payload.chunks_exact(2) {
        let unit = u16::from_le_bytes([pair[0], pair[1]]);
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    Ok(Some((String::from_utf16_lossy(&units), total_len)))
}

/// Wrap a response string in a v5 frame
pub fn encode_frame(response: &str) -> Vec<u8> {
    let units: Vec<u16> = response.encode_utf16().collect();
    let payload_len = (units.len() + 1) * 2;
    let total_len = (HEADER_LEN + payload_len) as u32;

    let mut out = Vec::with_capacity(total_len as usize);
    out.extend_from_slice(&total_len.to_le_bytes());
    out.extend_from_slice(&MAGIC1.to_le_bytes());
    out.extend_from_slice(&MAGIC2.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    for unit in units {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.extend_from_slice(&[0, 0]);
    out
}
