//! CAT dialect auto-detection
//!
//! All three dialects share one TCP port per slice, so the first bytes of a
//! connection decide which codec runs for its lifetime:
//!
//! 1. Bytes 4..8 equal to an HRD magic (either byte order) select the v5
//!    binary dialect outright.
//! 2. A first byte below 0x80 whose leading four bytes read as a plausible
//!    little-endian frame length (1..=65535) provisionally selects binary.
//! 3. Otherwise an uppercase first token plus a `;` anywhere selects the
//!    TS-2000 ASCII dialect.
//! 4. Everything else is HRD text.

/// The three CAT wire dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Dialect A: TS-2000-like ASCII, `;`-terminated
    TsAscii,
    /// Dialect B: HRD text, `\r`-terminated
    HrdText,
    /// Dialect C: HRD v5 binary frames
    HrdBinary,
}

impl Dialect {
    /// Human-readable dialect name
    pub fn name(&self) -> &'static str {
        match self {
            Self::TsAscii => "TS-2000 ASCII",
            Self::HrdText => "HRD text",
            Self::HrdBinary => "HRD v5 binary",
        }
    }
}

/// Outcome of a detection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// Dialect chosen; fixed for the connection from here on
    Selected(Dialect),
    /// Not enough bytes buffered to decide
    NeedMoreData,
}

/// Bytes 4..8 of an HRD v5 frame for each accepted magic byte order
const HRD_MAGIC_LE: [u8; 4] = [0xCD, 0xAB, 0x34, 0x12];
const HRD_MAGIC_BE: [u8; 4] = [0x12, 0x34, 0xAB, 0xCD];

/// How many bytes detection wants before falling back to text heuristics
pub const DETECT_BUFFER_LEN: usize = 8;

/// Inspect the first buffered bytes of a connection
///
/// Call again with a longer buffer on [`Detection::NeedMoreData`]. Text
/// dialects can be chosen before 8 bytes arrive when a terminator shows up
/// early; the binary checks always wait for the full 8.
pub fn detect(buf: &[u8]) -> Detection {
    if buf.is_empty() {
        return Detection::NeedMoreData;
    }

    if buf.len() >= DETECT_BUFFER_LEN {
        if buf[4..8] == HRD_MAGIC_LE || buf[4..8] == HRD_MAGIC_BE {
            return Detection::Selected(Dialect::HrdBinary);
        }
        if buf[0] < 0x80 && plausible_le_length(&buf[..4]) {
            return Detection::Selected(Dialect::HrdBinary);
        }
        return Detection::Selected(detect_text(buf));
    }

    // Short buffer: a terminator settles the text dialects early.
    if buf.contains(&b';') || buf.contains(&b'\r') {
        return Detection::Selected(detect_text(buf));
    }
    Detection::NeedMoreData
}

fn plausible_le_length(bytes: &[u8]) -> bool {
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    (1..=65_535).contains(&len)
}

fn detect_text(buf: &[u8]) -> Dialect {
    let first = buf.iter().copied().find(|b| !b.is_ascii_whitespace());
    match first {
        Some(b) if b.is_ascii_uppercase() && buf.contains(&b';') => Dialect::TsAscii,
        _ => Dialect::HrdText,
    }
}
