//! Radio backend line protocol
//!
//! The SDR backend speaks newline-terminated ASCII over TCP. Commands from
//! us are sequence-numbered:
//!
//! ```text
//! C<seq>|slice tune 0 14.074000
//! ```
//!
//! Push messages from the radio carry a handle instead:
//!
//! ```text
//! S5C7|slice 0 RF_frequency=14.074000 mode=USB in_use=1
//! ```
//!
//! Frequencies on the wire are MHz with six fractional digits; everything
//! internal is integer Hz. The conversion rounds to the nearest Hz so a
//! value like `14.0740000` lands on exactly 14074000 with no float drift
//! showing downstream.
//!
//! Discovery datagrams (broadcast on the same well-known port) are
//! whitespace-separated `key=value` pairs.

use std::collections::HashMap;

use crate::mode::SliceMode;

/// Default TCP/discovery port of the radio backend
pub const DEFAULT_PORT: u16 = 4992;

/// One parsed line from the backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendMessage {
    /// `S<handle>|<message>` - status push
    Status {
        /// Sender handle (opaque hex string)
        handle: String,
        /// Message body after the pipe
        message: String,
    },
    /// `R<seq>|<code>|<message>` - command response
    Reply {
        /// Sequence number being answered
        seq: u32,
        /// Hex result code
        code: String,
        /// Remainder of the line
        message: String,
    },
    /// `V<version>` - protocol version banner
    Version(String),
    /// `H<handle>` - our session handle
    Handle(String),
    /// Anything else; logged and ignored upstream
    Unknown(String),
}

/// Parse one line (newline already stripped)
pub fn parse_line(line: &str) -> BackendMessage {
    let line = line.trim_end_matches('\r');
    let mut chars = line.chars();
    match chars.next() {
        Some('S') => match line[1..].split_once('|') {
            Some((handle, message)) => BackendMessage::Status {
                handle: handle.to_string(),
                message: message.to_string(),
            },
            None => BackendMessage::Unknown(line.to_string()),
        },
        Some('R') => {
            let mut parts = line[1..].splitn(3, '|');
            let seq = parts.next().and_then(|s| s.parse::<u32>().ok());
            let code = parts.next();
            match (seq, code) {
                (Some(seq), Some(code)) => BackendMessage::Reply {
                    seq,
                    code: code.to_string(),
                    message: parts.next().unwrap_or("").to_string(),
                },
                _ => BackendMessage::Unknown(line.to_string()),
            }
        }
        Some('V') => BackendMessage::Version(line[1..].to_string()),
        Some('H') => BackendMessage::Handle(line[1..].to_string()),
        _ => BackendMessage::Unknown(line.to_string()),
    }
}

/// Field deltas carried by one `slice <index> ...` status message
///
/// Unset fields were absent from the message; the store merges only what is
/// present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceUpdate {
    /// Slice index
    pub index: usize,
    /// New RF frequency in Hz
    pub frequency_hz: Option<u64>,
    /// New mode
    pub mode: Option<SliceMode>,
    /// Allocated / released
    pub in_use: Option<bool>,
    /// DAX channel number
    pub dax: Option<u8>,
    /// RX antenna name
    pub rxant: Option<String>,
}

/// Parse a status message body as a slice update
///
/// Returns `None` when the message is not about a slice. Unknown keys are
/// skipped.
pub fn parse_slice_status(message: &str) -> Option<SliceUpdate> {
    let mut tokens = message.split_whitespace();
    if tokens.next()? != "slice" {
        return None;
    }
    let index = tokens.next()?.parse::<usize>().ok()?;

    let mut update = SliceUpdate { index, ..SliceUpdate::default() };
    for token in tokens {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "RF_frequency" => update.frequency_hz = mhz_to_hz(value),
            "mode" => update.mode = Some(SliceMode::from_backend(value)),
            "in_use" => update.in_use = Some(value == "1"),
            "dax" => update.dax = value.parse::<u8>().ok(),
            "rxant" => update.rxant = Some(value.to_string()),
            _ => {}
        }
    }
    Some(update)
}

/// Convert a decimal-MHz string to integer Hz, rounding to the nearest Hz
pub fn mhz_to_hz(text: &str) -> Option<u64> {
    let mhz = text.parse::<f64>().ok()?;
    if !mhz.is_finite() || mhz < 0.0 {
        return None;
    }
    Some((mhz * 1e6).round() as u64)
}

/// Format integer Hz as decimal MHz with six fractional digits
pub fn hz_to_mhz(hz: u64) -> String {
    format!("{}.{:06}", hz / 1_000_000, hz % 1_000_000)
}

/// Wrap a command body in the `C<seq>|...\n` frame
pub fn command_line(seq: u32, command: &str) -> String {
    format!("C{seq}|{command}\n")
}

/// `slice tune <index> <mhz>` command body
pub fn tune_command(index: usize, hz: u64) -> String {
    format!("slice tune {index} {}", hz_to_mhz(hz))
}

/// `slice set <index> mode=<mode>` command body
pub fn mode_command(index: usize, mode: &SliceMode) -> String {
    format!("slice set {index} mode={}", mode.backend_name())
}

/// `xmit <0|1>` command body (global transmit toggle)
pub fn xmit_command(on: bool) -> String {
    format!("xmit {}", u8::from(on))
}

/// Subscription command sent right after connect
pub const SUBSCRIBE_COMMAND: &str = "sub slice all";

/// Slice-list request sent right after the subscription
pub const SLICE_LIST_COMMAND: &str = "slice list";

/// Parsed discovery broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryInfo {
    /// Radio IP address as announced
    pub ip: String,
    /// API port as announced
    pub port: u16,
    /// All announced key/value pairs
    pub fields: HashMap<String, String>,
}

/// Parse a discovery datagram payload
///
/// The payload is ASCII `key=value` pairs; a packet without at least an
/// `ip` field is not a discovery announcement.
pub fn parse_discovery(payload: &[u8]) -> Option<DiscoveryInfo> {
    let text = std::str::from_utf8(payload).ok()?;
    let mut fields = HashMap::new();
    for token in text.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            fields.insert(key.to_string(), value.to_string());
        }
    }
    let ip = fields.get("ip")?.clone();
    let port = fields
        .get("port")
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    Some(DiscoveryInfo { ip, port, fields })
}
