//! Decoder-app telemetry codec
//!
//! The decoder app speaks a length-framed `QDataStream` protocol over UDP.
//! Every message starts with the same header:
//!
//! ```text
//! magic:u32 = 0xADBCCBDA
//! schema:u32 = 2
//! type:u32
//! id:QString        (absent for RigControl, which uses the short header)
//! <type-specific payload>
//! ```
//!
//! Inbound types handled: 0 Heartbeat, 1 Status, 2 Decode, 6 Close. Other
//! types decode to `None` and are skipped by the listener. Outbound types:
//! 3 Clear, 4 Reply, 8 HaltTx, 9 FreeText, 11 Location, 12 RigControl,
//! 13 HighlightCallsign, 15 Configure.

use crate::error::ParseError;
use crate::qt::{Color, QtReader, QtWriter};

/// Protocol magic, first four bytes of every datagram
pub const MAGIC: u32 = 0xADBC_CBDA;

/// Schema version this codec emits
pub const SCHEMA: u32 = 2;

/// Sentinel for "leave unchanged" in numeric Configure fields
pub const NO_CHANGE: u32 = 0xFFFF_FFFF;

/// Shortest datagram the decoder can act on (magic + schema + type)
pub const MIN_FRAME_LEN: usize = 12;

mod msg {
    pub const HEARTBEAT: u32 = 0;
    pub const STATUS: u32 = 1;
    pub const DECODE: u32 = 2;
    pub const CLEAR: u32 = 3;
    pub const REPLY: u32 = 4;
    pub const CLOSE: u32 = 6;
    pub const HALT_TX: u32 = 8;
    pub const FREE_TEXT: u32 = 9;
    pub const LOCATION: u32 = 11;
    pub const RIG_CONTROL: u32 = 12;
    pub const HIGHLIGHT: u32 = 13;
    pub const CONFIGURE: u32 = 15;
}

/// Periodic status report (type 1)
///
/// Only `dial_frequency_hz` is mandatory on the wire; the remaining fields
/// default when a shorter (older-schema) frame arrives, and any unknown
/// tail after the known fields is ignored.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusFrame {
    /// Dial (suppressed-carrier) frequency in Hz
    pub dial_frequency_hz: u64,
    /// Operating mode name, e.g. "FT8"
    pub mode: String,
    /// DX call currently entered
    pub dx_call: String,
    /// Report currently entered
    pub report: String,
    /// Transmit mode name
    pub tx_mode: String,
    /// TX enable checkbox state
    pub tx_enabled: bool,
    /// True while the rig is keyed
    pub transmitting: bool,
    /// True while a decode pass is running
    pub decoding: bool,
    /// Receive audio offset in Hz
    pub rx_df: u32,
    /// Transmit audio offset in Hz
    pub tx_df: u32,
    /// Configured station callsign
    pub de_call: String,
    /// Configured station grid
    pub de_grid: String,
    /// DX grid currently entered
    pub dx_grid: String,
    /// TX watchdog tripped
    pub tx_watchdog: bool,
    /// Submode letter, if any
    pub sub_mode: String,
    /// Fast-mode flag
    pub fast_mode: bool,
}

/// A single decode line (type 2)
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeFrame {
    /// True when this is a fresh decode rather than a replay
    pub is_new: bool,
    /// Milliseconds since midnight UTC of the decode window
    pub time_ms: u32,
    /// Signal-to-noise ratio in dB
    pub snr: i32,
    /// Time offset in seconds
    pub dt: f64,
    /// Audio frequency offset in Hz
    pub df: u32,
    /// Mode indicator character
    pub mode: String,
    /// Decoded message text
    pub message: String,
    /// Decoder marked the line low-confidence
    pub low_confidence: bool,
    /// Decode came from playback rather than live audio
    pub off_air: bool,
}

/// Inbound telemetry message, demultiplexed by instance id
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryFrame {
    /// Type 0, proof of life
    Heartbeat {
        /// Instance id of the sender
        id: String,
    },
    /// Type 1, rig/UI state
    Status {
        /// Instance id of the sender
        id: String,
        /// Parsed status payload
        status: StatusFrame,
    },
    /// Type 2, one decoded transmission
    Decode {
        /// Instance id of the sender
        id: String,
        /// Parsed decode payload
        decode: DecodeFrame,
    },
    /// Type 6, sent once when the instance exits cleanly
    Close {
        /// Instance id of the sender
        id: String,
    },
}

impl TelemetryFrame {
    /// Instance id embedded in the frame
    pub fn id(&self) -> &str {
        match self {
            Self::Heartbeat { id }
            | Self::Status { id, .. }
            | Self::Decode { id, .. }
            | Self::Close { id } => id,
        }
    }
}

/// Decode one inbound datagram
///
/// Returns `Ok(None)` for well-formed frames of a type this codec does not
/// handle. Short datagrams and bad magic are errors so the listener can
/// count them.
pub fn decode(datagram: &[u8]) -> Result<Option<TelemetryFrame>, ParseError> {
    if datagram.len() < MIN_FRAME_LEN {
        return Err(ParseError::Truncated {
            offset: datagram.len(),
            needed: MIN_FRAME_LEN - datagram.len(),
        });
    }

    let mut r = QtReader::new(datagram);
    let magic = r.read_u32()?;
    if magic != MAGIC {
        return Err(ParseError::BadMagic {
            expected: MAGIC,
            got: magic,
        });
    }
    let _schema = r.read_u32()?;
    let msg_type = r.read_u32()?;

    let frame = match msg_type {
        msg::HEARTBEAT => {
            let id = r.read_qstring()?;
            Some(TelemetryFrame::Heartbeat { id })
        }
        msg::STATUS => {
            let id = r.read_qstring()?;
            let status = decode_status(&mut r)?;
            Some(TelemetryFrame::Status { id, status })
        }
        msg::DECODE => {
            let id = r.read_qstring()?;
            let decode = decode_decode(&mut r)?;
            Some(TelemetryFrame::Decode { id, decode })
        }
        msg::CLOSE => {
            let id = r.read_qstring()?;
            Some(TelemetryFrame::Close { id })
        }
        _ => None,
    };
    Ok(frame)
}

fn decode_status(r: &mut QtReader<'_>) -> Result<StatusFrame, ParseError> {
    // Dial frequency is the only field every schema carries.
    let mut s = StatusFrame {
        dial_frequency_hz: r.read_u64()?,
        ..StatusFrame::default()
    };

    // Remaining fields are best-effort: stop quietly when the frame ends.
    let ok = (|| -> Result<(), ParseError> {
        s.mode = r.read_qstring()?;
        s.dx_call = r.read_qstring()?;
        s.report = r.read_qstring()?;
        s.tx_mode = r.read_qstring()?;
        s.tx_enabled = r.read_bool()?;
        s.transmitting = r.read_bool()?;
        s.decoding = r.read_bool()?;
        s.rx_df = r.read_u32()?;
        s.tx_df = r.read_u32()?;
        s.de_call = r.read_qstring()?;
        s.de_grid = r.read_qstring()?;
        s.dx_grid = r.read_qstring()?;
        s.tx_watchdog = r.read_bool()?;
        s.sub_mode = r.read_qstring()?;
        s.fast_mode = r.read_bool()?;
        Ok(())
    })();

    match ok {
        Ok(()) | Err(ParseError::Truncated { .. }) => Ok(s),
        Err(e) => Err(e),
    }
}

fn decode_decode(r: &mut QtReader<'_>) -> Result<DecodeFrame, ParseError> {
    let is_new = r.read_bool()?;
    let time_ms = r.read_u32()?;
    let snr = r.read_i32()?;
    let dt = r.read_f64()?;
    let df = r.read_u32()?;
    let mode = r.read_qstring()?;
    let message = r.read_qstring()?;

    // Trailing flags are optional on older schemas.
    let low_confidence = r.read_bool().unwrap_or(false);
    let off_air = r.read_bool().unwrap_or(false);

    Ok(DecodeFrame {
        is_new,
        time_ms,
        snr,
        dt,
        df,
        mode,
        message,
        low_confidence,
        off_air,
    })
}

/// Outbound command to a decoder-app instance
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderCommand {
    /// Type 3: clear a decode window (0 = band activity, 1 = RX frequency,
    /// 2 = both)
    Clear {
        /// Target instance
        id: String,
        /// Window selector
        window: u8,
    },
    /// Type 4: reply to a decode, handing the exchange to the decoder's own
    /// sequencer
    Reply {
        /// Target instance
        id: String,
        /// `time_ms` of the decode being answered
        time_ms: u32,
        /// SNR of the decode being answered
        snr: i32,
        /// DT of the decode being answered
        dt: f64,
        /// DF of the decode being answered
        df: u32,
        /// Mode indicator of the decode
        mode: String,
        /// Message text of the decode
        message: String,
        /// Low-confidence flag of the decode
        low_confidence: bool,
        /// Modifier byte; 0x02 arms the auto-TX sequencer
        modifiers: u8,
    },
    /// Type 8: stop transmitting
    HaltTx {
        /// Target instance
        id: String,
        /// Only halt auto-sequenced TX, leave manual TX alone
        auto_only: bool,
    },
    /// Type 9: place text in the free-text field, optionally keying it
    FreeText {
        /// Target instance
        id: String,
        /// Message text (13 characters usable in FT8)
        text: String,
        /// Transmit it on the next period
        send: bool,
    },
    /// Type 11: set the station grid
    Location {
        /// Target instance
        id: String,
        /// Maidenhead locator
        grid: String,
    },
    /// Type 12: rig state push; short header, no instance id
    RigControl {
        /// Dial frequency in Hz
        freq_hz: i64,
        /// Mode name
        mode: String,
    },
    /// Type 13: color a callsign in the band activity window
    HighlightCallsign {
        /// Target instance
        id: String,
        /// Callsign to highlight
        call: String,
        /// Background color
        background: Color,
        /// Foreground color
        foreground: Color,
        /// Only highlight the most recent occurrence
        highlight_last: bool,
    },
    /// Type 15: reconfigure the instance; `NO_CHANGE` / empty string leave a
    /// field untouched
    Configure {
        /// Target instance
        id: String,
        /// Mode name or empty for no change
        mode: String,
        /// Frequency tolerance in Hz or `NO_CHANGE`
        frequency_tolerance: u32,
        /// Submode or empty for no change
        submode: String,
        /// Fast-mode flag
        fast: bool,
        /// T/R period in seconds or `NO_CHANGE`
        tr_period: u32,
        /// RX audio offset or `NO_CHANGE`
        rx_df: u32,
        /// DX call or empty for no change
        dx_call: String,
        /// DX grid or empty for no change
        dx_grid: String,
        /// Regenerate standard messages from the new DX call/grid
        generate_messages: bool,
    },
}

impl DecoderCommand {
    /// Modifier byte that arms the decoder app's transmit sequencer
    pub const REPLY_MODIFIER_AUTO_TX: u8 = 0x02;

    /// Encode to the wire format
    pub fn encode(&self) -> Vec<u8> {
        let mut w = QtWriter::new();
        w.put_u32(MAGIC).put_u32(SCHEMA);

        match self {
            Self::Clear { id, window } => {
                w.put_u32(msg::CLEAR).put_qstring(id).put_u8(*window);
            }
            Self::Reply {
                id,
                time_ms,
                snr,
                dt,
                df,
                mode,
                message,
                low_confidence,
                modifiers,
            } => {
                w.put_u32(msg::REPLY)
                    .put_qstring(id)
                    .put_u32(*time_ms)
                    .put_i32(*snr)
                    .put_f64(*dt)
                    .put_u32(*df)
                    .put_qstring(mode)
                    .put_qstring(message)
                    .put_bool(*low_confidence)
                    .put_u8(*modifiers);
            }
            Self::HaltTx { id, auto_only } => {
                w.put_u32(msg::HALT_TX).put_qstring(id).put_bool(*auto_only);
            }
            Self::FreeText { id, text, send } => {
                w.put_u32(msg::FREE_TEXT)
                    .put_qstring(id)
                    .put_qstring(text)
                    .put_bool(*send);
            }
            Self::Location { id, grid } => {
                w.put_u32(msg::LOCATION).put_qstring(id).put_qstring(grid);
            }
            Self::RigControl { freq_hz, mode } => {
                w.put_u32(msg::RIG_CONTROL).put_i64(*freq_hz).put_qstring(mode);
            }
            Self::HighlightCallsign {
                id,
                call,
                background,
                foreground,
                highlight_last,
            } => {
                w.put_u32(msg::HIGHLIGHT)
                    .put_qstring(id)
                    .put_qstring(call)
                    .put_color(*background)
                    .put_color(*foreground)
                    .put_bool(*highlight_last);
            }
            Self::Configure {
                id,
                mode,
                frequency_tolerance,
                submode,
                fast,
                tr_period,
                rx_df,
                dx_call,
                dx_grid,
                generate_messages,
            } => {
                w.put_u32(msg::CONFIGURE)
                    .put_qstring(id)
                    .put_qstring(mode)
                    .put_u32(*frequency_tolerance)
                    .put_qstring(submode)
                    .put_bool(*fast)
                    .put_u32(*tr_period)
                    .put_u32(*rx_df)
                    .put_qstring(dx_call)
                    .put_qstring(dx_grid)
                    .put_bool(*generate_messages);
            }
        }
        w.into_bytes()
    }

    /// Reply command answering `decode`, with the auto-TX modifier set
    pub fn reply_to(id: &str, decode: &DecodeFrame) -> Self {
        Self::Reply {
            id: id.to_string(),
            time_ms: decode.time_ms,
            snr: decode.snr,
            dt: decode.dt,
            df: decode.df,
            mode: decode.mode.clone(),
            message: decode.message.clone(),
            low_confidence: false,
            modifiers: Self::REPLY_MODIFIER_AUTO_TX,
        }
    }

    /// Configure command that changes nothing; callers overwrite the fields
    /// they mean to set
    pub fn configure_no_change(id: &str) -> Self {
        Self::Configure {
            id: id.to_string(),
            mode: String::new(),
            frequency_tolerance: NO_CHANGE,
            submode: String::new(),
            fast: false,
            tr_period: NO_CHANGE,
            rx_df: NO_CHANGE,
            dx_call: String::new(),
            dx_grid: String::new(),
            generate_messages: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qt::QtWriter;

    /// Build an inbound frame the way the decoder app would
    fn frame(msg_type: u32, id: &str, payload: impl FnOnce(&mut QtWriter)) -> Vec<u8> {
        let mut w = QtWriter::new();
        w.put_u32(MAGIC).put_u32(SCHEMA).put_u32(msg_type).put_qstring(id);
        payload(&mut w);
        w.into_bytes()
    }

    #[test]
    fn heartbeat_roundtrip() {
        let bytes = frame(0, "Slice-A", |w| {
            // Trailing heartbeat fields are ignored
            w.put_u32(3).put_qstring("v2.6.1").put_qstring("rev");
        });
        let got = decode(&bytes).unwrap().unwrap();
        assert_eq!(got, TelemetryFrame::Heartbeat { id: "Slice-A".into() });
    }

    #[test]
    fn status_roundtrip() {
        let bytes = frame(1, "Slice-B", |w| {
            w.put_u64(14_074_000)
                .put_qstring("FT8")
                .put_qstring("DL1XYZ")
                .put_qstring("-12")
                .put_qstring("FT8")
                .put_bool(true)
                .put_bool(false)
                .put_bool(true)
                .put_u32(1500)
                .put_u32(1500)
                .put_qstring("W1ABC")
                .put_qstring("FN20")
                .put_qstring("JO62")
                .put_bool(false)
                .put_qstring("")
                .put_bool(false);
        });
        let got = decode(&bytes).unwrap().unwrap();
        match got {
            TelemetryFrame::Status { id, status } => {
                assert_eq!(id, "Slice-B");
                assert_eq!(status.dial_frequency_hz, 14_074_000);
                assert_eq!(status.mode, "FT8");
                assert_eq!(status.dx_call, "DL1XYZ");
                assert!(status.tx_enabled);
                assert!(!status.transmitting);
                assert_eq!(status.rx_df, 1500);
                assert_eq!(status.de_call, "W1ABC");
                assert_eq!(status.de_grid, "FN20");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn status_with_short_tail_still_decodes() {
        // Only dial frequency and mode present
        let bytes = frame(1, "Slice-A", |w| {
            w.put_u64(7_074_000).put_qstring("FT8");
        });
        let got = decode(&bytes).unwrap().unwrap();
        match got {
            TelemetryFrame::Status { status, .. } => {
                assert_eq!(status.dial_frequency_hz, 7_074_000);
                assert_eq!(status.mode, "FT8");
                assert!(!status.tx_enabled);
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn status_with_unknown_tail_ignores_it() {
        let mut bytes = frame(1, "Slice-A", |w| {
            w.put_u64(7_074_000)
                .put_qstring("FT8")
                .put_qstring("")
                .put_qstring("")
                .put_qstring("FT8")
                .put_bool(false)
                .put_bool(false)
                .put_bool(false)
                .put_u32(0)
                .put_u32(0)
                .put_qstring("W1ABC")
                .put_qstring("FN20")
                .put_qstring("")
                .put_bool(false)
                .put_qstring("")
                .put_bool(false);
        });
        // Future-schema extension bytes
        bytes.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(decode(&bytes).unwrap().is_some());
    }

    #[test]
    fn decode_frame_roundtrip() {
        let bytes = frame(2, "Slice-A", |w| {
            w.put_bool(true)
                .put_u32(43_200_000)
                .put_i32(-7)
                .put_f64(0.3)
                .put_u32(1420)
                .put_qstring("~")
                .put_qstring("W1ABC DL1XYZ R-07")
                .put_bool(false)
                .put_bool(false);
        });
        let got = decode(&bytes).unwrap().unwrap();
        let expected = DecodeFrame {
            is_new: true,
            time_ms: 43_200_000,
            snr: -7,
            dt: 0.3,
            df: 1420,
            mode: "~".into(),
            message: "W1ABC DL1XYZ R-07".into(),
            low_confidence: false,
            off_air: false,
        };
        assert_eq!(
            got,
            TelemetryFrame::Decode { id: "Slice-A".into(), decode: expected }
        );
    }

    #[test]
    fn decode_without_trailing_flags() {
        let bytes = frame(2, "Slice-A", |w| {
            w.put_bool(true)
                .put_u32(1000)
                .put_i32(3)
                .put_f64(-0.1)
                .put_u32(800)
                .put_qstring("~")
                .put_qstring("CQ DL1XYZ JO62");
        });
        let got = decode(&bytes).unwrap().unwrap();
        match got {
            TelemetryFrame::Decode { decode, .. } => {
                assert!(!decode.low_confidence);
                assert!(!decode.off_air);
            }
            other => panic!("expected Decode, got {other:?}"),
        }
    }

    #[test]
    fn close_roundtrip() {
        let bytes = frame(6, "Slice-C", |_| {});
        let got = decode(&bytes).unwrap().unwrap();
        assert_eq!(got, TelemetryFrame::Close { id: "Slice-C".into() });
    }

    #[test]
    fn unknown_type_is_skipped() {
        let bytes = frame(5, "Slice-A", |w| {
            w.put_qstring("WSJT-X");
        });
        assert!(decode(&bytes).unwrap().is_none());
    }

    #[test]
    fn bad_magic_is_an_error() {
        let mut bytes = frame(0, "Slice-A", |_| {});
        bytes[0] = 0x00;
        assert!(matches!(
            decode(&bytes),
            Err(ParseError::BadMagic { got: 0x00BC_CBDA, .. })
        ));
    }

    #[test]
    fn short_datagram_is_an_error() {
        let bytes = [0xAD, 0xBC, 0xCB, 0xDA, 0, 0, 0, 2];
        assert!(matches!(decode(&bytes), Err(ParseError::Truncated { .. })));
    }

    #[test]
    fn reply_encoding() {
        let cmd = DecoderCommand::Reply {
            id: "Slice-A".into(),
            time_ms: 43_200_000,
            snr: -5,
            dt: 0.2,
            df: 1000,
            mode: "~".into(),
            message: "CQ DL1XYZ JO62".into(),
            low_confidence: false,
            modifiers: DecoderCommand::REPLY_MODIFIER_AUTO_TX,
        };
        let bytes = cmd.encode();

        let mut r = QtReader::new(&bytes);
        assert_eq!(r.read_u32().unwrap(), MAGIC);
        assert_eq!(r.read_u32().unwrap(), SCHEMA);
        assert_eq!(r.read_u32().unwrap(), 4);
        assert_eq!(r.read_qstring().unwrap(), "Slice-A");
        assert_eq!(r.read_u32().unwrap(), 43_200_000);
        assert_eq!(r.read_i32().unwrap(), -5);
        assert_eq!(r.read_f64().unwrap(), 0.2);
        assert_eq!(r.read_u32().unwrap(), 1000);
        assert_eq!(r.read_qstring().unwrap(), "~");
        assert_eq!(r.read_qstring().unwrap(), "CQ DL1XYZ JO62");
        assert_eq!(r.read_u8().unwrap(), 0);
        // Modifier byte arms the auto-TX sequencer
        assert_eq!(r.read_u8().unwrap(), 0x02);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn reply_to_copies_decode_fields() {
        let decode = DecodeFrame {
            is_new: true,
            time_ms: 100,
            snr: -3,
            dt: 0.5,
            df: 1200,
            mode: "~".into(),
            message: "CQ DL1XYZ JO62".into(),
            low_confidence: false,
            off_air: false,
        };
        match DecoderCommand::reply_to("Slice-A", &decode) {
            DecoderCommand::Reply { time_ms, snr, df, modifiers, .. } => {
                assert_eq!(time_ms, 100);
                assert_eq!(snr, -3);
                assert_eq!(df, 1200);
                assert_eq!(modifiers, 0x02);
            }
            other => panic!("expected Reply, got {other:?}"),
        }
    }

    #[test]
    fn free_text_encoding() {
        let bytes = DecoderCommand::FreeText {
            id: "Slice-A".into(),
            text: "CQ W1ABC FN20".into(),
            send: true,
        }
        .encode();

        let mut r = QtReader::new(&bytes);
        r.read_u32().unwrap();
        r.read_u32().unwrap();
        assert_eq!(r.read_u32().unwrap(), 9);
        assert_eq!(r.read_qstring().unwrap(), "Slice-A");
        assert_eq!(r.read_qstring().unwrap(), "CQ W1ABC FN20");
        assert_eq!(r.read_u8().unwrap(), 1);
    }

    #[test]
    fn halt_tx_encoding() {
        let bytes = DecoderCommand::HaltTx { id: "Slice-A".into(), auto_only: false }.encode();
        let mut r = QtReader::new(&bytes);
        r.read_u32().unwrap();
        r.read_u32().unwrap();
        assert_eq!(r.read_u32().unwrap(), 8);
        assert_eq!(r.read_qstring().unwrap(), "Slice-A");
        assert_eq!(r.read_u8().unwrap(), 0);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn rig_control_has_short_header() {
        let bytes = DecoderCommand::RigControl { freq_hz: 14_074_000, mode: "DIGU".into() }.encode();
        let mut r = QtReader::new(&bytes);
        assert_eq!(r.read_u32().unwrap(), MAGIC);
        assert_eq!(r.read_u32().unwrap(), SCHEMA);
        assert_eq!(r.read_u32().unwrap(), 12);
        // No id string: frequency follows the type directly
        assert_eq!(r.read_i64().unwrap(), 14_074_000);
        assert_eq!(r.read_qstring().unwrap(), "DIGU");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn configure_preserves_no_change_sentinels() {
        let bytes = DecoderCommand::configure_no_change("Slice-A").encode();
        let mut r = QtReader::new(&bytes);
        r.read_u32().unwrap();
        r.read_u32().unwrap();
        assert_eq!(r.read_u32().unwrap(), 15);
        assert_eq!(r.read_qstring().unwrap(), "Slice-A");
        assert_eq!(r.read_qstring().unwrap(), "");
        assert_eq!(r.read_u32().unwrap(), NO_CHANGE);
        assert_eq!(r.read_qstring().unwrap(), "");
        assert_eq!(r.read_u8().unwrap(), 0);
        assert_eq!(r.read_u32().unwrap(), NO_CHANGE);
        assert_eq!(r.read_u32().unwrap(), NO_CHANGE);
    }

    #[test]
    fn highlight_encoding_length() {
        let bytes = DecoderCommand::HighlightCallsign {
            id: "Slice-A".into(),
            call: "DL1XYZ".into(),
            background: Color::rgb(0xFF, 0xFF, 0x00),
            foreground: Color::rgb(0x00, 0x00, 0x00),
            highlight_last: true,
        }
        .encode();

        // header(12) + id(4+14) + call(4+12) + 2 colors(11 each) + flag(1)
        assert_eq!(bytes.len(), 12 + 18 + 16 + 22 + 1);
    }
}
