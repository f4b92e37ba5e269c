//! CAT dialect A: TS-2000-like ASCII
//!
//! The decoder app's Kenwood rig driver speaks semicolon-terminated ASCII
//! commands. Query forms carry no parameter and expect a value back; set
//! forms carry a parameter and expect silence.
//!
//! # Format
//! - Commands: `XXppppp;` where XX is the two-letter token
//! - Frequency: 11-digit zero-padded Hz
//! - Terminator: `;` (0x3B)
//!
//! The `IF` status reply is width-sensitive: the rig driver indexes into it
//! by column, so [`if_response`] reproduces the exact layout byte for byte.

use crate::command::CatRequest;
use crate::error::ParseError;
use crate::mode::SliceMode;

/// Upper bound on buffered bytes before old data is discarded
const MAX_COMMAND_LEN: usize = 64;

/// Radio identity returned to `ID;` (019 = TS-2000)
pub const RADIO_ID: &str = "019";

/// One parsed dialect-A command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TsCommand {
    /// `FA;` / `FA00014074000;` - VFO A frequency
    FrequencyA(Option<u64>),
    /// `FB;` / `FB...;` - VFO B frequency
    FrequencyB(Option<u64>),
    /// `MD;` / `MD2;` - mode
    Mode(Option<u8>),
    /// `TX;` / `TX0;` / `TX1;` - key the transmitter
    Transmit(Option<bool>),
    /// `RX;` - back to receive
    Receive,
    /// `TQ;` - transmit state query
    TransmitQuery,
    /// `IF;` - status line query
    Info,
    /// `ID;` - radio identity query
    Id,
    /// `AI;` / `AI0;` - auto-information
    AutoInfo(Option<u8>),
    /// `PS;` / `PS1;` - power status
    Power(Option<bool>),
    /// Any other recognized-but-stubbed token (`SM`, `AG`, `NB`, ...)
    Stub {
        /// Two-letter token
        token: String,
        /// Parameter text, empty for queries
        params: String,
    },
    /// Token outside the supported set
    Unknown(String),
}

/// Two-letter tokens answered with canned TS-2000 values
///
/// The decoder app probes several of these at startup; an empty reply makes
/// it declare the rig dead, so each gets a plausible constant.
const STUB_TOKENS: &[(&str, &str)] = &[
    ("SP", "SP0;"),
    ("FT", "FT0;"),
    ("FR", "FR0;"),
    ("SM", "SM0000;"),
    ("RS", "RS0;"),
    ("AG", "AG0000;"),
    ("NB", "NB0;"),
    ("NR", "NR0;"),
    ("RA", "RA0000;"),
    ("PA", "PA00;"),
    ("RT", "RT0;"),
    ("XT", "XT0;"),
    ("AN", "AN0;"),
    ("FL", "FL000000;"),
    ("FW", "FW0000;"),
    ("SH", "SH00;"),
    ("SL", "SL00;"),
    ("VX", "VX0;"),
];

fn is_stub_token(token: &str) -> bool {
    STUB_TOKENS.iter().any(|(t, _)| *t == token)
}

/// Canned query reply for a stub token, if it has one
pub fn stub_response(token: &str) -> Option<&'static str> {
    STUB_TOKENS
        .iter()
        .find(|(t, _)| *t == token)
        .map(|(_, reply)| *reply)
}

/// Streaming splitter/parser for dialect A
pub struct TsCodec {
    buffer: Vec<u8>,
}

impl TsCodec {
    /// New codec with an empty buffer
    pub fn new() -> Self {
        Self { buffer: Vec::with_capacity(64) }
    }

    /// Append raw bytes from the socket
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        if self.buffer.len() > MAX_COMMAND_LEN * 4 {
            let start = self.buffer.len() - MAX_COMMAND_LEN;
            self.buffer = self.buffer[start..].to_vec();
        }
    }

    /// Pull the next complete command out of the buffer
    pub fn next_command(&mut self) -> Option<TsCommand> {
        let term_pos = self.buffer.iter().position(|&b| b == b';')?;
        let cmd_bytes: Vec<u8> = self.buffer.drain(..=term_pos).collect();
        let cmd_str = String::from_utf8_lossy(&cmd_bytes[..cmd_bytes.len() - 1]);
        let cmd_str = cmd_str.trim();

        match parse_command(cmd_str) {
            Ok(cmd) => Some(cmd),
            Err(e) => {
                tracing::warn!("unparseable dialect-A command {:?}: {}", cmd_str, e);
                Some(TsCommand::Unknown(cmd_str.to_string()))
            }
        }
    }

    /// Discard buffered bytes
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for TsCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl TsCommand {
    /// Convert to the normalized request, if this command has one
    ///
    /// `current_mode` resolves the TS-2000 mode-number ambiguity (a bare
    /// USB/LSB set keeps the data flavor). Commands with dialect-local
    /// semantics (`AI`, `PS`, the stub probes) return `None` and are
    /// answered by the dialect itself, as is an unmapped mode number.
    pub fn to_cat_request(&self, current_mode: Option<&SliceMode>) -> Option<CatRequest> {
        match self {
            Self::FrequencyA(None) | Self::FrequencyB(None) => Some(CatRequest::GetFrequency),
            Self::FrequencyA(Some(hz)) | Self::FrequencyB(Some(hz)) => {
                Some(CatRequest::SetFrequency { hz: *hz })
            }
            Self::Mode(None) => Some(CatRequest::GetMode),
            Self::Mode(Some(code)) => SliceMode::from_ts2000_code(*code, current_mode)
                .map(|mode| CatRequest::SetMode { mode }),
            Self::Transmit(Some(on)) => Some(CatRequest::SetTransmit { on: *on }),
            Self::Transmit(None) | Self::TransmitQuery => Some(CatRequest::GetTransmit),
            Self::Receive => Some(CatRequest::SetTransmit { on: false }),
            Self::Info => Some(CatRequest::GetInfo),
            Self::Id => Some(CatRequest::GetId),
            Self::AutoInfo(_) | Self::Power(_) | Self::Stub { .. } | Self::Unknown(_) => None,
        }
    }
}

fn parse_command(cmd: &str) -> Result<TsCommand, ParseError> {
    if cmd.len() < 2 {
        return Err(ParseError::InvalidFrame("command too short".into()));
    }
    let prefix = &cmd[..2];
    let params = &cmd[2..];

    match prefix {
        "FA" => parse_freq(params).map(TsCommand::FrequencyA),
        "FB" => parse_freq(params).map(TsCommand::FrequencyB),
        "MD" => {
            if params.is_empty() {
                Ok(TsCommand::Mode(None))
            } else {
                let code = params
                    .parse::<u8>()
                    .map_err(|_| ParseError::InvalidNumber(params.into()))?;
                Ok(TsCommand::Mode(Some(code)))
            }
        }
        "TX" => {
            if params.is_empty() {
                Ok(TsCommand::Transmit(Some(true)))
            } else {
                Ok(TsCommand::Transmit(Some(params != "0")))
            }
        }
        "RX" => Ok(TsCommand::Receive),
        "TQ" => Ok(TsCommand::TransmitQuery),
        "IF" => Ok(TsCommand::Info),
        "ID" => Ok(TsCommand::Id),
        "AI" => {
            if params.is_empty() {
                Ok(TsCommand::AutoInfo(None))
            } else {
                let level = params
                    .parse::<u8>()
                    .map_err(|_| ParseError::InvalidNumber(params.into()))?;
                Ok(TsCommand::AutoInfo(Some(level)))
            }
        }
        "PS" => {
            if params.is_empty() {
                Ok(TsCommand::Power(None))
            } else {
                Ok(TsCommand::Power(Some(params != "0")))
            }
        }
        _ if is_stub_token(prefix) => Ok(TsCommand::Stub {
            token: prefix.to_string(),
            params: params.to_string(),
        }),
        _ => Ok(TsCommand::Unknown(cmd.to_string())),
    }
}

fn parse_freq(params: &str) -> Result<Option<u64>, ParseError> {
    if params.is_empty() {
        return Ok(None);
    }
    params
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ParseError::InvalidFrequency(params.into()))
}

/// `FAxxxxxxxxxxx;` frequency reply
pub fn frequency_response(prefix: &str, hz: u64) -> String {
    format!("{prefix}{hz:011};")
}

/// `MDn;` mode reply
pub fn mode_response(mode: &SliceMode) -> String {
    format!("MD{};", mode.ts2000_code())
}

/// `ID019;` identity reply
pub fn id_response() -> String {
    format!("ID{RADIO_ID};")
}

/// `TQn;` transmit-state reply
pub fn transmit_query_response(transmitting: bool) -> String {
    format!("TQ{};", u8::from(transmitting))
}

/// The fixed-width `IF` status line
///
/// Layout: `IF` + 11-digit frequency + 5 spaces + `+00000000` + tx digit +
/// mode digit + `0000  ;`. The rig driver slices this by column, so every
/// byte counts.
pub fn if_response(hz: u64, mode: &SliceMode, transmitting: bool) -> String {
    format!(
        "IF{hz:011}     +00000000{tx}{md}0000  ;",
        tx = u8::from(transmitting),
        md = mode.ts2000_code(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_frequency_query_and_set() {
        let mut codec = TsCodec::new();
        codec.push_bytes(b"FA;FA00014074000;");
        assert_eq!(codec.next_command(), Some(TsCommand::FrequencyA(None)));
        assert_eq!(
            codec.next_command(),
            Some(TsCommand::FrequencyA(Some(14_074_000)))
        );
        assert_eq!(codec.next_command(), None);
    }

    #[test]
    fn streaming_parse_across_reads() {
        let mut codec = TsCodec::new();
        codec.push_bytes(b"FA000140");
        assert_eq!(codec.next_command(), None);
        codec.push_bytes(b"74000;");
        assert_eq!(
            codec.next_command(),
            Some(TsCommand::FrequencyA(Some(14_074_000)))
        );
    }

    #[test]
    fn parse_mode_tx_rx() {
        let mut codec = TsCodec::new();
        codec.push_bytes(b"MD2;TX;RX;TX0;TQ;");
        assert_eq!(codec.next_command(), Some(TsCommand::Mode(Some(2))));
        assert_eq!(codec.next_command(), Some(TsCommand::Transmit(Some(true))));
        assert_eq!(codec.next_command(), Some(TsCommand::Receive));
        assert_eq!(codec.next_command(), Some(TsCommand::Transmit(Some(false))));
        assert_eq!(codec.next_command(), Some(TsCommand::TransmitQuery));
    }

    #[test]
    fn parse_stub_tokens() {
        let mut codec = TsCodec::new();
        codec.push_bytes(b"SM;AG0;");
        assert_eq!(
            codec.next_command(),
            Some(TsCommand::Stub { token: "SM".into(), params: String::new() })
        );
        assert_eq!(
            codec.next_command(),
            Some(TsCommand::Stub { token: "AG".into(), params: "0".into() })
        );
    }

    #[test]
    fn garbage_becomes_unknown() {
        let mut codec = TsCodec::new();
        codec.push_bytes(b"Q9zz;");
        assert_eq!(codec.next_command(), Some(TsCommand::Unknown("Q9zz".into())));
    }

    #[test]
    fn frequency_reply_is_eleven_digits() {
        assert_eq!(frequency_response("FA", 14_074_000), "FA00014074000;");
        assert_eq!(frequency_response("FB", 7_074_000), "FB00007074000;");
    }

    #[test]
    fn id_reply_is_ts2000() {
        assert_eq!(id_response(), "ID019;");
    }

    #[test]
    fn if_reply_exact_bytes() {
        let line = if_response(14_074_000, &SliceMode::Digu, false);
        assert_eq!(line, "IF00014074000     +00000000090000  ;");
        assert_eq!(line.len(), 36);
    }

    #[test]
    fn if_reply_reflects_tx_state() {
        let line = if_response(7_074_000, &SliceMode::Usb, true);
        assert!(line.starts_with("IF00007074000"));
        // tx digit is column 27, mode digit column 28
        assert_eq!(&line[27..29], "12");
        assert!(line.ends_with("0000  ;"));
    }

    #[test]
    fn normalized_conversion() {
        use crate::command::CatRequest;

        assert_eq!(
            TsCommand::FrequencyA(None).to_cat_request(None),
            Some(CatRequest::GetFrequency)
        );
        assert_eq!(
            TsCommand::FrequencyA(Some(14_074_000)).to_cat_request(None),
            Some(CatRequest::SetFrequency { hz: 14_074_000 })
        );
        assert_eq!(
            TsCommand::Transmit(Some(true)).to_cat_request(None),
            Some(CatRequest::SetTransmit { on: true })
        );
        assert_eq!(
            TsCommand::Receive.to_cat_request(None),
            Some(CatRequest::SetTransmit { on: false })
        );
        assert_eq!(TsCommand::Info.to_cat_request(None), Some(CatRequest::GetInfo));
        assert_eq!(TsCommand::Id.to_cat_request(None), Some(CatRequest::GetId));

        // Stubs and dialect-local commands have no normalized form
        assert_eq!(TsCommand::AutoInfo(None).to_cat_request(None), None);
        assert_eq!(
            TsCommand::Stub { token: "SM".into(), params: String::new() }.to_cat_request(None),
            None
        );
    }

    #[test]
    fn normalized_mode_set_keeps_data_flavor() {
        use crate::command::CatRequest;

        let got = TsCommand::Mode(Some(2)).to_cat_request(Some(&SliceMode::Digu));
        assert_eq!(got, Some(CatRequest::SetMode { mode: SliceMode::Digu }));

        let got = TsCommand::Mode(Some(2)).to_cat_request(Some(&SliceMode::Cw));
        assert_eq!(got, Some(CatRequest::SetMode { mode: SliceMode::Usb }));

        // Unmapped mode numbers stay dialect-local (answered with silence)
        assert_eq!(TsCommand::Mode(Some(8)).to_cat_request(None), None);
    }

    #[test]
    fn stub_responses_exist_for_all_tokens() {
        for (token, reply) in STUB_TOKENS {
            assert_eq!(stub_response(token), Some(*reply));
            assert!(reply.ends_with(';'));
        }
        assert_eq!(stub_response("ZZ"), None);
    }
}
