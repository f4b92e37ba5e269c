//! CAT dialect B: Ham Radio Deluxe text
//!
//! Requests are lowercase verb phrases terminated by `\r`, optionally
//! prefixed with a bracketed context (`[1] get frequency`) which is
//! stripped before parsing. Responses are raw ASCII, also `\r`-terminated.
//!
//! The grammar decodes straight into the normalized [`CatRequest`];
//! [`encode_response`] renders the answers. Dialect C (HRD v5 binary)
//! reuses both with different framing; see [`crate::hrd_binary`].

use crate::command::{CatRequest, CatResponse};
use crate::mode::SliceMode;

/// Parse one request line (terminator already removed)
pub fn parse_request(line: &str) -> CatRequest {
    let line = strip_context(line.trim());
    let lower = line.to_ascii_lowercase();
    let tokens: Vec<&str> = lower.split_whitespace().collect();

    match tokens.as_slice() {
        ["get", "frequency"] | ["get", "frequency-hz"] => CatRequest::GetFrequency,
        ["set", "frequency-hz", n] => match n.parse::<u64>() {
            Ok(hz) => CatRequest::SetFrequency { hz },
            Err(_) => CatRequest::Unknown(line.to_string()),
        },
        ["set", "frequencies-hz", rx, tx] => match (rx.parse::<u64>(), tx.parse::<u64>()) {
            (Ok(rx), Ok(tx)) => CatRequest::SetSplitFrequencies { rx, tx },
            _ => CatRequest::Unknown(line.to_string()),
        },
        ["get", "mode"] => CatRequest::GetMode,
        ["set", "dropdown", "mode", ..] if tokens.len() >= 4 => {
            // Mode names keep their original case from the raw line
            let raw_tokens: Vec<&str> = line.split_whitespace().collect();
            CatRequest::SetMode {
                mode: SliceMode::from_backend(&raw_tokens[3..].join(" ")),
            }
        }
        ["get", "button-select", "tx"] => CatRequest::GetTransmit,
        ["set", "button-select", "tx", v] => CatRequest::SetTransmit { on: *v != "0" },
        ["get", "radios"] => CatRequest::GetRadios,
        ["get", "id"] => CatRequest::GetId,
        ["get", "version"] => CatRequest::GetVersion,
        ["get", "context"] => CatRequest::GetContext,
        _ => CatRequest::Unknown(line.to_string()),
    }
}

/// Strip a leading `[context] ` prefix
fn strip_context(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix('[') {
        if let Some(close) = rest.find(']') {
            return rest[close + 1..].trim_start();
        }
    }
    line
}

/// Identity string for `get id`
pub const ID_RESPONSE: &str = "SliceLink";

/// Version string for `get version`
pub const VERSION_RESPONSE: &str = "v5.0 SliceLink";

/// Context string for `get context`
pub const CONTEXT_RESPONSE: &str = "[1]";

/// Radio list for `get radios`
pub const RADIOS_RESPONSE: &str = "1:SliceLink";

/// Negative acknowledgement for malformed requests
pub const ERROR_RESPONSE: &str = "ERROR";

/// Acknowledgement for accepted set-commands
pub const OK_RESPONSE: &str = "OK";

/// Render a response as dialect-B text (without the `\r` terminator)
pub fn encode_response(response: &CatResponse) -> String {
    match response {
        CatResponse::Frequency { hz } => hz.to_string(),
        CatResponse::Mode { mode } => mode_name(mode),
        CatResponse::Transmit { on } => u8::from(*on).to_string(),
        // The B grammar has no status query; answer with the frequency,
        // which is the closest thing a peer could do with the reply.
        CatResponse::Status { hz, .. } => hz.to_string(),
        CatResponse::Id => ID_RESPONSE.to_string(),
        CatResponse::Version => VERSION_RESPONSE.to_string(),
        CatResponse::Context => CONTEXT_RESPONSE.to_string(),
        CatResponse::Radios => RADIOS_RESPONSE.to_string(),
        CatResponse::Accepted => OK_RESPONSE.to_string(),
        CatResponse::Rejected => ERROR_RESPONSE.to_string(),
    }
}

/// Mode name as the HRD dropdown shows it
pub fn mode_name(mode: &SliceMode) -> String {
    mode.backend_name().to_ascii_uppercase()
}
