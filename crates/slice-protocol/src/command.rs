//! Normalized CAT commands
//!
//! The three CAT dialects differ only on the wire; their meaning collapses
//! onto one request/response pair. Dialect decoders produce a
//! [`CatRequest`], one shared semantic layer answers it with a
//! [`CatResponse`], and each dialect renders that response in its own
//! framing. Anything a dialect cannot express normalized (the TS-2000 stub
//! probes, `AI`, `PS`) stays in that dialect's own command type.

pub use crate::mode::SliceMode;

/// One semantic request from a CAT peer
#[derive(Debug, Clone, PartialEq)]
pub enum CatRequest {
    /// Read the slice frequency
    GetFrequency,
    /// Set the slice frequency
    SetFrequency {
        /// New frequency in Hz
        hz: u64,
    },
    /// Set RX and TX frequencies at once (HRD split form)
    SetSplitFrequencies {
        /// Receive frequency in Hz
        rx: u64,
        /// Transmit frequency in Hz
        tx: u64,
    },
    /// Read the slice mode
    GetMode,
    /// Set the slice mode
    SetMode {
        /// New mode
        mode: SliceMode,
    },
    /// Read the transmit state
    GetTransmit,
    /// Key or unkey the transmitter
    SetTransmit {
        /// Key down
        on: bool,
    },
    /// Read the combined status (the TS-2000 `IF` line)
    GetInfo,
    /// Identify the rig/server
    GetId,
    /// Server version string
    GetVersion,
    /// Session context string
    GetContext,
    /// Available radio list
    GetRadios,
    /// Anything the dialect grammar did not recognize
    Unknown(String),
}

/// One semantic answer to a [`CatRequest`]
#[derive(Debug, Clone, PartialEq)]
pub enum CatResponse {
    /// Frequency report
    Frequency {
        /// Frequency in Hz
        hz: u64,
    },
    /// Mode report
    Mode {
        /// Current mode
        mode: SliceMode,
    },
    /// Transmit-state report
    Transmit {
        /// Keyed
        on: bool,
    },
    /// Combined status report
    Status {
        /// Frequency in Hz
        hz: u64,
        /// Current mode
        mode: SliceMode,
        /// Keyed
        transmit: bool,
    },
    /// Identity report
    Id,
    /// Version report
    Version,
    /// Context report
    Context,
    /// Radio-list report
    Radios,
    /// Set-command accepted
    Accepted,
    /// Negative acknowledgement
    Rejected,
}

impl CatRequest {
    /// True for the set forms (which mutate slice state)
    pub fn is_set(&self) -> bool {
        matches!(
            self,
            Self::SetFrequency { .. }
                | Self::SetSplitFrequencies { .. }
                | Self::SetMode { .. }
                | Self::SetTransmit { .. }
        )
    }
}
