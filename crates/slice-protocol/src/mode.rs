//! Operating mode shared by the CAT dialects and the radio backend

use std::fmt;

/// Demodulation mode of a slice
///
/// Covers the modes the decoder app and the TS-2000 dialect can express.
/// Anything else the radio backend reports is preserved verbatim in
/// `Other` so a round trip through the store never loses information.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SliceMode {
    /// Lower sideband
    Lsb,
    /// Upper sideband
    Usb,
    /// CW
    Cw,
    /// CW reverse
    Cwr,
    /// FM
    Fm,
    /// AM
    Am,
    /// RTTY
    Rtty,
    /// Digital, upper sideband
    Digu,
    /// Digital, lower sideband
    Digl,
    /// Unrecognized mode, passed through unchanged
    Other(String),
}

impl SliceMode {
    /// Parse a mode name as reported by the radio backend (case-insensitive)
    pub fn from_backend(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "LSB" => Self::Lsb,
            "USB" => Self::Usb,
            "CW" => Self::Cw,
            "CWR" | "CWL" => Self::Cwr,
            "FM" | "NFM" | "DFM" => Self::Fm,
            "AM" | "SAM" => Self::Am,
            "RTTY" => Self::Rtty,
            "DIGU" => Self::Digu,
            "DIGL" => Self::Digl,
            _ => Self::Other(name.to_string()),
        }
    }

    /// Name in the form the radio backend expects for `slice set ... mode=`
    pub fn backend_name(&self) -> &str {
        match self {
            Self::Lsb => "LSB",
            Self::Usb => "USB",
            Self::Cw => "CW",
            Self::Cwr => "CWR",
            Self::Fm => "FM",
            Self::Am => "AM",
            Self::Rtty => "RTTY",
            Self::Digu => "DIGU",
            Self::Digl => "DIGL",
            Self::Other(s) => s.as_str(),
        }
    }

    /// True for the two data flavors (DIGU/DIGL)
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Digu | Self::Digl)
    }

    /// TS-2000 mode digit for this mode
    ///
    /// DIGU maps to 9 and DIGL to 6 (the RTTY alias) because the TS-2000
    /// command set has no dedicated data-mode numbers the decoder app
    /// understands.
    pub fn ts2000_code(&self) -> u8 {
        match self {
            Self::Lsb => 1,
            Self::Usb => 2,
            Self::Cw => 3,
            Self::Fm => 4,
            Self::Am => 5,
            Self::Rtty => 6,
            Self::Cwr => 7,
            Self::Digu => 9,
            Self::Digl => 6,
            Self::Other(_) => 2,
        }
    }

    /// Interpret a TS-2000 mode digit sent by a CAT peer
    ///
    /// `current` is the mode the slice held when the command arrived. When
    /// the slice is in a data mode and the peer sets plain USB/LSB, the data
    /// flavor is preserved: hams run the decoder app on DIGU while generic
    /// CAT software keeps setting mode 2.
    pub fn from_ts2000_code(code: u8, current: Option<&SliceMode>) -> Option<Self> {
        let base = match code {
            1 => Self::Lsb,
            2 => Self::Usb,
            3 => Self::Cw,
            4 => Self::Fm,
            5 => Self::Am,
            6 => Self::Rtty,
            7 => Self::Cwr,
            9 => Self::Digu,
            _ => return None,
        };

        match (&base, current) {
            (Self::Usb, Some(cur)) if cur.is_data() => Some(Self::Digu),
            (Self::Lsb, Some(cur)) if cur.is_data() => Some(Self::Digl),
            // RTTY inbound doubles as the DIGL alias while in a data mode
            (Self::Rtty, Some(cur)) if cur.is_data() => Some(Self::Digl),
            _ => Some(base),
        }
    }
}

impl fmt::Display for SliceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.backend_name())
    }
}

#[cfg(test)]
mod tests {
    use super::SliceMode;

    #[test]
    fn backend_roundtrip() {
        for name in ["LSB", "USB", "CW", "CWR", "FM", "AM", "RTTY", "DIGU", "DIGL"] {
            let mode = SliceMode::from_backend(name);
            assert_eq!(mode.backend_name(), name);
        }
    }

    #[test]
    fn backend_parse_is_case_insensitive() {
        assert_eq!(SliceMode::from_backend("digu"), SliceMode::Digu);
        assert_eq!(SliceMode::from_backend("Usb"), SliceMode::Usb);
    }

    #[test]
    fn unknown_mode_passes_through() {
        let mode = SliceMode::from_backend("FDV");
        assert_eq!(mode, SliceMode::Other("FDV".to_string()));
        assert_eq!(mode.backend_name(), "FDV");
    }

    #[test]
    fn data_flavor_preserved_on_bare_usb() {
        let got = SliceMode::from_ts2000_code(2, Some(&SliceMode::Digu));
        assert_eq!(got, Some(SliceMode::Digu));

        let got = SliceMode::from_ts2000_code(1, Some(&SliceMode::Digl));
        assert_eq!(got, Some(SliceMode::Digl));
    }

    #[test]
    fn plain_usb_stays_usb() {
        let got = SliceMode::from_ts2000_code(2, Some(&SliceMode::Cw));
        assert_eq!(got, Some(SliceMode::Usb));
        let got = SliceMode::from_ts2000_code(2, None);
        assert_eq!(got, Some(SliceMode::Usb));
    }

    #[test]
    fn unknown_code_rejected() {
        assert_eq!(SliceMode::from_ts2000_code(8, None), None);
        assert_eq!(SliceMode::from_ts2000_code(0, None), None);
    }
}
