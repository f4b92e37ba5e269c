//! SliceLink Wire Codecs
//!
//! This crate provides parsing and encoding for the wire formats the
//! SliceLink control plane speaks:
//!
//! - **Decoder-app telemetry**: Qt `QDataStream` framed UDP messages
//!   (big-endian, UTF-16BE strings) in both directions
//! - **CAT dialect A**: TS-2000-like ASCII, semicolon-terminated
//! - **CAT dialect B**: Ham Radio Deluxe text, CR-terminated
//! - **CAT dialect C**: HRD v5 binary frames wrapping the dialect-B grammar
//! - **Radio backend**: newline-delimited ASCII command/status lines plus
//!   discovery datagrams
//!
//! Everything here is pure functions and streaming codecs over byte
//! buffers; sockets live in `slice-link`. The CAT dialects decode into the
//! normalized [`command::CatRequest`] / [`command::CatResponse`] pair so
//! one semantic layer serves all three framings.
//!
//! # Dialect detection
//!
//! The three CAT dialects share one TCP port. [`detect::detect`] inspects
//! the first bytes of a connection and fixes the dialect for its lifetime:
//!
//! ```rust
//! use slice_protocol::detect::{detect, Detection, Dialect};
//!
//! assert_eq!(detect(b"FA;"), Detection::Selected(Dialect::TsAscii));
//! assert_eq!(detect(b"get frequency\r"), Detection::Selected(Dialect::HrdText));
//! ```

pub mod command;
pub mod detect;
pub mod error;
pub mod flex;
pub mod hrd;
pub mod hrd_binary;
pub mod kenwood;
pub mod mode;
pub mod qt;
pub mod wsjtx;

pub use command::{CatRequest, CatResponse};
pub use detect::{Detection, Dialect};
pub use error::{ParseError, ProtocolError};
pub use mode::SliceMode;
