//! CAT server
//!
//! One loopback TCP listener per slice. Every accepted connection runs the
//! dialect auto-detector over its first bytes, then a per-dialect framing
//! loop for the connection's lifetime. All three dialects decode into the
//! normalized [`CatRequest`] and share one semantic layer
//! ([`apply_request`]); only framing and response rendering stay
//! per-dialect. Queries answer from the slice store; set-commands update
//! the store optimistically and emit [`CatEvent`]s the coordinator
//! forwards to the radio backend.
//!
//! Connections are independent: a slow or dead peer never blocks another,
//! and a disconnect never mutates slice state.

use std::collections::HashMap;
use std::sync::Arc;

use slice_protocol::command::{CatRequest, CatResponse};
use slice_protocol::detect::{detect, Detection, Dialect};
use slice_protocol::hrd;
use slice_protocol::kenwood::{self, TsCodec, TsCommand};
use slice_protocol::{hrd_binary, SliceMode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::state::SliceStore;

/// Mutation requested by a CAT peer, to be mirrored to the radio
#[derive(Debug, Clone, PartialEq)]
pub enum CatEvent {
    /// Peer set a frequency
    FrequencyChange {
        /// Slice index
        index: usize,
        /// New frequency in Hz
        hz: u64,
    },
    /// Peer set a mode
    ModeChange {
        /// Slice index
        index: usize,
        /// New mode
        mode: SliceMode,
    },
    /// Peer toggled PTT
    PttChange {
        /// Slice index
        index: usize,
        /// Key down
        on: bool,
    },
}

struct ListenerHandle {
    shutdown_tx: watch::Sender<bool>,
    port: u16,
}

/// Manages the per-slice CAT listeners
pub struct CatServer {
    store: Arc<SliceStore>,
    events_tx: mpsc::Sender<CatEvent>,
    listeners: HashMap<usize, ListenerHandle>,
}

impl CatServer {
    /// New server with no listeners
    pub fn new(store: Arc<SliceStore>, events_tx: mpsc::Sender<CatEvent>) -> Self {
        Self {
            store,
            events_tx,
            listeners: HashMap::new(),
        }
    }

    /// Start the listener for a slice on `port` (0 picks one)
    ///
    /// Returns the bound port. Starting an already-listening slice is a
    /// no-op returning the existing port.
    pub async fn start_listener(&mut self, index: usize, port: u16) -> std::io::Result<u16> {
        if let Some(existing) = self.listeners.get(&index) {
            return Ok(existing.port);
        }

        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let bound = listener.local_addr()?.port();
        info!(index, port = bound, "CAT listener started");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let store = Arc::clone(&self.store);
        let events_tx = self.events_tx.clone();
        tokio::spawn(accept_loop(listener, index, store, events_tx, shutdown_rx));

        self.listeners.insert(index, ListenerHandle { shutdown_tx, port: bound });
        Ok(bound)
    }

    /// Stop the listener for a slice; open connections wind down with it
    pub fn stop_listener(&mut self, index: usize) {
        if let Some(handle) = self.listeners.remove(&index) {
            info!(index, port = handle.port, "CAT listener stopped");
            let _ = handle.shutdown_tx.send(true);
        }
    }

    /// Bound port of a slice's listener
    pub fn port(&self, index: usize) -> Option<u16> {
        self.listeners.get(&index).map(|h| h.port)
    }

    /// Stop everything
    pub fn stop_all(&mut self) {
        let indexes: Vec<usize> = self.listeners.keys().copied().collect();
        for index in indexes {
            self.stop_listener(index);
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    index: usize,
    store: Arc<SliceStore>,
    events_tx: mpsc::Sender<CatEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!(index, %peer, "CAT connection accepted");
                        let store = Arc::clone(&store);
                        let events_tx = events_tx.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, index, store, events_tx, shutdown).await {
                                debug!(index, "CAT connection ended: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!(index, "CAT accept failed: {}", e);
                    }
                }
            }
        }
    }
}

/// Per-connection state shared by the three dialect loops
struct CatSession {
    index: usize,
    store: Arc<SliceStore>,
    events_tx: mpsc::Sender<CatEvent>,
}

impl CatSession {
    fn frequency(&self) -> u64 {
        self.store.snapshot(self.index).map(|s| s.frequency_hz).unwrap_or(0)
    }

    fn mode(&self) -> SliceMode {
        self.store
            .snapshot(self.index)
            .map(|s| s.mode)
            .unwrap_or(SliceMode::Usb)
    }

    fn transmitting(&self) -> bool {
        self.store
            .snapshot(self.index)
            .map(|s| s.transmit)
            .unwrap_or(false)
    }

    async fn set_frequency(&self, hz: u64) {
        // Optimistic write so an immediate re-read is already consistent;
        // the coordinator mirrors the change to the radio. A no-op set
        // never reaches the radio.
        if self.store.set_frequency(self.index, hz) {
            let _ = self
                .events_tx
                .send(CatEvent::FrequencyChange { index: self.index, hz })
                .await;
        }
    }

    async fn set_mode(&self, mode: SliceMode) {
        if self.store.set_mode(self.index, mode.clone()) {
            let _ = self
                .events_tx
                .send(CatEvent::ModeChange { index: self.index, mode })
                .await;
        }
    }

    async fn set_ptt(&self, on: bool) {
        // The single-transmitter invariant is the coordinator's to enforce.
        let _ = self
            .events_tx
            .send(CatEvent::PttChange { index: self.index, on })
            .await;
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    index: usize,
    store: Arc<SliceStore>,
    events_tx: mpsc::Sender<CatEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let session = CatSession { index, store, events_tx };

    // Detection phase: buffer first bytes until the dialect is fixed.
    let mut buf = Vec::with_capacity(64);
    let mut read_buf = [0u8; 256];
    let dialect = loop {
        match detect(&buf) {
            Detection::Selected(d) => break d,
            Detection::NeedMoreData => {}
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
            }
            n = stream.read(&mut read_buf) => {
                let n = n?;
                if n == 0 {
                    return Ok(());
                }
                buf.extend_from_slice(&read_buf[..n]);
            }
        }
    };
    debug!(index, dialect = dialect.name(), "CAT dialect selected");

    match dialect {
        Dialect::TsAscii => run_ts_ascii(stream, buf, session, shutdown).await,
        Dialect::HrdText => run_hrd_text(stream, buf, session, shutdown).await,
        Dialect::HrdBinary => run_hrd_binary(stream, buf, session, shutdown).await,
    }
}

// ---------------------------------------------------------------------------
// Dialect A
// ---------------------------------------------------------------------------

async fn run_ts_ascii(
    mut stream: TcpStream,
    initial: Vec<u8>,
    session: CatSession,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let mut codec = TsCodec::new();
    codec.push_bytes(&initial);
    let mut read_buf = [0u8; 256];

    loop {
        while let Some(command) = codec.next_command() {
            if let Some(reply) = answer_ts(&session, command).await {
                stream.write_all(reply.as_bytes()).await?;
            }
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
            }
            n = stream.read(&mut read_buf) => {
                let n = n?;
                if n == 0 {
                    return Ok(());
                }
                codec.push_bytes(&read_buf[..n]);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Shared semantics: every dialect's requests land here
// ---------------------------------------------------------------------------

/// Execute one normalized request against the slice state
async fn apply_request(session: &CatSession, request: CatRequest) -> CatResponse {
    match request {
        CatRequest::GetFrequency => CatResponse::Frequency { hz: session.frequency() },
        CatRequest::SetFrequency { hz } => {
            session.set_frequency(hz).await;
            CatResponse::Accepted
        }
        CatRequest::SetSplitFrequencies { rx, tx } => {
            // The backend runs a single VFO per slice; the RX value wins and
            // a differing TX value is only worth a log line.
            if rx != tx {
                debug!(rx, tx, "split frequencies requested, using rx");
            }
            session.set_frequency(rx).await;
            CatResponse::Accepted
        }
        CatRequest::GetMode => CatResponse::Mode { mode: session.mode() },
        CatRequest::SetMode { mode } => {
            session.set_mode(mode).await;
            CatResponse::Accepted
        }
        CatRequest::GetTransmit => CatResponse::Transmit { on: session.transmitting() },
        CatRequest::SetTransmit { on } => {
            session.set_ptt(on).await;
            CatResponse::Accepted
        }
        CatRequest::GetInfo => CatResponse::Status {
            hz: session.frequency(),
            mode: session.mode(),
            transmit: session.transmitting(),
        },
        CatRequest::GetId => CatResponse::Id,
        CatRequest::GetVersion => CatResponse::Version,
        CatRequest::GetContext => CatResponse::Context,
        CatRequest::GetRadios => CatResponse::Radios,
        CatRequest::Unknown(line) => {
            debug!(%line, "unknown CAT request");
            CatResponse::Rejected
        }
    }
}

/// Answer one dialect-A command; `None` means no bytes on the wire
/// (sets are silent, and silence is also the dialect's negative ack)
async fn answer_ts(session: &CatSession, command: TsCommand) -> Option<String> {
    // Dialect-local commands never reach the normalized layer.
    let request = match &command {
        TsCommand::AutoInfo(None) => return Some("AI0;".to_string()),
        TsCommand::AutoInfo(Some(_)) | TsCommand::Power(Some(_)) => return None,
        TsCommand::Power(None) => return Some("PS1;".to_string()),
        TsCommand::Stub { token, params } => {
            return if params.is_empty() {
                kenwood::stub_response(token).map(str::to_string)
            } else {
                None
            };
        }
        TsCommand::Unknown(cmd) => {
            debug!(%cmd, "unknown dialect-A command");
            return None;
        }
        other => {
            let current = session.mode();
            match other.to_cat_request(Some(&current)) {
                Some(request) => request,
                None => {
                    debug!(?other, "dialect-A command without normalized form ignored");
                    return None;
                }
            }
        }
    };

    match apply_request(session, request).await {
        CatResponse::Frequency { hz } => {
            let prefix = match command {
                TsCommand::FrequencyB(_) => "FB",
                _ => "FA",
            };
            Some(kenwood::frequency_response(prefix, hz))
        }
        CatResponse::Mode { mode } => Some(kenwood::mode_response(&mode)),
        CatResponse::Transmit { on } => {
            // Only the explicit query form replies; TX/RX sets are silent.
            match command {
                TsCommand::TransmitQuery | TsCommand::Transmit(None) => {
                    Some(kenwood::transmit_query_response(on))
                }
                _ => None,
            }
        }
        CatResponse::Status { hz, mode, transmit } => {
            Some(kenwood::if_response(hz, &mode, transmit))
        }
        CatResponse::Id => Some(kenwood::id_response()),
        CatResponse::Accepted | CatResponse::Rejected => None,
        CatResponse::Version | CatResponse::Context | CatResponse::Radios => None,
    }
}

async fn run_hrd_text(
    mut stream: TcpStream,
    initial: Vec<u8>,
    session: CatSession,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let mut buf = initial;
    let mut read_buf = [0u8; 256];

    loop {
        while let Some(pos) = buf.iter().position(|&b| b == b'\r') {
            let line_bytes: Vec<u8> = buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]);
            // Tolerate CRLF peers
            let line = line.trim_matches('\n');

            let request = hrd::parse_request(line);
            let response = apply_request(&session, request).await;
            let mut reply = hrd::encode_response(&response);
            reply.push('\r');
            stream.write_all(reply.as_bytes()).await?;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
            }
            n = stream.read(&mut read_buf) => {
                let n = n?;
                if n == 0 {
                    return Ok(());
                }
                buf.extend_from_slice(&read_buf[..n]);
            }
        }
    }
}

async fn run_hrd_binary(
    mut stream: TcpStream,
    initial: Vec<u8>,
    session: CatSession,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let mut buf = initial;
    let mut read_buf = [0u8; 512];

    loop {
        loop {
            match hrd_binary::decode_frame(&buf) {
                Ok(Some((command, consumed))) => {
                    buf.drain(..consumed);
                    let request = hrd::parse_request(&command);
                    let response = apply_request(&session, request).await;
                    let reply = hrd::encode_response(&response);
                    stream.write_all(&hrd_binary::encode_frame(&reply)).await?;
                }
                Ok(None) => break,
                Err(e) => {
                    // Framing is unrecoverable mid-stream; drop the peer.
                    warn!("HRD binary framing error: {}", e);
                    return Ok(());
                }
            }
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
            }
            n = stream.read(&mut read_buf) => {
                let n = n?;
                if n == 0 {
                    return Ok(());
                }
                buf.extend_from_slice(&read_buf[..n]);
            }
        }
    }
}
