//! Radio backend client
//!
//! Persistent line-oriented TCP session to the SDR. Push messages mutate
//! the slice store; outbound mutations arrive on a bounded command queue
//! and leave the socket as sequence-numbered `C<seq>|...` lines.
//!
//! The session reconnects forever with capped exponential backoff and full
//! jitter. While disconnected, queued mutations are dropped with a warning
//! rather than buffered without bound.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use slice_protocol::flex::{self, BackendMessage};
use slice_protocol::SliceMode;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::state::SliceStore;

/// Reconnect backoff floor
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Reconnect backoff ceiling
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Bound of the outbound command queue
pub const COMMAND_QUEUE_BOUND: usize = 64;

/// One mutation bound for the radio
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    /// Tune a slice
    Tune {
        /// Slice index
        index: usize,
        /// New frequency in Hz
        hz: u64,
    },
    /// Change a slice's mode
    SetMode {
        /// Slice index
        index: usize,
        /// New mode
        mode: SliceMode,
    },
    /// Global transmit toggle
    Xmit(bool),
}

impl BackendCommand {
    fn body(&self) -> String {
        match self {
            Self::Tune { index, hz } => flex::tune_command(*index, *hz),
            Self::SetMode { index, mode } => flex::mode_command(*index, mode),
            Self::Xmit(on) => flex::xmit_command(*on),
        }
    }
}

/// Cheap handle for submitting backend commands
#[derive(Clone)]
pub struct BackendHandle {
    tx: mpsc::Sender<BackendCommand>,
    connected: watch::Receiver<bool>,
}

impl BackendHandle {
    /// Submit a command without waiting
    ///
    /// Soft-fails when the session is down or the queue is full; the caller
    /// relays the short error to the CAT peer.
    pub fn submit(&self, command: BackendCommand) -> Result<(), LinkError> {
        if !*self.connected.borrow() {
            return Err(LinkError::BackendDisconnected);
        }
        self.tx.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(cmd) => {
                warn!(?cmd, "backend command queue full, dropping");
                LinkError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => LinkError::ChannelClosed,
        })
    }

    /// True while the TCP session is up
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Watch for session state changes
    pub fn connection_watch(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }
}

/// The session task
pub struct RadioClient {
    host: String,
    port: u16,
    store: Arc<SliceStore>,
    cmd_rx: mpsc::Receiver<BackendCommand>,
    connected_tx: watch::Sender<bool>,
    seq: u32,
}

impl RadioClient {
    /// Build the client and its submission handle
    pub fn new(host: String, port: u16, store: Arc<SliceStore>) -> (Self, BackendHandle) {
        let (tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_BOUND);
        let (connected_tx, connected_rx) = watch::channel(false);
        let client = Self {
            host,
            port,
            store,
            cmd_rx,
            connected_tx,
            seq: 0,
        };
        let handle = BackendHandle { tx, connected: connected_rx };
        (client, handle)
    }

    /// Run the session until shutdown, reconnecting forever
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let addr = format!("{}:{}", self.host, self.port);
            match TcpStream::connect(&addr).await {
                Ok(stream) => {
                    info!(%addr, "radio backend connected");
                    attempt = 0;
                    let _ = self.connected_tx.send(true);

                    let result = self.session(stream, &mut shutdown).await;
                    let _ = self.connected_tx.send(false);
                    match result {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost(reason) => {
                            warn!(%addr, %reason, "radio backend session lost");
                        }
                    }
                }
                Err(e) => {
                    debug!(%addr, "connect failed: {}", e);
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = backoff_delay(attempt);
            debug!(attempt, ?delay, "reconnect backoff");
            if !self.backoff_wait(delay, &mut shutdown).await {
                break;
            }
        }
        info!("radio backend client stopped");
    }

    /// One connected session; returns why it ended
    async fn session(
        &mut self,
        stream: TcpStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        // Subscribe to slice state and ask for the current list.
        for body in [flex::SUBSCRIBE_COMMAND, flex::SLICE_LIST_COMMAND] {
            if let Err(e) = self.write_command(&mut write_half, body).await {
                return SessionEnd::Lost(format!("subscribe write: {e}"));
            }
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return SessionEnd::Shutdown;
                    }
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => self.handle_line(&line),
                        Ok(None) => return SessionEnd::Lost("peer closed".into()),
                        Err(e) => return SessionEnd::Lost(format!("read: {e}")),
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        return SessionEnd::Shutdown;
                    };
                    let body = cmd.body();
                    if let Err(e) = self.write_command(&mut write_half, &body).await {
                        return SessionEnd::Lost(format!("write: {e}"));
                    }
                }
            }
        }
    }

    fn handle_line(&self, line: &str) {
        if line.is_empty() {
            return;
        }
        match flex::parse_line(line) {
            BackendMessage::Status { message, .. } => {
                if let Some(update) = flex::parse_slice_status(&message) {
                    self.store.apply_push(&update);
                } else {
                    debug!(%message, "non-slice status ignored");
                }
            }
            BackendMessage::Reply { seq, code, .. } => {
                debug!(seq, %code, "command reply");
            }
            BackendMessage::Version(v) => info!(version = %v, "radio protocol version"),
            BackendMessage::Handle(h) => debug!(handle = %h, "session handle assigned"),
            BackendMessage::Unknown(l) => debug!(line = %l, "unrecognized backend line"),
        }
    }

    async fn write_command(
        &mut self,
        writer: &mut OwnedWriteHalf,
        body: &str,
    ) -> std::io::Result<()> {
        self.seq = self.seq.wrapping_add(1);
        let line = flex::command_line(self.seq, body);
        debug!(line = line.trim_end(), "backend command");
        writer.write_all(line.as_bytes()).await
    }

    /// Sleep out the backoff, dropping any commands submitted meanwhile.
    /// Returns false when shutdown fired.
    async fn backoff_wait(&mut self, delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        let deadline = tokio::time::Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return true,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return false;
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => warn!(?cmd, "backend disconnected, dropping command"),
                        None => return false,
                    }
                }
            }
        }
    }
}

enum SessionEnd {
    Shutdown,
    Lost(String),
}

/// Full-jitter exponential backoff: uniform in (0, min(cap, base * 2^n)]
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.as_millis().saturating_mul(1u128 << attempt.min(16)) as u64;
    let ceiling = exp.min(BACKOFF_CAP.as_millis() as u64).max(1);
    let jittered = rand::thread_rng().gen_range(1..=ceiling);
    Duration::from_millis(jittered)
}

/// Listen for a discovery broadcast, returning the announced host
///
/// Falls back to `None` when nothing valid arrives within `timeout`.
pub async fn discover_radio(port: u16, timeout: Duration) -> Option<String> {
    let socket = match UdpSocket::bind(("0.0.0.0", port)).await {
        Ok(s) => s,
        Err(e) => {
            warn!(port, "discovery bind failed: {}", e);
            return None;
        }
    };

    let mut buf = vec![0u8; 1024];
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let recv = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await;
        match recv {
            Ok(Ok((len, from))) => {
                if let Some(info) = flex::parse_discovery(&buf[..len]) {
                    info!(ip = %info.ip, model = ?info.fields.get("model"), %from, "radio discovered");
                    return Some(info.ip);
                }
            }
            Ok(Err(e)) => {
                warn!("discovery receive error: {}", e);
                return None;
            }
            Err(_) => {
                debug!("discovery timed out");
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slice_protocol::flex::SliceUpdate;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn accept_one(listener: TcpListener) -> TcpStream {
        let (stream, _) = listener.accept().await.unwrap();
        stream
    }

    #[tokio::test]
    async fn session_subscribes_then_forwards_commands() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let store = Arc::new(SliceStore::new());
        let (client, handle) = RadioClient::new("127.0.0.1".into(), port, Arc::clone(&store));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(client.run(shutdown_rx));

        let mut radio = accept_one(listener).await;
        let mut buf = vec![0u8; 256];
        let mut text = String::new();
        while !text.contains("C2|slice list\n") {
            let n = radio.read(&mut buf).await.unwrap();
            assert!(n > 0, "radio session closed early");
            text.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        assert!(text.contains("C1|sub slice all\n"), "{text}");

        // Wait for the connection watch to flip before submitting
        let mut watch = handle.connection_watch();
        if !*watch.borrow() {
            watch.changed().await.unwrap();
        }
        handle.submit(BackendCommand::Tune { index: 0, hz: 14_076_000 }).unwrap();

        let n = radio.read(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf[..n]).to_string();
        assert_eq!(text, "C3|slice tune 0 14.076000\n");

        task.abort();
    }

    #[tokio::test]
    async fn push_lines_mutate_the_store() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let store = Arc::new(SliceStore::new());
        let mut events = store.subscribe();
        let (client, _handle) = RadioClient::new("127.0.0.1".into(), port, Arc::clone(&store));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(client.run(shutdown_rx));

        let mut radio = accept_one(listener).await;
        let mut drain = vec![0u8; 256];
        let _ = radio.read(&mut drain).await.unwrap();

        radio
            .write_all(b"S1|slice 0 in_use=1 RF_frequency=14.074000 mode=USB\n")
            .await
            .unwrap();

        let event = events.recv().await.unwrap();
        match event {
            crate::state::SliceEvent::Added(s) => {
                assert_eq!(s.index, 0);
                assert_eq!(s.frequency_hz, 14_074_000);
                assert_eq!(s.mode, SliceMode::Usb);
            }
            other => panic!("expected Added, got {other:?}"),
        }

        task.abort();
    }

    #[tokio::test]
    async fn submit_fails_softly_when_disconnected() {
        let store = Arc::new(SliceStore::new());
        // Port 1 on localhost: connect will fail, session stays down
        let (client, handle) = RadioClient::new("127.0.0.1".into(), 1, store);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(client.run(shutdown_rx));

        let err = handle.submit(BackendCommand::Xmit(true)).unwrap_err();
        assert!(matches!(err, LinkError::BackendDisconnected));

        task.abort();
    }

    #[test]
    fn backoff_is_capped_and_jittered() {
        for attempt in 1..20 {
            let d = backoff_delay(attempt);
            assert!(d > Duration::ZERO);
            assert!(d <= BACKOFF_CAP);
        }
    }

    #[test]
    fn idempotent_push_parse() {
        // Belt-and-braces: the store path used by handle_line
        let update = flex::parse_slice_status("slice 0 in_use=1 RF_frequency=14.074000").unwrap();
        assert_eq!(
            update,
            SliceUpdate {
                index: 0,
                frequency_hz: Some(14_074_000),
                in_use: Some(true),
                ..SliceUpdate::default()
            }
        );
    }
}
