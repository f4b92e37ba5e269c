//! Telemetry listener
//!
//! One UDP socket receives every decoder-app instance's telemetry; frames
//! are demultiplexed by the instance id embedded in each message. Parse
//! errors are counted and never stall the receive loop.
//!
//! The same socket doubles as the reply path: the last source address seen
//! for each instance id is recorded so [`crate::sink::CommandSink`] can
//! send commands back without any per-instance port bookkeeping.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use slice_protocol::wsjtx::{self, TelemetryFrame};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Counters for dropped datagrams
#[derive(Debug, Default)]
pub struct TelemetryCounters {
    /// Datagrams shorter than a frame header
    pub short: AtomicU64,
    /// Datagrams with the wrong magic
    pub bad_magic: AtomicU64,
    /// Datagrams that failed payload parsing
    pub malformed: AtomicU64,
}

impl TelemetryCounters {
    /// Sum of all drop reasons
    pub fn total_dropped(&self) -> u64 {
        self.short.load(Ordering::Relaxed)
            + self.bad_magic.load(Ordering::Relaxed)
            + self.malformed.load(Ordering::Relaxed)
    }
}

/// Last-seen source address per instance id
///
/// Shared between the listener (writer) and the command sink (reader).
#[derive(Debug, Default)]
pub struct InstanceAddresses {
    map: Mutex<HashMap<String, SocketAddr>>,
}

impl InstanceAddresses {
    fn record(&self, id: &str, addr: SocketAddr) {
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(id.to_string(), addr);
    }

    /// Address the instance last sent from
    pub fn lookup(&self, id: &str) -> Option<SocketAddr> {
        let map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        map.get(id).copied()
    }

    /// Forget an instance (called when it stops)
    pub fn forget(&self, id: &str) {
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(id);
    }
}

/// The listener task
pub struct TelemetryListener {
    socket: Arc<UdpSocket>,
    addresses: Arc<InstanceAddresses>,
    counters: Arc<TelemetryCounters>,
    frames_tx: mpsc::Sender<TelemetryFrame>,
}

impl TelemetryListener {
    /// Bind the well-known telemetry port
    ///
    /// Returns the listener plus the shared pieces the rest of the plane
    /// needs: the socket (for the command sink), the address table, and the
    /// drop counters.
    pub async fn bind(
        port: u16,
        frames_tx: mpsc::Sender<TelemetryFrame>,
    ) -> std::io::Result<(Self, Arc<UdpSocket>, Arc<InstanceAddresses>, Arc<TelemetryCounters>)>
    {
        let socket = Arc::new(UdpSocket::bind(("0.0.0.0", port)).await?);
        info!(port, "telemetry listener bound");

        let addresses = Arc::new(InstanceAddresses::default());
        let counters = Arc::new(TelemetryCounters::default());
        let listener = Self {
            socket: Arc::clone(&socket),
            addresses: Arc::clone(&addresses),
            counters: Arc::clone(&counters),
            frames_tx,
        };
        Ok((listener, socket, addresses, counters))
    }

    /// Receive loop; runs until shutdown
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut buf = vec![0u8; 2048];
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("telemetry listener stopping");
                        break;
                    }
                }
                recv = self.socket.recv_from(&mut buf) => {
                    match recv {
                        Ok((len, addr)) => self.handle_datagram(&buf[..len], addr).await,
                        Err(e) => {
                            warn!("telemetry receive error: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn handle_datagram(&self, datagram: &[u8], addr: SocketAddr) {
        use slice_protocol::ParseError;

        match wsjtx::decode(datagram) {
            Ok(Some(frame)) => {
                self.addresses.record(frame.id(), addr);
                debug!(id = frame.id(), from = %addr, "telemetry frame");
                // The frame channel applies backpressure only to dispatch;
                // UDP itself has none and overload shows up as drops here.
                if self.frames_tx.send(frame).await.is_err() {
                    warn!("telemetry consumer gone, stopping dispatch");
                }
            }
            Ok(None) => {
                // Well-formed frame of a type we do not handle
            }
            Err(ParseError::Truncated { .. }) => {
                self.counters.short.fetch_add(1, Ordering::Relaxed);
            }
            Err(ParseError::BadMagic { got, .. }) => {
                self.counters.bad_magic.fetch_add(1, Ordering::Relaxed);
                debug!("dropped datagram with bad magic {got:#010x}");
            }
            Err(_) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
