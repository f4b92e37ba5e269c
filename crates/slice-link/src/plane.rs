//! Control-plane assembly
//!
//! Wires the store, telemetry listener, command sink, CAT server,
//! supervisor, radio backend client, and coordinator into one running
//! plane behind a [`LinkHandle`]. The daemon and the integration tests use
//! the same assembly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cat::CatServer;
use crate::config::{Config, OperatingProfile};
use crate::coordinator::{Coordinator, CoordinatorChannels, CoordinatorOptions};
use crate::error::LinkError;
use crate::handle::LinkHandle;
use crate::radio::{discover_radio, RadioClient};
use crate::sink::CommandSink;
use crate::state::SliceStore;
use crate::supervisor::Supervisor;
use crate::telemetry::TelemetryListener;

/// How long discovery listens before falling back to the configured host
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Assembly-time knobs
#[derive(Debug, Clone)]
pub struct PlaneOptions {
    /// Coordinator tunables
    pub coordinator: CoordinatorOptions,
    /// UDP port for decoder-app telemetry (0 picks one; tests use that)
    pub telemetry_port: u16,
    /// TCP port of the radio backend
    pub backend_port: u16,
    /// Open the radio backend session (FLEX profile only)
    pub connect_backend: bool,
}

impl Default for PlaneOptions {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorOptions::default(),
            telemetry_port: crate::instance::DEFAULT_TELEMETRY_PORT,
            backend_port: slice_protocol::flex::DEFAULT_PORT,
            connect_backend: true,
        }
    }
}

/// A running control plane
pub struct ControlPlane {
    /// Command surface
    pub handle: LinkHandle,
    /// Port the telemetry listener actually bound
    pub telemetry_port: u16,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ControlPlane {
    /// Bring everything up
    pub async fn start(config: Config, options: PlaneOptions) -> Result<Self, LinkError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let store = Arc::new(SliceStore::new());

        // Telemetry listener + shared reply socket
        let (frames_tx, frames_rx) = mpsc::channel(256);
        let (listener, socket, addresses, counters) =
            TelemetryListener::bind(options.telemetry_port, frames_tx).await?;
        let telemetry_port = socket.local_addr()?.port();
        tasks.push(tokio::spawn(listener.run(shutdown_rx.clone())));

        let sink = CommandSink::new(socket, Arc::clone(&addresses));

        // CAT server and supervisor feed the coordinator
        let (cat_events_tx, cat_events_rx) = mpsc::channel(64);
        let cat = CatServer::new(Arc::clone(&store), cat_events_tx);
        let (exits_tx, exits_rx) = mpsc::channel(16);
        let supervisor = Supervisor::new(exits_tx);

        // Radio backend session (FLEX only). The client task is spawned
        // only after the coordinator has subscribed to the store, so the
        // first push cannot slip past an observer.
        let (backend, backend_client) = if options.connect_backend
            && config.mode == OperatingProfile::Flex
        {
            let host = resolve_backend_host(&config).await;
            info!(%host, port = options.backend_port, "radio backend host resolved");
            let (client, handle) =
                RadioClient::new(host, options.backend_port, Arc::clone(&store));
            (Some(handle), Some(client))
        } else {
            (None, None)
        };

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let channels = CoordinatorChannels {
            frames_rx,
            cat_events_rx,
            exits_rx,
            cmd_rx,
        };
        let (coordinator, events_tx) = Coordinator::new(
            config,
            options.coordinator,
            store,
            cat,
            supervisor,
            sink,
            addresses,
            counters,
            backend,
            channels,
        );
        tasks.push(tokio::spawn(coordinator.run(shutdown_rx.clone())));
        if let Some(client) = backend_client {
            tasks.push(tokio::spawn(client.run(shutdown_rx)));
        }

        Ok(Self {
            handle: LinkHandle::new(cmd_tx, events_tx),
            telemetry_port,
            shutdown_tx,
            tasks,
        })
    }

    /// Signal every task and wait for them to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("task ended abnormally: {}", e);
                }
            }
        }
        info!("control plane stopped");
    }
}

/// Configured host, or discovery, or loopback as the last resort
async fn resolve_backend_host(config: &Config) -> String {
    if !config.flex.host.is_empty() {
        return config.flex.host.clone();
    }
    match discover_radio(slice_protocol::flex::DEFAULT_PORT, DISCOVERY_TIMEOUT).await {
        Some(host) => host,
        None => {
            warn!("no radio discovered and no host configured, trying loopback");
            "127.0.0.1".to_string()
        }
    }
}
