//! Slice-to-instance coordinator
//!
//! The one task that owns the control plane's lifecycle decisions. It
//! consumes slice events from the store, telemetry frames from the
//! listener, mutation events from the CAT server, child exits from the
//! supervisor, and operator commands from [`crate::handle::LinkHandle`],
//! and it publishes the unified [`LinkEvent`] stream.
//!
//! Dependencies run one way: the coordinator knows the store, the CAT
//! server, the backend handle, and the supervisor; none of them know the
//! coordinator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use slice_protocol::wsjtx::{DecodeFrame, DecoderCommand, TelemetryFrame};
use slice_protocol::SliceMode;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::cat::{CatEvent, CatServer};
use crate::config::{Config, OperatingProfile};
use crate::error::LinkError;
use crate::events::LinkEvent;
use crate::instance::{self, DecoderInstance, IniParams};
use crate::qso::{run_qso, QsoConfig, QsoOutcome};
use crate::radio::{BackendCommand, BackendHandle};
use crate::sink::CommandSink;
use crate::state::{SliceEvent, SliceStore};
use crate::supervisor::{ChildExit, SpawnSpec, Supervisor};
use crate::telemetry::{InstanceAddresses, TelemetryCounters};

/// Capacity of the public event bus
const EVENT_BUS_CAPACITY: usize = 512;

/// Operator/tool command into the coordinator
#[derive(Debug)]
pub enum CoordinatorCommand {
    /// Bind a decoder instance to a slice by hand
    StartInstance {
        /// Slice index to bind
        index: usize,
        /// Replies with the instance id
        resp: oneshot::Sender<Result<String, LinkError>>,
    },
    /// Tear an instance down
    StopInstance {
        /// Instance to stop
        instance_id: String,
        /// Completion
        resp: oneshot::Sender<Result<(), LinkError>>,
    },
    /// Run an automated QSO on an instance
    ExecuteQso {
        /// Instance to run on
        instance_id: String,
        /// Station to work
        target_call: String,
        /// Accepted or rejected synchronously
        resp: oneshot::Sender<Result<(), LinkError>>,
    },
    /// Stop transmitting on one instance, or everywhere
    HaltTx {
        /// Specific instance, or `None` for all
        instance_id: Option<String>,
        /// Completion
        resp: oneshot::Sender<Result<(), LinkError>>,
    },
    /// Tune the slice behind an instance
    SetFrequency {
        /// Instance whose slice to tune
        instance_id: String,
        /// New frequency in Hz
        hz: u64,
        /// Completion
        resp: oneshot::Sender<Result<(), LinkError>>,
    },
    /// Change the mode of the slice behind an instance
    SetMode {
        /// Instance whose slice to change
        instance_id: String,
        /// New mode
        mode: SliceMode,
        /// Completion
        resp: oneshot::Sender<Result<(), LinkError>>,
    },
    /// Reply to a heard station through the decoder's sequencer
    ReplyToStation {
        /// Instance that heard it
        instance_id: String,
        /// The decode to answer
        decode: DecodeFrame,
        /// Completion
        resp: oneshot::Sender<Result<(), LinkError>>,
    },
    /// Best-effort, idempotent: halt all TX and clear all transmit flags
    EmergencyStop {
        /// Completion; never an error
        resp: oneshot::Sender<()>,
    },
    /// Snapshot of everything for tools and the dashboard
    Status {
        /// Reply channel
        resp: oneshot::Sender<StatusReport>,
    },
}

/// Everything `status()` reports
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// Backend TCP session up
    pub backend_connected: bool,
    /// All in-use slices
    pub slices: Vec<crate::state::Slice>,
    /// All bound instances
    pub instances: Vec<InstanceStatus>,
    /// Telemetry datagrams dropped so far
    pub telemetry_dropped: u64,
}

/// Per-instance slice of the status report
#[derive(Debug, Clone)]
pub struct InstanceStatus {
    /// Instance id
    pub instance_id: String,
    /// Slice it serves
    pub slice_index: usize,
    /// Port of the slice's CAT listener
    pub cat_port: u16,
    /// Child process alive
    pub running: bool,
    /// QSO state name, if one is active
    pub qso_target: Option<String>,
    /// Milliseconds since epoch of the last heartbeat, 0 before the first
    pub last_heartbeat_ms: u64,
}

struct ActiveQso {
    target_call: String,
    decode_tx: mpsc::Sender<DecodeFrame>,
    halt_tx: watch::Sender<bool>,
}

struct InstanceEntry {
    record: DecoderInstance,
    qso: Option<ActiveQso>,
}

/// Tunables the daemon and the tests configure differently
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Spawn real decoder-app children (tests turn this off)
    pub spawn_children: bool,
    /// React to `slice-added` by binding an instance automatically
    pub auto_bind: bool,
    /// Directory the per-instance INI files are written to
    pub ini_dir: std::path::PathBuf,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            spawn_children: true,
            auto_bind: true,
            ini_dir: std::env::temp_dir().join("slicelink"),
        }
    }
}

/// The coordinator task
pub struct Coordinator {
    config: Config,
    options: CoordinatorOptions,
    store: Arc<SliceStore>,
    cat: CatServer,
    supervisor: Supervisor,
    sink: CommandSink,
    addresses: Arc<InstanceAddresses>,
    counters: Arc<TelemetryCounters>,
    backend: Option<BackendHandle>,

    instances: HashMap<String, InstanceEntry>,
    events_tx: broadcast::Sender<LinkEvent>,

    slice_events: broadcast::Receiver<SliceEvent>,
    frames_rx: mpsc::Receiver<TelemetryFrame>,
    cat_events_rx: mpsc::Receiver<CatEvent>,
    exits_rx: mpsc::Receiver<ChildExit>,
    cmd_rx: mpsc::Receiver<CoordinatorCommand>,
    qso_done_tx: mpsc::Sender<(String, String, QsoOutcome)>,
    qso_done_rx: mpsc::Receiver<(String, String, QsoOutcome)>,
}

/// Channels the daemon wires into the coordinator
pub struct CoordinatorChannels {
    /// Telemetry frames from the listener
    pub frames_rx: mpsc::Receiver<TelemetryFrame>,
    /// CAT mutation events
    pub cat_events_rx: mpsc::Receiver<CatEvent>,
    /// Child exits from the supervisor
    pub exits_rx: mpsc::Receiver<ChildExit>,
    /// Operator commands
    pub cmd_rx: mpsc::Receiver<CoordinatorCommand>,
}

impl Coordinator {
    /// Assemble the coordinator
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        options: CoordinatorOptions,
        store: Arc<SliceStore>,
        cat: CatServer,
        supervisor: Supervisor,
        sink: CommandSink,
        addresses: Arc<InstanceAddresses>,
        counters: Arc<TelemetryCounters>,
        backend: Option<BackendHandle>,
        channels: CoordinatorChannels,
    ) -> (Self, broadcast::Sender<LinkEvent>) {
        let (events_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let (qso_done_tx, qso_done_rx) = mpsc::channel(16);
        let slice_events = store.subscribe();
        let coordinator = Self {
            config,
            options,
            store,
            cat,
            supervisor,
            sink,
            addresses,
            counters,
            backend,
            instances: HashMap::new(),
            events_tx: events_tx.clone(),
            slice_events,
            frames_rx: channels.frames_rx,
            cat_events_rx: channels.cat_events_rx,
            exits_rx: channels.exits_rx,
            cmd_rx: channels.cmd_rx,
            qso_done_tx,
            qso_done_rx,
        };
        (coordinator, events_tx)
    }

    /// Run until shutdown
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut backend_watch = self.backend.as_ref().map(|b| b.connection_watch());
        info!(profile = ?self.config.mode, "coordinator started");

        if self.config.mode == OperatingProfile::Standard {
            if let Err(e) = self.start_standard_instance().await {
                warn!("standard instance start failed: {}", e);
            }
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                slice_event = self.slice_events.recv() => {
                    match slice_event {
                        Ok(event) => self.on_slice_event(event).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(missed = n, "slice event stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                Some(frame) = self.frames_rx.recv() => {
                    self.on_telemetry(frame).await;
                }
                Some(event) = self.cat_events_rx.recv() => {
                    self.on_cat_event(event).await;
                }
                Some(exit) = self.exits_rx.recv() => {
                    self.on_child_exit(exit).await;
                }
                Some(cmd) = self.cmd_rx.recv() => {
                    self.on_command(cmd).await;
                }
                Some((instance_id, target, outcome)) = self.qso_done_rx.recv() => {
                    self.on_qso_done(instance_id, target, outcome);
                }
                changed = async {
                    match backend_watch.as_mut() {
                        Some(watch) => watch.changed().await.is_ok(),
                        None => std::future::pending().await,
                    }
                } => {
                    if changed {
                        let up = backend_watch.as_ref().map(|w| *w.borrow()).unwrap_or(false);
                        if up {
                            let host = self.config.flex.host.clone();
                            let _ = self.events_tx.send(LinkEvent::BackendConnected { host });
                        } else {
                            let _ = self.events_tx.send(LinkEvent::BackendDisconnected);
                        }
                    }
                }
            }
        }

        info!("coordinator shutting down");
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        let ids: Vec<String> = self.instances.keys().cloned().collect();
        for id in ids {
            let _ = self.stop_instance(&id, "shutdown").await;
        }
        self.cat.stop_all();
        self.supervisor.stop_all().await;
    }

    // -----------------------------------------------------------------
    // Slice lifecycle
    // -----------------------------------------------------------------

    async fn on_slice_event(&mut self, event: SliceEvent) {
        match event {
            SliceEvent::Added(state) => {
                info!(index = state.index, freq = state.frequency_hz, "slice added");
                let _ = self.events_tx.send(LinkEvent::SliceAdded {
                    index: state.index,
                    state: state.clone(),
                });

                self.seed_default_band(&state);
                if self.options.auto_bind {
                    if let Err(e) = self.bind_instance(state.index).await {
                        warn!(index = state.index, "instance bind failed: {}", e);
                    }
                }
            }
            SliceEvent::Updated(state) => {
                let _ = self.events_tx.send(LinkEvent::SliceUpdated {
                    index: state.index,
                    state,
                });
            }
            SliceEvent::Removed(state) => {
                info!(index = state.index, "slice removed");
                let index = state.index;
                let _ = self.events_tx.send(LinkEvent::SliceRemoved { index, state });

                let instance_id = self
                    .instances
                    .values()
                    .find(|e| e.record.slice_index == index)
                    .map(|e| e.record.instance_id.clone());
                if let Some(id) = instance_id {
                    let _ = self.stop_instance(&id, "slice removed").await;
                }
            }
        }
    }

    fn seed_default_band(&self, state: &crate::state::Slice) {
        // Only a slice the radio reports with no frequency gets seeded.
        if state.frequency_hz != 0 {
            return;
        }
        let Some(&band) = self.config.flex.default_bands.get(state.index) else {
            return;
        };
        if let Some(backend) = &self.backend {
            debug!(index = state.index, band, "seeding default band");
            if let Err(e) = backend.submit(BackendCommand::Tune { index: state.index, hz: band }) {
                warn!(index = state.index, "band seed dropped: {}", e);
            }
        }
    }

    /// Start the CAT listener, write the INI, spawn the child, and record
    /// the binding for a slice
    async fn bind_instance(&mut self, index: usize) -> Result<String, LinkError> {
        let slice = self
            .store
            .snapshot(index)
            .filter(|s| s.in_use)
            .ok_or(LinkError::SliceNotFound(index))?;

        let instance_id = instance::instance_id_for_slice(index);
        if self.instances.contains_key(&instance_id) {
            return Err(LinkError::InvariantViolation(format!(
                "slice {index} already bound to {instance_id}"
            )));
        }

        let mut record = DecoderInstance::new(index, self.config.flex.cat_base_port);
        let cat_port = self.cat.start_listener(index, record.cat_port).await?;
        record.cat_port = cat_port;

        let ini = IniParams::for_instance(&self.config, &record, slice.dax_channel);
        let ini_path = instance::ini_path(&self.options.ini_dir, &record.instance_id);
        if let Err(e) = instance::write_instance_ini(&ini_path, &ini) {
            warn!(instance = %record.instance_id, "INI write failed: {}", e);
        }

        if self.options.spawn_children {
            let spec = SpawnSpec {
                instance_id: record.instance_id.clone(),
                program: self.config.wsjtx.path.clone(),
                extra_args: Vec::new(),
            };
            match self.supervisor.spawn(spec).await {
                Ok(_) => record.running = true,
                Err(e) => {
                    self.cat.stop_listener(index);
                    return Err(e);
                }
            }
        }

        self.store.bind_instance(index, Some(record.instance_id.clone()));
        let _ = self.events_tx.send(LinkEvent::InstanceLaunched {
            instance_id: record.instance_id.clone(),
            slice_index: index,
        });
        self.instances
            .insert(record.instance_id.clone(), InstanceEntry { record, qso: None });
        Ok(instance_id)
    }

    /// STANDARD profile: one instance named after the configured rig, no
    /// radio backend and no CAT listener of ours
    async fn start_standard_instance(&mut self) -> Result<(), LinkError> {
        let instance_id = self.config.standard.rig_name.clone();
        let mut record = DecoderInstance::new(0, self.config.flex.cat_base_port);
        record.instance_id = instance_id.clone();

        if self.options.spawn_children {
            let spec = SpawnSpec {
                instance_id: instance_id.clone(),
                program: self.config.wsjtx.path.clone(),
                extra_args: Vec::new(),
            };
            self.supervisor.spawn(spec).await?;
            record.running = true;
        }

        let _ = self.events_tx.send(LinkEvent::InstanceLaunched {
            instance_id: instance_id.clone(),
            slice_index: 0,
        });
        self.instances.insert(instance_id, InstanceEntry { record, qso: None });
        Ok(())
    }

    async fn stop_instance(&mut self, instance_id: &str, reason: &str) -> Result<(), LinkError> {
        let Some(mut entry) = self.instances.remove(instance_id) else {
            return Err(LinkError::InstanceNotFound(instance_id.to_string()));
        };

        if let Some(qso) = entry.qso.take() {
            let _ = qso.halt_tx.send(true);
        }
        self.supervisor.stop(instance_id).await?;
        self.cat.stop_listener(entry.record.slice_index);
        self.addresses.forget(instance_id);
        self.store.bind_instance(entry.record.slice_index, None);

        let _ = self.events_tx.send(LinkEvent::InstanceStopped {
            instance_id: instance_id.to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------
    // Telemetry
    // -----------------------------------------------------------------

    async fn on_telemetry(&mut self, frame: TelemetryFrame) {
        match frame {
            TelemetryFrame::Heartbeat { id } => {
                if let Some(entry) = self.instances.get_mut(&id) {
                    entry.record.last_heartbeat_ms = now_ms();
                }
            }
            TelemetryFrame::Status { id, status } => {
                let _ = self
                    .events_tx
                    .send(LinkEvent::Status { instance_id: id, status });
            }
            TelemetryFrame::Decode { id, decode } => {
                if let Some(entry) = self.instances.get(&id) {
                    if let Some(qso) = &entry.qso {
                        // Arrival order into the machine matters; a full
                        // channel means the machine is terminal or wedged,
                        // and the decode is still published below.
                        if let Err(e) = qso.decode_tx.try_send(decode.clone()) {
                            debug!(instance = %id, "QSO decode channel: {}", e);
                        }
                    }
                }
                let _ = self
                    .events_tx
                    .send(LinkEvent::Decode { instance_id: id, decode });
            }
            TelemetryFrame::Close { id } => {
                info!(instance = %id, "decoder app announced close");
                self.addresses.forget(&id);
            }
        }
    }

    // -----------------------------------------------------------------
    // CAT mirror
    // -----------------------------------------------------------------

    async fn on_cat_event(&mut self, event: CatEvent) {
        match event {
            CatEvent::FrequencyChange { index, hz } => {
                self.submit_backend(BackendCommand::Tune { index, hz });
            }
            CatEvent::ModeChange { index, mode } => {
                self.submit_backend(BackendCommand::SetMode { index, mode });
            }
            CatEvent::PttChange { index, on } => {
                if on {
                    if self.store.set_tx(index, true) || self.store.transmitting_slice() == Some(index) {
                        self.submit_backend(BackendCommand::Xmit(true));
                    }
                } else {
                    let was_transmitter = self.store.transmitting_slice() == Some(index);
                    self.store.set_tx(index, false);
                    if was_transmitter {
                        self.submit_backend(BackendCommand::Xmit(false));
                    }
                }
            }
        }
    }

    fn submit_backend(&self, command: BackendCommand) {
        let Some(backend) = &self.backend else {
            debug!(?command, "no backend configured, mutation not mirrored");
            return;
        };
        if let Err(e) = backend.submit(command) {
            // Soft failure by design: the CAT peer's optimistic state will
            // be corrected by the next radio push.
            warn!("backend mirror dropped: {}", e);
        }
    }

    // -----------------------------------------------------------------
    // Children
    // -----------------------------------------------------------------

    async fn on_child_exit(&mut self, exit: ChildExit) {
        warn!(instance = %exit.instance_id, status = %exit.status, "decoder app exited unexpectedly");
        if let Some(mut entry) = self.instances.remove(&exit.instance_id) {
            if let Some(qso) = entry.qso.take() {
                let _ = qso.halt_tx.send(true);
            }
            entry.record.running = false;
            // The slice stays managed by its CAT listener; only the child
            // binding is gone.
            self.addresses.forget(&exit.instance_id);
            self.store.bind_instance(entry.record.slice_index, None);
        }
        let _ = self.events_tx.send(LinkEvent::InstanceStopped {
            instance_id: exit.instance_id,
            reason: format!("exited: {}", exit.status),
        });
    }

    // -----------------------------------------------------------------
    // QSO lifecycle
    // -----------------------------------------------------------------

    fn start_qso(&mut self, instance_id: &str, target_call: &str) -> Result<(), LinkError> {
        let entry = self
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| LinkError::InstanceNotFound(instance_id.to_string()))?;
        if entry.qso.is_some() {
            return Err(LinkError::QsoAlreadyRunning(instance_id.to_string()));
        }

        let cfg = QsoConfig::new(
            &self.config.station.callsign,
            &self.config.station.grid,
            target_call,
        );
        let (decode_tx, decode_rx) = mpsc::channel(64);
        let (halt_tx, halt_rx) = watch::channel(false);

        let sink = self.sink.clone();
        let done_tx = self.qso_done_tx.clone();
        let id = instance_id.to_string();
        let target = target_call.to_string();
        tokio::spawn(async move {
            let outcome = run_qso(id.clone(), cfg, decode_rx, halt_rx, sink).await;
            let _ = done_tx.send((id, target, outcome)).await;
        });

        entry.qso = Some(ActiveQso {
            target_call: target_call.to_string(),
            decode_tx,
            halt_tx,
        });
        info!(instance = %instance_id, target = %target_call, "QSO started");
        Ok(())
    }

    fn on_qso_done(&mut self, instance_id: String, target_call: String, outcome: QsoOutcome) {
        if let Some(entry) = self.instances.get_mut(&instance_id) {
            entry.qso = None;
        }
        let event = match outcome {
            QsoOutcome::Complete => LinkEvent::QsoComplete { instance_id, target_call },
            QsoOutcome::Failed(reason) => LinkEvent::QsoFailed {
                instance_id,
                target_call,
                reason,
            },
        };
        let _ = self.events_tx.send(event);
    }

    // -----------------------------------------------------------------
    // Operator commands
    // -----------------------------------------------------------------

    async fn on_command(&mut self, command: CoordinatorCommand) {
        match command {
            CoordinatorCommand::StartInstance { index, resp } => {
                let _ = resp.send(self.bind_instance(index).await);
            }
            CoordinatorCommand::StopInstance { instance_id, resp } => {
                let _ = resp.send(self.stop_instance(&instance_id, "requested").await);
            }
            CoordinatorCommand::ExecuteQso { instance_id, target_call, resp } => {
                let _ = resp.send(self.start_qso(&instance_id, &target_call));
            }
            CoordinatorCommand::HaltTx { instance_id, resp } => {
                let _ = resp.send(self.halt_tx(instance_id).await);
            }
            CoordinatorCommand::SetFrequency { instance_id, hz, resp } => {
                let result = self.slice_of(&instance_id).map(|index| {
                    self.store.set_frequency(index, hz);
                    self.submit_backend(BackendCommand::Tune { index, hz });
                });
                let _ = resp.send(result);
            }
            CoordinatorCommand::SetMode { instance_id, mode, resp } => {
                let result = self.slice_of(&instance_id).map(|index| {
                    self.store.set_mode(index, mode.clone());
                    self.submit_backend(BackendCommand::SetMode { index, mode });
                });
                let _ = resp.send(result);
            }
            CoordinatorCommand::ReplyToStation { instance_id, decode, resp } => {
                let result = if self.instances.contains_key(&instance_id) {
                    let command = DecoderCommand::reply_to(&instance_id, &decode);
                    self.sink.send(&instance_id, &command).await
                } else {
                    Err(LinkError::InstanceNotFound(instance_id))
                };
                let _ = resp.send(result);
            }
            CoordinatorCommand::EmergencyStop { resp } => {
                self.emergency_stop().await;
                let _ = resp.send(());
            }
            CoordinatorCommand::Status { resp } => {
                let _ = resp.send(self.status_report());
            }
        }
    }

    fn slice_of(&self, instance_id: &str) -> Result<usize, LinkError> {
        self.instances
            .get(instance_id)
            .map(|e| e.record.slice_index)
            .ok_or_else(|| LinkError::InstanceNotFound(instance_id.to_string()))
    }

    async fn halt_tx(&mut self, instance_id: Option<String>) -> Result<(), LinkError> {
        match instance_id {
            Some(id) => {
                if !self.instances.contains_key(&id) {
                    return Err(LinkError::InstanceNotFound(id));
                }
                if let Some(entry) = self.instances.get_mut(&id) {
                    if let Some(qso) = &entry.qso {
                        let _ = qso.halt_tx.send(true);
                    }
                }
                self.sink.halt_tx(&id).await
            }
            None => {
                let ids: Vec<String> = self.instances.keys().cloned().collect();
                for id in ids {
                    if let Some(entry) = self.instances.get_mut(&id) {
                        if let Some(qso) = &entry.qso {
                            let _ = qso.halt_tx.send(true);
                        }
                    }
                    let _ = self.sink.halt_tx(&id).await;
                }
                Ok(())
            }
        }
    }

    /// Best-effort and idempotent: at most one `xmit 0` per transmitting
    /// slice, a halt to every instance, transmit flags all cleared
    async fn emergency_stop(&mut self) {
        info!("emergency stop");
        for slice in self.store.snapshot_in_use() {
            if slice.transmit {
                self.store.set_tx(slice.index, false);
                self.submit_backend(BackendCommand::Xmit(false));
            }
        }
        let _ = self.halt_tx(None).await;
    }

    fn status_report(&self) -> StatusReport {
        StatusReport {
            backend_connected: self.backend.as_ref().map(|b| b.is_connected()).unwrap_or(false),
            slices: self.store.snapshot_in_use(),
            instances: self
                .instances
                .values()
                .map(|e| InstanceStatus {
                    instance_id: e.record.instance_id.clone(),
                    slice_index: e.record.slice_index,
                    cat_port: e.record.cat_port,
                    running: e.record.running,
                    qso_target: e.qso.as_ref().map(|q| q.target_call.clone()),
                    last_heartbeat_ms: e.record.last_heartbeat_ms,
                })
                .collect(),
            telemetry_dropped: self.counters.total_dropped(),
        }
    }

    /// Profile this coordinator runs under
    pub fn profile(&self) -> OperatingProfile {
        self.config.mode
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
