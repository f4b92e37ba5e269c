//! Operator command surface
//!
//! [`LinkHandle`] is what tools and the daemon hold: cheap to clone, each
//! method one command into the coordinator answered over a oneshot. Every
//! named tool operation maps 1:1 onto a method here; results are a short
//! human-readable message or a short error.

use slice_protocol::wsjtx::DecodeFrame;
use slice_protocol::SliceMode;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::coordinator::{CoordinatorCommand, StatusReport};
use crate::error::LinkError;
use crate::events::LinkEvent;

/// Handle into a running control plane
pub struct LinkHandle {
    cmd_tx: mpsc::Sender<CoordinatorCommand>,
    events_tx: broadcast::Sender<LinkEvent>,
}

impl Clone for LinkHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

impl LinkHandle {
    /// Wrap the coordinator's channels
    pub fn new(
        cmd_tx: mpsc::Sender<CoordinatorCommand>,
        events_tx: broadcast::Sender<LinkEvent>,
    ) -> Self {
        Self { cmd_tx, events_tx }
    }

    /// Subscribe to the unified event stream
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events_tx.subscribe()
    }

    async fn send<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> CoordinatorCommand,
    ) -> Result<T, LinkError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| LinkError::ChannelClosed)?;
        rx.await.map_err(|_| LinkError::ChannelClosed)
    }

    /// Bind a decoder instance to a slice
    pub async fn start_instance(&self, index: usize) -> Result<String, LinkError> {
        self.send(|resp| CoordinatorCommand::StartInstance { index, resp })
            .await?
    }

    /// Stop an instance
    pub async fn stop_instance(&self, instance_id: &str) -> Result<(), LinkError> {
        self.send(|resp| CoordinatorCommand::StopInstance {
            instance_id: instance_id.to_string(),
            resp,
        })
        .await?
    }

    /// Start an automated QSO with `target_call` on an instance
    ///
    /// Rejected synchronously when one is already running there.
    pub async fn execute_qso(&self, instance_id: &str, target_call: &str) -> Result<(), LinkError> {
        self.send(|resp| CoordinatorCommand::ExecuteQso {
            instance_id: instance_id.to_string(),
            target_call: target_call.to_string(),
            resp,
        })
        .await?
    }

    /// Halt transmission on one instance, or on all of them
    pub async fn halt_tx(&self, instance_id: Option<&str>) -> Result<(), LinkError> {
        self.send(|resp| CoordinatorCommand::HaltTx {
            instance_id: instance_id.map(str::to_string),
            resp,
        })
        .await?
    }

    /// Tune the slice behind an instance
    pub async fn set_frequency(&self, instance_id: &str, hz: u64) -> Result<(), LinkError> {
        self.send(|resp| CoordinatorCommand::SetFrequency {
            instance_id: instance_id.to_string(),
            hz,
            resp,
        })
        .await?
    }

    /// Change the mode of the slice behind an instance
    pub async fn set_mode(&self, instance_id: &str, mode: SliceMode) -> Result<(), LinkError> {
        self.send(|resp| CoordinatorCommand::SetMode {
            instance_id: instance_id.to_string(),
            mode,
            resp,
        })
        .await?
    }

    /// Answer a heard station through the decoder's own sequencer
    pub async fn reply_to_station(
        &self,
        instance_id: &str,
        decode: DecodeFrame,
    ) -> Result<(), LinkError> {
        self.send(|resp| CoordinatorCommand::ReplyToStation {
            instance_id: instance_id.to_string(),
            decode,
            resp,
        })
        .await?
    }

    /// Best-effort, idempotent all-stop
    pub async fn emergency_stop(&self) -> Result<(), LinkError> {
        self.send(|resp| CoordinatorCommand::EmergencyStop { resp }).await
    }

    /// Snapshot of slices, instances, QSOs, and counters
    pub async fn status(&self) -> Result<StatusReport, LinkError> {
        self.send(|resp| CoordinatorCommand::Status { resp }).await
    }
}
