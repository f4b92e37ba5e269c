//! Outbound UDP command sink
//!
//! Commands to a decoder-app instance go back over the telemetry socket to
//! the address the instance last sent from. One sink instance is the single
//! writer for all instances; per-instance ordering follows from the callers
//! (one QSO machine per instance, plus the coordinator).

use std::sync::Arc;

use slice_protocol::wsjtx::DecoderCommand;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::LinkError;
use crate::telemetry::InstanceAddresses;

/// Sends encoded commands to decoder-app instances
#[derive(Clone)]
pub struct CommandSink {
    socket: Arc<UdpSocket>,
    addresses: Arc<InstanceAddresses>,
}

impl CommandSink {
    /// Build a sink over the telemetry socket and address table
    pub fn new(socket: Arc<UdpSocket>, addresses: Arc<InstanceAddresses>) -> Self {
        Self { socket, addresses }
    }

    /// Send one command to the instance named in it
    ///
    /// Fails with [`LinkError::NoInstanceAddress`] until the instance has
    /// sent at least one telemetry frame.
    pub async fn send(&self, instance_id: &str, command: &DecoderCommand) -> Result<(), LinkError> {
        let addr = self
            .addresses
            .lookup(instance_id)
            .ok_or_else(|| LinkError::NoInstanceAddress(instance_id.to_string()))?;
        let bytes = command.encode();
        self.socket.send_to(&bytes, addr).await?;
        debug!(instance_id, to = %addr, len = bytes.len(), "decoder command sent");
        Ok(())
    }

    /// Best-effort halt-TX; missing address is not an error here
    pub async fn halt_tx(&self, instance_id: &str) -> Result<(), LinkError> {
        let command = DecoderCommand::HaltTx {
            id: instance_id.to_string(),
            auto_only: false,
        };
        match self.send(instance_id, &command).await {
            Ok(()) | Err(LinkError::NoInstanceAddress(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetryListener;
    use slice_protocol::qt::{QtReader, QtWriter};
    use slice_protocol::wsjtx;
    use tokio::sync::{mpsc, watch};

    #[tokio::test]
    async fn commands_go_to_last_seen_address() {
        let (frames_tx, mut frames_rx) = mpsc::channel(4);
        let (listener, socket, addresses, _counters) =
            TelemetryListener::bind(0, frames_tx).await.unwrap();
        let server_port = socket.local_addr().unwrap().port();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(listener.run(shutdown_rx));

        // Fake instance announces itself with a heartbeat
        let instance = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut w = QtWriter::new();
        w.put_u32(wsjtx::MAGIC).put_u32(wsjtx::SCHEMA).put_u32(0).put_qstring("Slice-A");
        instance.send_to(&w.into_bytes(), ("127.0.0.1", server_port)).await.unwrap();
        frames_rx.recv().await.unwrap();

        let sink = CommandSink::new(socket, addresses);
        sink.send(
            "Slice-A",
            &DecoderCommand::FreeText {
                id: "Slice-A".into(),
                text: "CQ W1ABC FN20".into(),
                send: true,
            },
        )
        .await
        .unwrap();

        let mut buf = vec![0u8; 512];
        let (len, _) = instance.recv_from(&mut buf).await.unwrap();
        let mut r = QtReader::new(&buf[..len]);
        assert_eq!(r.read_u32().unwrap(), wsjtx::MAGIC);
        r.read_u32().unwrap();
        assert_eq!(r.read_u32().unwrap(), 9);
        assert_eq!(r.read_qstring().unwrap(), "Slice-A");
        assert_eq!(r.read_qstring().unwrap(), "CQ W1ABC FN20");

        task.abort();
    }

    #[tokio::test]
    async fn unknown_instance_is_an_error() {
        let (frames_tx, _frames_rx) = mpsc::channel(4);
        let (_listener, socket, addresses, _counters) =
            TelemetryListener::bind(0, frames_tx).await.unwrap();
        let sink = CommandSink::new(socket, addresses);

        let err = sink
            .send(
                "Slice-Z",
                &DecoderCommand::Clear { id: "Slice-Z".into(), window: 2 },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::NoInstanceAddress(_)));

        // halt_tx swallows the missing address
        sink.halt_tx("Slice-Z").await.unwrap();
    }
}
