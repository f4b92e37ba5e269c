//! Decoder-app process supervision
//!
//! Spawns one child per instance, watches for exit, and tears children down
//! gracefully: soft termination first, a hard kill after a timeout. Stops
//! are idempotent; a second stop of a dead child is a no-op.
//!
//! Each child is owned by its reaper task. The supervisor talks to the
//! reaper through a kill channel and a done flag, so a child that ignores
//! the soft signal can never wedge a stop request.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::LinkError;

/// Default grace period between soft and hard termination
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Notification that a supervised child exited on its own
#[derive(Debug, Clone)]
pub struct ChildExit {
    /// Instance the child served
    pub instance_id: String,
    /// Exit status description
    pub status: String,
}

/// Launch parameters for one decoder-app child
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    /// Instance id, passed as the child's rig name
    pub instance_id: String,
    /// Decoder-app executable
    pub program: PathBuf,
    /// Extra arguments after the rig-name flag
    pub extra_args: Vec<String>,
}

struct Supervised {
    alive: Arc<AtomicBool>,
    pid: Option<u32>,
    kill_tx: mpsc::Sender<()>,
    done_rx: watch::Receiver<bool>,
}

/// The supervisor
///
/// Sole owner of child-process resources; everyone else refers to children
/// by instance id.
pub struct Supervisor {
    children: Mutex<HashMap<String, Supervised>>,
    exits_tx: mpsc::Sender<ChildExit>,
    stop_grace: Duration,
}

impl Supervisor {
    /// New supervisor reporting exits on `exits_tx`
    pub fn new(exits_tx: mpsc::Sender<ChildExit>) -> Self {
        Self {
            children: Mutex::new(HashMap::new()),
            exits_tx,
            stop_grace: STOP_GRACE,
        }
    }

    /// Override the soft-to-hard grace period
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Spawn a decoder-app child for an instance
    ///
    /// The child's stdio is detached from our terminal; its exit is
    /// consumed asynchronously and reported on the exit channel unless the
    /// exit was a requested stop.
    pub async fn spawn(&self, spec: SpawnSpec) -> Result<u32, LinkError> {
        let mut children = self.children.lock().await;
        if let Some(existing) = children.get(&spec.instance_id) {
            if existing.alive.load(Ordering::SeqCst) {
                return Err(LinkError::InvariantViolation(format!(
                    "instance {} already has a running child",
                    spec.instance_id
                )));
            }
        }

        let mut command = Command::new(&spec.program);
        command
            .arg("--rig-name")
            .arg(&spec.instance_id)
            .args(&spec.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let pid = child.id();
        info!(instance = %spec.instance_id, pid, "decoder app spawned");

        let alive = Arc::new(AtomicBool::new(true));
        let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
        let (done_tx, done_rx) = watch::channel(false);

        children.insert(
            spec.instance_id.clone(),
            Supervised {
                alive: Arc::clone(&alive),
                pid,
                kill_tx,
                done_rx,
            },
        );
        drop(children);

        // Reaper task: sole owner of the Child handle.
        let exits_tx = self.exits_tx.clone();
        let instance_id = spec.instance_id;
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx.recv() => {
                    if let Err(e) = child.kill().await {
                        warn!(instance = %instance_id, "kill failed: {}", e);
                    }
                    child.wait().await
                }
            };

            let was_alive = alive.swap(false, Ordering::SeqCst);
            let status = match status {
                Ok(s) => s.to_string(),
                Err(e) => format!("wait failed: {e}"),
            };
            debug!(instance = %instance_id, %status, "decoder app reaped");
            let _ = done_tx.send(true);

            if was_alive {
                let _ = exits_tx.send(ChildExit { instance_id, status }).await;
            }
        });

        Ok(pid.unwrap_or_default())
    }

    /// True while the instance's child has not been seen to exit
    pub async fn is_alive(&self, instance_id: &str) -> bool {
        let children = self.children.lock().await;
        children
            .get(instance_id)
            .map(|s| s.alive.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Stop a child: soft signal, wait out the grace period, then kill
    ///
    /// Safe to call twice; a stop of an unknown or dead instance succeeds.
    pub async fn stop(&self, instance_id: &str) -> Result<(), LinkError> {
        let entry = {
            let mut children = self.children.lock().await;
            children.remove(instance_id)
        };
        let Some(mut entry) = entry else {
            debug!(instance = %instance_id, "stop of unknown instance, nothing to do");
            return Ok(());
        };

        // Clearing the flag first keeps the reaper from reporting this exit
        // as unexpected.
        let was_alive = entry.alive.swap(false, Ordering::SeqCst);
        if !was_alive && *entry.done_rx.borrow() {
            return Ok(());
        }

        soft_terminate(entry.pid);

        let softly_stopped = tokio::time::timeout(self.stop_grace, async {
            while !*entry.done_rx.borrow() {
                if entry.done_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .is_ok();

        if !softly_stopped {
            warn!(instance = %instance_id, "graceful stop timed out, killing");
            let _ = entry.kill_tx.send(()).await;
            while !*entry.done_rx.borrow() {
                if entry.done_rx.changed().await.is_err() {
                    break;
                }
            }
        }

        info!(instance = %instance_id, "decoder app stopped");
        Ok(())
    }

    /// Stop every child; used on shutdown
    pub async fn stop_all(&self) {
        let ids: Vec<String> = {
            let children = self.children.lock().await;
            children.keys().cloned().collect()
        };
        for id in ids {
            if let Err(e) = self.stop(&id).await {
                warn!(instance = %id, "stop failed: {}", e);
            }
        }
    }
}

/// Ask the OS to terminate the process politely
#[cfg(unix)]
fn soft_terminate(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: plain kill(2) with a known pid; worst case is ESRCH when
        // the child already exited.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn soft_terminate(_pid: Option<u32>) {
    // No soft-termination signal here; the grace timeout falls through to
    // the hard kill.
}
