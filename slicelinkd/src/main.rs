//! SliceLink daemon
//!
//! Loads the configuration, assembles the control plane, and runs it until
//! Ctrl-C. Operator tooling talks to the running plane through the
//! [`slice_link::LinkHandle`] surface; this binary also mirrors the event
//! stream to the log for headless operation.

use std::path::PathBuf;

use clap::Parser;
use slice_link::{Config, ControlPlane, LinkEvent, PlaneOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "slicelinkd", about = "Control plane for decoder-app instances on SDR slices")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "slicelink.json")]
    config: PathBuf,

    /// Radio host, overriding configuration and discovery
    #[arg(long)]
    flex_host: Option<String>,

    /// Operating profile override: STANDARD or FLEX
    #[arg(long)]
    mode: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "slicelinkd=debug,slice_link=debug,slice_protocol=debug"
    } else {
        "slicelinkd=info,slice_link=info,slice_protocol=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting SliceLink");

    let mut config = Config::load(&cli.config);
    if let Some(host) = cli.flex_host {
        config.flex.host = host;
    }
    if let Some(mode) = cli.mode {
        match mode.to_ascii_uppercase().as_str() {
            "STANDARD" => config.mode = slice_link::config::OperatingProfile::Standard,
            "FLEX" => config.mode = slice_link::config::OperatingProfile::Flex,
            other => {
                eprintln!("unknown mode {other:?}; expected STANDARD or FLEX");
                std::process::exit(2);
            }
        }
    }

    let plane = match ControlPlane::start(config, PlaneOptions::default()).await {
        Ok(plane) => plane,
        Err(e) => {
            tracing::error!("startup failed: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(telemetry_port = plane.telemetry_port, "control plane running");

    // Mirror the event bus into the log until shutdown.
    let mut events = plane.handle.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "event log lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutting down"),
        Err(e) => tracing::error!("signal wait failed: {}", e),
    }

    plane.shutdown().await;
    event_log.abort();
}

fn log_event(event: &LinkEvent) {
    match event {
        LinkEvent::SliceAdded { index, state } => {
            tracing::info!(index, freq = state.frequency_hz, mode = %state.mode, "slice added");
        }
        LinkEvent::SliceRemoved { index, .. } => {
            tracing::info!(index, "slice removed");
        }
        LinkEvent::SliceUpdated { .. } => {}
        LinkEvent::Decode { instance_id, decode } => {
            tracing::debug!(
                instance = %instance_id,
                snr = decode.snr,
                df = decode.df,
                message = %decode.message,
                "decode"
            );
        }
        LinkEvent::Status { .. } => {}
        LinkEvent::InstanceLaunched { instance_id, slice_index } => {
            tracing::info!(instance = %instance_id, slice = slice_index, "instance launched");
        }
        LinkEvent::InstanceStopped { instance_id, reason } => {
            tracing::info!(instance = %instance_id, %reason, "instance stopped");
        }
        LinkEvent::QsoComplete { instance_id, target_call } => {
            tracing::info!(instance = %instance_id, target = %target_call, "QSO complete");
        }
        LinkEvent::QsoFailed { instance_id, target_call, reason } => {
            tracing::info!(instance = %instance_id, target = %target_call, %reason, "QSO failed");
        }
        LinkEvent::BackendConnected { host } => {
            tracing::info!(%host, "radio backend connected");
        }
        LinkEvent::BackendDisconnected => {
            tracing::warn!("radio backend disconnected");
        }
    }
}
