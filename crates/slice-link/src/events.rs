//! Unified event stream for the control plane
//!
//! Every observable state change is published as one [`LinkEvent`] variant
//! on a broadcast channel. The dashboard, tests, and any other observer
//! subscribe to the same stream; within a single slice or instance, events
//! arrive in the order the originating operation produced them.

use slice_protocol::wsjtx::{DecodeFrame, StatusFrame};

use crate::error::QsoFailReason;
use crate::state::Slice;

/// One control-plane event
#[derive(Debug, Clone)]
pub enum LinkEvent {
    // -------------------------------------------------------------------
    // Slice lifecycle
    // -------------------------------------------------------------------
    /// A slice transitioned to in-use
    SliceAdded {
        /// Slice index
        index: usize,
        /// Full state after the transition
        state: Slice,
    },

    /// A slice's state changed
    SliceUpdated {
        /// Slice index
        index: usize,
        /// Full state after the change
        state: Slice,
    },

    /// A slice was released
    SliceRemoved {
        /// Slice index
        index: usize,
        /// State just before the release
        state: Slice,
    },

    // -------------------------------------------------------------------
    // Decoder-app telemetry
    // -------------------------------------------------------------------
    /// A decode arrived from an instance
    Decode {
        /// Instance that produced it
        instance_id: String,
        /// Parsed decode
        decode: DecodeFrame,
    },

    /// A status report arrived from an instance
    Status {
        /// Instance that produced it
        instance_id: String,
        /// Parsed status
        status: StatusFrame,
    },

    // -------------------------------------------------------------------
    // Instance lifecycle
    // -------------------------------------------------------------------
    /// A decoder-app instance was spawned and bound
    InstanceLaunched {
        /// Instance id
        instance_id: String,
        /// Slice index it serves
        slice_index: usize,
    },

    /// An instance stopped (requested or not)
    InstanceStopped {
        /// Instance id
        instance_id: String,
        /// Short human-readable reason
        reason: String,
    },

    // -------------------------------------------------------------------
    // QSO lifecycle
    // -------------------------------------------------------------------
    /// A QSO reached its terminal success state
    QsoComplete {
        /// Instance the QSO ran on
        instance_id: String,
        /// Worked station
        target_call: String,
    },

    /// A QSO reached its terminal failure state
    QsoFailed {
        /// Instance the QSO ran on
        instance_id: String,
        /// Station we were working
        target_call: String,
        /// Why it failed
        reason: QsoFailReason,
    },

    // -------------------------------------------------------------------
    // Backend session
    // -------------------------------------------------------------------
    /// The radio backend TCP session came up
    BackendConnected {
        /// Host we connected to
        host: String,
    },

    /// The radio backend TCP session went down; reconnect is in progress
    BackendDisconnected,
}

impl LinkEvent {
    /// Slice index if the event concerns a specific slice
    pub fn slice_index(&self) -> Option<usize> {
        match self {
            Self::SliceAdded { index, .. }
            | Self::SliceUpdated { index, .. }
            | Self::SliceRemoved { index, .. }
            | Self::InstanceLaunched { slice_index: index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Instance id if the event concerns a specific instance
    pub fn instance_id(&self) -> Option<&str> {
        match self {
            Self::Decode { instance_id, .. }
            | Self::Status { instance_id, .. }
            | Self::InstanceLaunched { instance_id, .. }
            | Self::InstanceStopped { instance_id, .. }
            | Self::QsoComplete { instance_id, .. }
            | Self::QsoFailed { instance_id, .. } => Some(instance_id),
            _ => None,
        }
    }

    /// True for the QSO terminal events
    pub fn is_qso_terminal(&self) -> bool {
        matches!(self, Self::QsoComplete { .. } | Self::QsoFailed { .. })
    }
}
