//! Error types for the control plane

use thiserror::Error;

/// Errors surfaced by the control plane
#[derive(Debug, Error)]
pub enum LinkError {
    /// A wire frame or command could not be decoded
    #[error("protocol error: {0}")]
    Protocol(#[from] slice_protocol::ProtocolError),

    /// The radio backend session is down; the request was not forwarded
    #[error("radio backend disconnected")]
    BackendDisconnected,

    /// The backend command queue is full; the request was dropped
    #[error("radio backend command queue full")]
    QueueFull,

    /// A decoder-app child exited unexpectedly
    #[error("decoder instance {0} exited unexpectedly")]
    ChildExited(String),

    /// No instance with the given id
    #[error("no such instance: {0}")]
    InstanceNotFound(String),

    /// No slice with the given index, or the slice is not in use
    #[error("no such slice: {0}")]
    SliceNotFound(usize),

    /// A QSO is already running on this instance
    #[error("QSO already running on instance {0}")]
    QsoAlreadyRunning(String),

    /// A QSO wait state timed out with no retry budget configured
    #[error("QSO timed out")]
    QsoTimeout,

    /// A QSO exhausted its retries without progress
    #[error("QSO retries exhausted")]
    QsoMaxRetries,

    /// A QSO was halted by the operator mid-exchange
    #[error("QSO halted")]
    QsoHalted,

    /// The decoder app never told us where it listens
    #[error("no known address for instance {0}")]
    NoInstanceAddress(String),

    /// A request would have violated a store invariant
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// An internal channel closed during shutdown
    #[error("control plane shut down")]
    ChannelClosed,

    /// Process spawn or socket fault
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a QSO ended without completing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QsoFailReason {
    /// A wait state timed out with no retry budget configured
    Timeout,
    /// Retries were exhausted without progress
    MaxRetries,
    /// The operator halted transmission mid-exchange
    Halted,
}

impl QsoFailReason {
    /// Short reason string used in events and tool replies
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::MaxRetries => "max_retries",
            Self::Halted => "halted",
        }
    }
}

impl std::fmt::Display for QsoFailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// QSM terminal failures surface on the event bus as a [`QsoFailReason`];
/// callers that need an error type convert through here.
impl From<QsoFailReason> for LinkError {
    fn from(reason: QsoFailReason) -> Self {
        match reason {
            QsoFailReason::Timeout => Self::QsoTimeout,
            QsoFailReason::MaxRetries => Self::QsoMaxRetries,
            QsoFailReason::Halted => Self::QsoHalted,
        }
    }
}
