//! Error types for the acquisition engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors surfaced to whoever owns a [`crate::device::GpsDevice`].
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The transport could not be acquired: missing serial device, file not
    /// found, connection refused, location service unavailable.
    #[error("failed to open transport: {0}")]
    Open(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The underlying connection was lost. Reported once; the backend stops
    /// producing updates and does not reconnect.
    #[error("transport closed")]
    TransportClosed,

    #[error("invalid lifecycle transition: {op}() while {state}")]
    Lifecycle {
        op: &'static str,
        state: &'static str,
    },

    #[cfg(windows)]
    #[error("windows error: {0}")]
    Windows(#[from] windows::core::Error),
}

/// Per-frame decode failures. Local and non-fatal: the offending frame is
/// dropped without mutating any state and the stream continues.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// More than one `$` start marker inside a single candidate frame,
    /// which indicates corrupted concatenation.
    #[error("frame contains multiple start markers")]
    MalformedFrame,

    /// The dispatched sentence type has fewer comma-separated fields than
    /// its layout requires.
    #[error("{sentence}: expected at least {expected} fields, got {got}")]
    TooFewFields {
        sentence: &'static str,
        expected: usize,
        got: usize,
    },
}
