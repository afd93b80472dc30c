// Common types for the telemetry stream client

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for stream operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur during stream operations
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Event stream error: {0}")]
    EventStream(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No transport available for URL: {0}")]
    UnsupportedTransport(String),

    #[error("Stream already running")]
    AlreadyRunning,
}

/// Connection state of the telemetry stream
///
/// `Unsupported` is terminal: it is reached only when no compiled-in
/// transport can serve the resolved URL, and no reconnect is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Unsupported,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Unsupported => "unsupported",
        }
    }
}

/// Counters describing the current ingestion session
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Frames accepted into the buffer since the last full clear
    pub total_received: u64,
    /// Frames discarded by the active range filter
    pub dropped_by_filter: u64,
    /// Frames currently buffered
    pub buffered: usize,
    /// Buffer capacity (FIFO eviction beyond this)
    pub capacity: usize,
}

/// Events emitted to the display layer via the controller callback
#[derive(Debug, Clone)]
pub enum StreamEvent {
    StateChanged { state: ConnectionState },
    FrameReceived { buffered: usize },
    Error { message: String },
}

/// Current wall-clock time in epoch milliseconds
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
