// Stream client configuration
//
// Everything is overridable from the environment so a diagnostics console
// can be pointed at a different gateway without a rebuild.

use std::env;

/// Default endpoint when neither the caller nor the environment names one
pub const DEFAULT_STREAM_URL: &str = "ws://127.0.0.1:9277/telemetry/frames";

/// Environment variable naming the stream endpoint
pub const STREAM_URL_ENV: &str = "CANMON_STREAM_URL";

/// Configuration for a telemetry stream session
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Explicit endpoint override; takes priority over the environment
    pub url: Option<String>,
    /// Maximum number of buffered frames before FIFO eviction
    pub max_buffer: usize,
    /// Silence longer than this is treated as a dead connection
    pub stale_timeout_ms: u64,
    /// Connect immediately when the controller is created
    pub auto_connect: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_buffer: 500,
            stale_timeout_ms: 5000,
            auto_connect: true,
        }
    }
}

impl StreamConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: env::var(STREAM_URL_ENV).ok(),
            max_buffer: env::var("CANMON_MAX_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_buffer),
            stale_timeout_ms: env::var("CANMON_STALE_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.stale_timeout_ms),
            auto_connect: defaults.auto_connect,
        }
    }

    /// Resolve the stream endpoint: explicit override, then environment,
    /// then the built-in default.
    pub fn resolve_url(&self) -> String {
        self.url
            .clone()
            .or_else(|| env::var(STREAM_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_STREAM_URL.to_string())
    }

    /// Interval for the staleness check: half the stale timeout, kept
    /// between one and three seconds.
    pub fn heartbeat_check_ms(&self) -> u64 {
        (self.stale_timeout_ms / 2).clamp(1000, 3000)
    }
}
