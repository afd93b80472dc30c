// Live CAN telemetry ingestion client
//
// This crate connects a vehicle diagnostics console to a continuous
// stream of bus-frame events, survives transport failures and silent
// stalls without operator intervention, normalizes heterogeneous wire
// representations into one canonical record shape, and maintains a
// bounded, filtered, deduplicated view of recent activity for a display
// layer to render.
//
// Architecture:
// - `parser`: pure normalization of raw wire payloads into `Frame`s
// - `buffer`: bounded working set with range filtering and dedup
// - `source`: pluggable transports (WebSocket, HTTP event stream)
// - `connection`: supervisor task - stall detection, backoff, reconnect
// - `controller`: the façade exposed to the display layer

pub mod buffer;
pub mod config;
mod connection;
pub mod controller;
pub mod frame;
pub mod parser;
pub mod source;
pub mod types;

pub use buffer::{AddOutcome, FrameBuffer};
pub use config::{StreamConfig, DEFAULT_STREAM_URL, STREAM_URL_ENV};
pub use controller::StreamController;
pub use frame::{format_bytes, format_id, Direction, Frame, FrameRange, MAX_EXTENDED_ID};
pub use parser::{normalize_payload, parse_frame, parse_id, parse_timestamp, resolve_direction};
pub use source::{create_transport, StreamTransport};
pub use types::{ConnectionState, StreamError, StreamEvent, StreamResult, StreamStats};
