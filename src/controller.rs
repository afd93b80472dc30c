// Stream controller - the façade the display layer talks to
//
// Owns the shared state and the supervisor task, and exposes imperative
// start/stop/pause/range/clear operations plus observable status and
// counters. A callback registered with `on_event` receives state
// changes, accepted frames, and transport errors.

use crate::config::StreamConfig;
use crate::connection::{self, Shared};
use crate::frame::{Frame, FrameRange};
use crate::parser::parse_id;
use crate::types::{ConnectionState, StreamError, StreamEvent, StreamResult, StreamStats};
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Main stream controller
///
/// Created inside a Tokio runtime; connects automatically unless the
/// configuration disables `auto_connect`. Dropping the controller
/// cancels all background activity.
pub struct StreamController {
    /// Session id, used to correlate log lines
    pub id: String,
    shared: Arc<Shared>,
    cancel: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamController {
    /// Create a controller and, unless disabled, start connecting.
    pub fn new(config: StreamConfig) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let url = config.resolve_url();
        let auto_connect = config.auto_connect;
        let shared = Arc::new(Shared::new(config, url, id.clone()));

        let controller = Self {
            id,
            shared,
            cancel: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
        };

        if auto_connect {
            // a fresh controller cannot already be running
            let _ = controller.start();
        }

        controller
    }

    /// Register the observer callback for stream events.
    pub fn on_event<F>(&self, callback: F)
    where
        F: Fn(StreamEvent) + Send + Sync + 'static,
    {
        *self.shared.event_callback.write() = Some(Box::new(callback));
    }

    /// Begin (or resume after `stop`) the connection lifecycle.
    pub fn start(&self) -> StreamResult<()> {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(StreamError::AlreadyRunning);
        }

        self.shared.manual_stop.store(false, Ordering::Relaxed);
        self.shared.reconnect_attempts.store(0, Ordering::Relaxed);

        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();

        log::info!("[{}] starting stream controller: {}", self.id, self.shared.url);
        *task = Some(connection::spawn_supervisor(
            Arc::clone(&self.shared),
            token,
        ));

        Ok(())
    }

    /// Stop the stream: suppress any scheduled reconnect, close the
    /// transport, and drop all buffered data. Idempotent.
    pub fn stop(&self) {
        log::info!("[{}] stopping stream controller", self.id);
        self.shared.manual_stop.store(true, Ordering::Relaxed);
        self.cancel.lock().cancel();
        self.shared.clear_heartbeat();
        self.shared.set_state(ConnectionState::Disconnected);
        self.shared.buffer.lock().clear();
    }

    /// Whether the supervisor task is alive (connected or retrying).
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Read-only snapshot of the buffered frames, oldest first.
    pub fn frames(&self) -> Vec<Frame> {
        self.shared.buffer.lock().snapshot()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn stats(&self) -> StreamStats {
        self.shared.buffer.lock().stats()
    }

    /// Timestamp of the last successfully parsed message, if any.
    pub fn last_heartbeat(&self) -> Option<i64> {
        self.shared.last_heartbeat()
    }

    /// The resolved stream endpoint.
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn range(&self) -> FrameRange {
        self.shared.buffer.lock().range()
    }

    /// Replace the active range filter; buffered frames outside the new
    /// range are removed immediately.
    pub fn set_range(&self, range: FrameRange) {
        self.shared.buffer.lock().set_range(range);
    }

    /// Derive the new range from the current one.
    pub fn update_range<F>(&self, update: F)
    where
        F: FnOnce(FrameRange) -> FrameRange,
    {
        let mut buffer = self.shared.buffer.lock();
        let next = update(buffer.range());
        buffer.set_range(next);
    }

    /// Set the range from caller-typed bounds. An empty bound is
    /// unbounded; anything unparseable is rejected without touching the
    /// connection or the current range.
    pub fn set_range_hex(&self, min: &str, max: &str) -> StreamResult<()> {
        let parse_bound = |input: &str| -> StreamResult<Option<u32>> {
            let trimmed = input.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            parse_id(trimmed)
                .map(Some)
                .ok_or_else(|| StreamError::InvalidConfig(format!("Invalid range bound: {}", input)))
        };

        let range = FrameRange::new(parse_bound(min)?, parse_bound(max)?);
        self.set_range(range);
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.shared.buffer.lock().is_paused()
    }

    /// While paused, inbound frames still feed the heartbeat but are
    /// discarded before the buffer or the dedup tracker see them.
    pub fn set_paused(&self, paused: bool) {
        self.shared.buffer.lock().set_paused(paused);
    }

    /// Empty the buffer and reset all counters and the dedup tracker.
    pub fn clear(&self) {
        self.shared.buffer.lock().clear();
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        // no background activity may outlive the controller
        self.shared.manual_stop.store(true, Ordering::Relaxed);
        self.cancel.lock().cancel();
        log::debug!("[{}] stream controller dropped", self.id);
    }
}
