// Connection supervisor
//
// One spawned task owns the whole transport lifecycle: connect, pump
// inbound messages into the buffer, watch for silent stalls, reconnect
// with exponential backoff, and honor manual stop. All shared mutable
// state (buffer, counters, heartbeat, flags) lives in `Shared`, and the
// supervisor is its only writer besides the controller's imperative
// operations; the cancellation token is checked before every deferred
// action so a stop issued mid-backoff fully suppresses the reconnect.

use crate::buffer::{AddOutcome, FrameBuffer};
use crate::config::StreamConfig;
use crate::parser;
use crate::source::{create_transport, StreamTransport};
use crate::types::{now_ms, ConnectionState, StreamEvent};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Reconnect delay ceiling
pub(crate) const MAX_BACKOFF_MS: u64 = 15_000;

/// Exponential backoff: 2s, 4s, 8s, then capped at 15s. `attempt` is
/// 1-based (incremented before each scheduling).
pub(crate) fn backoff_delay_ms(attempt: u32) -> u64 {
    (1000u64 << attempt.min(6)).min(MAX_BACKOFF_MS)
}

/// State shared between the supervisor task and the controller façade.
pub(crate) struct Shared {
    pub config: StreamConfig,
    pub url: String,
    /// Session id, only used to correlate log lines
    pub session: String,
    pub state: RwLock<ConnectionState>,
    pub buffer: Mutex<FrameBuffer>,
    /// Epoch ms of the last successfully parsed message; 0 means none
    pub last_heartbeat: AtomicI64,
    pub manual_stop: AtomicBool,
    pub reconnect_attempts: AtomicU32,
    pub event_callback: RwLock<Option<Box<dyn Fn(StreamEvent) + Send + Sync>>>,
}

impl Shared {
    pub fn new(config: StreamConfig, url: String, session: String) -> Self {
        let buffer = FrameBuffer::new(config.max_buffer);
        Self {
            config,
            url,
            session,
            state: RwLock::new(ConnectionState::Disconnected),
            buffer: Mutex::new(buffer),
            last_heartbeat: AtomicI64::new(0),
            manual_stop: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
            event_callback: RwLock::new(None),
        }
    }

    pub fn emit(&self, event: StreamEvent) {
        if let Some(callback) = self.event_callback.read().as_ref() {
            callback(event);
        }
    }

    /// Update the connection state, notifying observers on change. The
    /// callback runs outside the state lock.
    pub fn set_state(&self, state: ConnectionState) {
        let changed = {
            let mut current = self.state.write();
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        };
        if changed {
            self.emit(StreamEvent::StateChanged { state });
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn stamp_heartbeat(&self) {
        self.last_heartbeat.store(now_ms(), Ordering::Relaxed);
    }

    pub fn clear_heartbeat(&self) {
        self.last_heartbeat.store(0, Ordering::Relaxed);
    }

    pub fn last_heartbeat(&self) -> Option<i64> {
        match self.last_heartbeat.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }
}

/// Why a connected transport was given up on.
enum LossReason {
    /// Cooperative cancellation via stop or drop
    Shutdown,
    /// Remote side closed the stream cleanly
    Closed,
    /// Transport reported an error
    Fault,
    /// No parseable data within the stale timeout
    Stale,
}

impl LossReason {
    fn as_str(&self) -> &'static str {
        match self {
            LossReason::Shutdown => "shutdown",
            LossReason::Closed => "closed by remote",
            LossReason::Fault => "transport fault",
            LossReason::Stale => "stalled",
        }
    }
}

pub(crate) fn spawn_supervisor(shared: Arc<Shared>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run_supervisor(shared, cancel))
}

async fn run_supervisor(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        if shared.manual_stop.load(Ordering::Relaxed) || cancel.is_cancelled() {
            break;
        }

        shared.set_state(ConnectionState::Connecting);

        let mut transport = match create_transport(&shared.url) {
            Ok(transport) => transport,
            Err(e) => {
                // terminal: the runtime has no transport for this URL
                log::error!("[{}] {}", shared.session, e);
                shared.set_state(ConnectionState::Unsupported);
                shared.emit(StreamEvent::Error {
                    message: e.to_string(),
                });
                return;
            }
        };

        let opened = tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            result = transport.open() => result,
        };

        match opened {
            Ok(()) => {
                shared.reconnect_attempts.store(0, Ordering::Relaxed);
                shared.stamp_heartbeat();
                shared.set_state(ConnectionState::Connected);

                let reason = drive_connected(&shared, transport.as_mut(), &cancel).await;
                transport.close().await;
                shared.clear_heartbeat();

                if matches!(reason, LossReason::Shutdown) {
                    break;
                }

                log::warn!("[{}] connection lost: {}", shared.session, reason.as_str());
                shared.set_state(ConnectionState::Disconnected);
                // a hard loss drops the window so stale frames never
                // present as live data
                shared.buffer.lock().clear_frames();
            }
            Err(e) => {
                log::warn!("[{}] connect failed: {}", shared.session, e);
                shared.set_state(ConnectionState::Disconnected);
                shared.emit(StreamEvent::Error {
                    message: e.to_string(),
                });
            }
        }

        if shared.manual_stop.load(Ordering::Relaxed) {
            break;
        }

        let attempt = shared.reconnect_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let delay = backoff_delay_ms(attempt);
        log::info!(
            "[{}] reconnecting in {} ms (attempt {})",
            shared.session,
            delay,
            attempt
        );

        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
        }
    }

    shared.set_state(ConnectionState::Disconnected);
    log::debug!("[{}] supervisor exited", shared.session);
}

/// Pump messages from an open transport until it is lost, cancelled, or
/// declared stale.
async fn drive_connected(
    shared: &Shared,
    transport: &mut dyn StreamTransport,
    cancel: &CancellationToken,
) -> LossReason {
    let stale_after_ms = shared.config.stale_timeout_ms as i64;
    let mut check = interval(Duration::from_millis(shared.config.heartbeat_check_ms()));
    check.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return LossReason::Shutdown,

            message = transport.next_message() => match message {
                Some(Ok(text)) => {
                    if let Some(frame) = parser::parse_frame(&text) {
                        // liveness is tracked even when the frame is
                        // later dropped as paused/duplicate/filtered
                        shared.stamp_heartbeat();
                        let (outcome, buffered) = {
                            let mut buffer = shared.buffer.lock();
                            let outcome = buffer.add_frame(frame);
                            (outcome, buffer.len())
                        };
                        if outcome == AddOutcome::Accepted {
                            shared.emit(StreamEvent::FrameReceived { buffered });
                        }
                    } else {
                        log::debug!("[{}] dropping unparseable message", shared.session);
                    }
                }
                Some(Err(e)) => {
                    shared.emit(StreamEvent::Error {
                        message: e.to_string(),
                    });
                    return LossReason::Fault;
                }
                None => return LossReason::Closed,
            },

            _ = check.tick() => {
                if let Some(last) = shared.last_heartbeat() {
                    let silence = now_ms().saturating_sub(last);
                    if silence > stale_after_ms {
                        log::warn!(
                            "[{}] no data for {} ms, treating stream as stalled",
                            shared.session,
                            silence
                        );
                        return LossReason::Stale;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_ceiling() {
        assert_eq!(backoff_delay_ms(1), 2000);
        assert_eq!(backoff_delay_ms(2), 4000);
        assert_eq!(backoff_delay_ms(3), 8000);
        assert_eq!(backoff_delay_ms(4), 15_000);
        assert_eq!(backoff_delay_ms(5), 15_000);
        assert_eq!(backoff_delay_ms(64), 15_000);
    }

    #[test]
    fn heartbeat_stamp_round_trip() {
        let shared = Shared::new(
            StreamConfig::default(),
            "ws://127.0.0.1:9277/telemetry/frames".to_string(),
            "test".to_string(),
        );
        assert_eq!(shared.last_heartbeat(), None);

        shared.stamp_heartbeat();
        assert!(shared.last_heartbeat().is_some());

        shared.clear_heartbeat();
        assert_eq!(shared.last_heartbeat(), None);
    }
}
