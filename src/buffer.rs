// Bounded working set of accepted frames
//
// Holds the ordered recent-activity window the display layer renders:
// capacity-bounded with FIFO eviction, duplicate-suppressed, and
// filtered by the active identifier range. Retroactive filtering means a
// narrowed range immediately removes already-buffered frames, not just
// future arrivals.

use crate::frame::{Frame, FrameRange};
use crate::types::{now_ms, StreamStats};
use std::collections::{HashMap, VecDeque};

/// Dedup tracker entries older than this are eligible for pruning.
const DEDUP_MAX_AGE_MS: i64 = 60_000;

/// Prune the tracker once it grows past this multiple of the buffer
/// capacity.
const DEDUP_PRUNE_FACTOR: usize = 4;

/// What `add_frame` did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Appended to the buffer
    Accepted,
    /// Discarded without any side effect because ingestion is paused
    Paused,
    /// Discarded as a stale repeat of an already-seen frame
    Duplicate,
    /// Discarded by the active range filter
    OutOfRange,
}

/// Bounded, deduplicated, range-filtered frame buffer.
///
/// Not internally synchronized; the connection supervisor and the
/// controller share it behind one lock, which is the only mutation path.
pub struct FrameBuffer {
    frames: VecDeque<Frame>,
    max_buffer: usize,
    range: FrameRange,
    paused: bool,
    // signature -> last seen timestamp, for stale-repeat suppression
    dedup: HashMap<String, i64>,
    total_received: u64,
    dropped_by_filter: u64,
}

impl FrameBuffer {
    pub fn new(max_buffer: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(max_buffer),
            max_buffer: max_buffer.max(1),
            range: FrameRange::unbounded(),
            paused: false,
            dedup: HashMap::new(),
            total_received: 0,
            dropped_by_filter: 0,
        }
    }

    /// Admit one parsed frame into the working set.
    ///
    /// Order matters: pause discards before the dedup tracker ever sees
    /// the frame, duplicates are recorded before the range check, and
    /// only in-range frames count as received.
    pub fn add_frame(&mut self, frame: Frame) -> AddOutcome {
        if self.paused {
            return AddOutcome::Paused;
        }

        let signature = frame.dedup_signature();
        if let Some(&last_seen) = self.dedup.get(&signature) {
            if last_seen >= frame.timestamp {
                return AddOutcome::Duplicate;
            }
        }
        self.dedup.insert(signature, frame.timestamp);
        if self.dedup.len() > self.max_buffer * DEDUP_PRUNE_FACTOR {
            self.prune_dedup(now_ms());
        }

        if !self.range.contains(frame.id) {
            self.dropped_by_filter += 1;
            return AddOutcome::OutOfRange;
        }

        self.total_received += 1;
        self.frames.push_back(frame);
        while self.frames.len() > self.max_buffer {
            self.frames.pop_front();
        }
        AddOutcome::Accepted
    }

    fn prune_dedup(&mut self, now: i64) {
        self.dedup
            .retain(|_, last_seen| now - *last_seen <= DEDUP_MAX_AGE_MS);
    }

    /// Replace the active range and retroactively drop buffered frames
    /// that no longer pass it.
    pub fn set_range(&mut self, range: FrameRange) {
        self.range = range.normalized();
        let range = self.range;
        self.frames.retain(|frame| range.contains(frame.id));
    }

    pub fn range(&self) -> FrameRange {
        self.range
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Read-only snapshot of the buffered frames, oldest first.
    pub fn snapshot(&self) -> Vec<Frame> {
        self.frames.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            total_received: self.total_received,
            dropped_by_filter: self.dropped_by_filter,
            buffered: self.frames.len(),
            capacity: self.max_buffer,
        }
    }

    /// Full reset: frames, counters, and the dedup tracker.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.dedup.clear();
        self.total_received = 0;
        self.dropped_by_filter = 0;
    }

    /// Drop buffered frames only, keeping counters and the dedup tracker.
    /// Used on connection loss so stale data never lingers as if live.
    pub fn clear_frames(&mut self) {
        self.frames.clear();
    }
}
