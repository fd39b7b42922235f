//! Rate-limited rendering of a growing answer into placeholder edits.
//!
//! The throttler is a pure state machine over a [`PendingResponse`]: callers feed it deltas, timer ticks,
//! and edit completions, and it answers with an [`Action`]. It only ever hands out one edit at a time, and
//! text that arrives while an edit is outstanding is coalesced into the next one.

use std::time::Duration;

use tokio::time::Instant;

use crate::base::types::{MessageHandle, StreamDelta};

/// What the caller should do after feeding the throttler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Skip,
    /// Edit the placeholder to show this text.
    Flush(String),
}

/// The answer being rendered for one mention.
#[derive(Debug)]
pub struct PendingResponse {
    handle: MessageHandle,
    accumulated: String,
    last_flush: Option<Instant>,
    attempted_len: usize,
    flushed_len: usize,
    dirty: bool,
    in_flight: bool,
    finished: bool,
    final_attempted: bool,
}

impl PendingResponse {
    pub fn new(handle: MessageHandle) -> Self {
        Self {
            handle,
            accumulated: String::new(),
            last_flush: None,
            attempted_len: 0,
            flushed_len: 0,
            dirty: false,
            in_flight: false,
            finished: false,
            final_attempted: false,
        }
    }

    pub fn handle(&self) -> &MessageHandle {
        &self.handle
    }

    /// All text received so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// The prefix of the accumulated text that a successful edit has shown.
    pub fn flushed(&self) -> &str {
        &self.accumulated[..self.flushed_len]
    }

    /// Text that no successful edit has shown yet.
    pub fn unshown(&self) -> &str {
        &self.accumulated[self.flushed_len..]
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Finished, with no edit outstanding and nothing left to attempt.
    pub fn is_settled(&self) -> bool {
        self.finished && !self.in_flight && (!self.dirty || self.accumulated.trim().is_empty())
    }

    /// Marks the stream as over without a terminal marker.
    pub fn finish(&mut self) {
        self.finished = true;
    }
}

/// Decides when accumulated text becomes a visible edit.
#[derive(Debug, Clone, Copy)]
pub struct EditThrottler {
    min_interval: Duration,
}

impl EditThrottler {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    /// Accumulates a delta, then decides whether to flush.
    ///
    /// A terminal delta forces a flush of any text not yet attempted, regardless of the interval.
    pub fn on_delta(&self, delta: StreamDelta, pending: &mut PendingResponse, now: Instant) -> Action {
        if let Some(text) = delta.text.filter(|t| !t.is_empty()) {
            pending.accumulated.push_str(&text);
            pending.dirty = true;
        }

        if delta.finish_reason.is_some() {
            pending.finished = true;
        }

        self.poll(pending, now)
    }

    /// Records the result of the outstanding edit, then decides whether to flush again.
    ///
    /// A failed edit is not retried on its own while the stream is open: only text that arrived
    /// since it was issued (or the end of the stream) leads to another edit.
    pub fn on_edit_complete(&self, succeeded: bool, pending: &mut PendingResponse, now: Instant) -> Action {
        pending.in_flight = false;

        if succeeded {
            pending.flushed_len = pending.attempted_len;
        }

        self.poll(pending, now)
    }

    /// Flushes if there is unattempted text, no edit in flight, and the interval allows it.
    ///
    /// Once the stream is finished, text that no edit has shown yet gets exactly one more attempt,
    /// even when an earlier edit of the same text failed.
    pub fn poll(&self, pending: &mut PendingResponse, now: Instant) -> Action {
        if pending.finished && !pending.in_flight && !pending.final_attempted && pending.flushed_len < pending.accumulated.len() {
            pending.dirty = true;
        }

        if pending.in_flight || !pending.dirty || pending.accumulated.trim().is_empty() {
            return Action::Skip;
        }

        if !pending.finished && !self.interval_elapsed(pending, now) {
            return Action::Skip;
        }

        pending.in_flight = true;
        pending.dirty = false;
        pending.final_attempted = pending.finished;
        pending.last_flush = Some(now);
        pending.attempted_len = pending.accumulated.len();

        Action::Flush(pending.accumulated.clone())
    }

    /// When the next flush becomes possible, if one is waiting on the interval alone.
    pub fn next_flush_at(&self, pending: &PendingResponse) -> Option<Instant> {
        if pending.in_flight || !pending.dirty || pending.accumulated.trim().is_empty() {
            return None;
        }

        pending.last_flush.map(|last| last + self.min_interval)
    }

    fn interval_elapsed(&self, pending: &PendingResponse, now: Instant) -> bool {
        pending.last_flush.is_none_or(|last| now.saturating_duration_since(last) >= self.min_interval)
    }
}
