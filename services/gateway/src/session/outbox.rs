//! Per-session outbound queue
//!
//! Sits between the dispatcher and a connection's writer task. Pushing never
//! blocks: at most one book frame is ever queued (a newer book replaces the
//! queued one in place), and when the queue is full the oldest error frame
//! is dropped to make room. The queued book is never evicted: once offered,
//! its version counts as delivered and nothing would resend it.
//!
//! Closing the outbox wakes the writer; it drains what is left and stops.

use std::collections::VecDeque;
use std::sync::Arc;

use market_data::BookState;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

/// A frame waiting to be written to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Full current book for the subscribed symbol.
    Book(Arc<BookState>),
    /// Error text for the client.
    Error(String),
}

impl Outbound {
    pub fn is_book(&self) -> bool {
        matches!(self, Outbound::Book(_))
    }
}

/// What happened to a pushed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Replaced a book frame that had not been written yet.
    Superseded,
    /// Queue was full; the oldest error frame was discarded.
    DroppedOldest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("outbox closed")]
pub struct OutboxClosed;

#[derive(Debug)]
struct OutboxInner {
    frames: VecDeque<Outbound>,
    closed: bool,
    superseded: u64,
    dropped: u64,
}

#[derive(Debug)]
pub struct Outbox {
    inner: Mutex<OutboxInner>,
    notify: Notify,
    capacity: usize,
}

impl Outbox {
    /// Room for one book plus at least one error frame.
    pub const MIN_CAPACITY: usize = 2;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(Self::MIN_CAPACITY);
        Self {
            inner: Mutex::new(OutboxInner {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
                superseded: 0,
                dropped: 0,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Queue a frame for the writer.
    pub fn push(&self, frame: Outbound) -> Result<PushOutcome, OutboxClosed> {
        let outcome = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(OutboxClosed);
            }

            if frame.is_book() {
                if let Some(queued) = inner.frames.iter_mut().find(|f| f.is_book()) {
                    *queued = frame;
                    inner.superseded += 1;
                    return Ok(PushOutcome::Superseded);
                }
            }

            // Full means at least one error frame is queued, since books
            // take a single slot and capacity is at least two.
            let outcome = if inner.frames.len() >= self.capacity {
                if let Some(oldest) = inner.frames.iter().position(|f| !f.is_book()) {
                    inner.frames.remove(oldest);
                }
                inner.dropped += 1;
                warn!(
                    capacity = self.capacity,
                    dropped = inner.dropped,
                    "Outbox full, dropping oldest error frame"
                );
                PushOutcome::DroppedOldest
            } else {
                PushOutcome::Queued
            };
            inner.frames.push_back(frame);
            outcome
        };

        self.notify.notify_one();
        Ok(outcome)
    }

    /// Remove queued book frames, returning how many were removed.
    pub fn purge_books(&self) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.frames.len();
        inner.frames.retain(|f| !f.is_book());
        before - inner.frames.len()
    }

    /// Wait for the next frame. `None` once closed and drained.
    pub async fn pop(&self) -> Option<Outbound> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock();
                if let Some(frame) = inner.frames.pop_front() {
                    return Some(frame);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Take the next frame without waiting.
    pub fn try_pop(&self) -> Option<Outbound> {
        self.inner.lock().frames.pop_front()
    }

    /// Refuse further frames and wake the writer. Returns false if already closed.
    pub fn close(&self) -> bool {
        let first = {
            let mut inner = self.inner.lock();
            !std::mem::replace(&mut inner.closed, true)
        };
        if first {
            self.notify.notify_one();
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn superseded(&self) -> u64 {
        self.inner.lock().superseded
    }

    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }
}
