//! Service counters surfaced through `/stats`.
//!
//! Plain relaxed atomics: counters only ever move forward and are read
//! independently of each other.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Core counters for the gateway.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    // Session lifecycle
    pub sessions_registered: AtomicU64,
    pub sessions_attached: AtomicU64,
    pub sessions_closed: AtomicU64,
    pub sessions_reaped: AtomicU64,
    pub attach_rejected: AtomicU64,

    // Subscriptions
    pub subscriptions: AtomicU64,
    pub invalid_symbols: AtomicU64,

    // Delivery
    pub frames_queued: AtomicU64,
    pub frames_superseded: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub frames_sent: AtomicU64,
    pub write_timeouts: AtomicU64,

    // Ingestion
    pub ingests_applied: AtomicU64,
    pub ingests_ignored: AtomicU64,
    pub ingests_rejected: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_registered(&self) {
        self.sessions_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attached(&self) {
        self.sessions_attached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attach_rejected(&self) {
        self.attach_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reaped(&self) {
        self.sessions_reaped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subscription(&self) {
        self.subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_symbol(&self) {
        self.invalid_symbols.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_queued(&self) {
        self.frames_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// A queued book frame was replaced by a newer one before it was sent.
    pub fn record_frame_superseded(&self) {
        self.frames_superseded.fetch_add(1, Ordering::Relaxed);
    }

    /// The outbox was full and its oldest frame was discarded.
    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_timeout(&self) {
        self.write_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ingest_applied(&self) {
        self.ingests_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ingest_ignored(&self) {
        self.ingests_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ingest_rejected(&self) {
        self.ingests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            sessions_registered: load(&self.sessions_registered),
            sessions_attached: load(&self.sessions_attached),
            sessions_closed: load(&self.sessions_closed),
            sessions_reaped: load(&self.sessions_reaped),
            attach_rejected: load(&self.attach_rejected),
            subscriptions: load(&self.subscriptions),
            invalid_symbols: load(&self.invalid_symbols),
            frames_queued: load(&self.frames_queued),
            frames_superseded: load(&self.frames_superseded),
            frames_dropped: load(&self.frames_dropped),
            frames_sent: load(&self.frames_sent),
            write_timeouts: load(&self.write_timeouts),
            ingests_applied: load(&self.ingests_applied),
            ingests_ignored: load(&self.ingests_ignored),
            ingests_rejected: load(&self.ingests_rejected),
        }
    }
}

/// Serializable counter values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_registered: u64,
    pub sessions_attached: u64,
    pub sessions_closed: u64,
    pub sessions_reaped: u64,
    pub attach_rejected: u64,
    pub subscriptions: u64,
    pub invalid_symbols: u64,
    pub frames_queued: u64,
    pub frames_superseded: u64,
    pub frames_dropped: u64,
    pub frames_sent: u64,
    pub write_timeouts: u64,
    pub ingests_applied: u64,
    pub ingests_ignored: u64,
    pub ingests_rejected: u64,
}
