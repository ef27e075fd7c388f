//! Upstream update definitions for the book cache
//!
//! The market data source is opaque: whatever feed it wraps, it hands the
//! cache a stream of per-symbol `BookUpdate`s, either full snapshots or
//! level diffs. Update ids are optional; feeds that carry them get gap and
//! staleness checking in the ingestion layer.

use serde::{Deserialize, Serialize};
use types::numeric::Level;
use types::symbol::Symbol;

/// Whether an update replaces the book or patches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Full book; replaces every level on both sides.
    Snapshot,
    /// Level upserts; a zero quantity removes the price level.
    Diff,
}

/// A single update for one symbol from the market data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUpdate {
    pub kind: UpdateKind,
    /// First upstream update id covered by this update (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_update_id: Option<u64>,
    /// Last upstream update id covered by this update (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_id: Option<u64>,
    #[serde(default)]
    pub bids: Vec<Level>,
    #[serde(default)]
    pub asks: Vec<Level>,
}

impl BookUpdate {
    /// Full-book update without upstream ids.
    pub fn snapshot(bids: Vec<Level>, asks: Vec<Level>) -> Self {
        Self {
            kind: UpdateKind::Snapshot,
            first_update_id: None,
            last_update_id: None,
            bids,
            asks,
        }
    }

    /// Level diff without upstream ids.
    pub fn diff(bids: Vec<Level>, asks: Vec<Level>) -> Self {
        Self {
            kind: UpdateKind::Diff,
            first_update_id: None,
            last_update_id: None,
            bids,
            asks,
        }
    }

    /// Attach the upstream update id range this update covers.
    pub fn with_update_ids(mut self, first: u64, last: u64) -> Self {
        self.first_update_id = Some(first);
        self.last_update_id = Some(last);
        self
    }

    /// Label for logging.
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            UpdateKind::Snapshot => "snapshot",
            UpdateKind::Diff => "diff",
        }
    }
}

/// An update tagged with the symbol it belongs to, as produced by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEvent {
    pub symbol: Symbol,
    #[serde(flatten)]
    pub update: BookUpdate,
}
