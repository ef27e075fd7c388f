//! Update sequencing for the book cache
//!
//! Validates upstream update ids per symbol before an update is applied:
//! stale diffs are dropped, gaps take the book out of sync until the next
//! snapshot. Feeds that carry no update ids are applied as they come.
//!
//! Invariants enforced for id-carrying diffs:
//! - No update applied twice (stale `last_update_id` is ignored)
//! - No silent gaps (`first_update_id` must not skip past `last + 1`)

use tracing::{debug, warn};

use crate::events::{BookUpdate, UpdateKind};

/// Errors that can occur while sequencing an update.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("sequence gap detected: expected first update id <= {expected}, got {actual}")]
    SequenceGap { expected: u64, actual: u64 },

    #[error("book out of sync after a gap; waiting for snapshot")]
    OutOfSync,

    #[error("inverted update id range: first {first} > last {last}")]
    InvertedRange { first: u64, last: u64 },
}

/// Decision for an update that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequencing {
    /// Apply the update to the book.
    Apply,
    /// Update is older than the book; drop it without a version bump.
    Stale,
}

/// Tracks the last applied upstream id for one symbol.
#[derive(Debug, Clone)]
pub struct UpdateSequencer {
    /// Last upstream update id applied to the book.
    last_update_id: Option<u64>,
    /// False after a gap until a snapshot resynchronizes the book.
    in_sync: bool,
    /// Total updates accepted.
    updates_applied: u64,
    /// Total stale updates dropped.
    updates_stale: u64,
    /// Total gaps detected.
    gaps_detected: u64,
}

impl UpdateSequencer {
    pub fn new() -> Self {
        Self {
            last_update_id: None,
            in_sync: true,
            updates_applied: 0,
            updates_stale: 0,
            gaps_detected: 0,
        }
    }

    /// Validate an update against the last applied id.
    ///
    /// Must be followed by [`UpdateSequencer::commit`] once the update has
    /// actually been applied.
    pub fn check(&mut self, update: &BookUpdate) -> Result<Sequencing, IngestError> {
        if let (Some(first), Some(last)) = (update.first_update_id, update.last_update_id) {
            if first > last {
                return Err(IngestError::InvertedRange { first, last });
            }
        }

        if update.kind == UpdateKind::Snapshot {
            return Ok(Sequencing::Apply);
        }

        if !self.in_sync {
            return Err(IngestError::OutOfSync);
        }

        let Some(applied) = self.last_update_id else {
            return Ok(Sequencing::Apply);
        };

        if let Some(last) = update.last_update_id {
            if last <= applied {
                self.updates_stale += 1;
                debug!(
                    last_applied = applied,
                    received_last = last,
                    "Dropping stale diff"
                );
                return Ok(Sequencing::Stale);
            }
        }

        if let Some(first) = update.first_update_id {
            let expected = applied + 1;
            if first > expected {
                self.in_sync = false;
                self.gaps_detected += 1;
                warn!(
                    expected,
                    actual = first,
                    "Update id gap detected; book out of sync until next snapshot"
                );
                return Err(IngestError::SequenceGap {
                    expected,
                    actual: first,
                });
            }
        }

        Ok(Sequencing::Apply)
    }

    /// Record that `update` has been applied.
    pub fn commit(&mut self, update: &BookUpdate) {
        if update.kind == UpdateKind::Snapshot {
            self.in_sync = true;
            self.last_update_id = update.last_update_id;
        } else if update.last_update_id.is_some() {
            self.last_update_id = update.last_update_id;
        }
        self.updates_applied += 1;
    }

    /// Last applied upstream id, if the feed carries ids.
    pub fn last_update_id(&self) -> Option<u64> {
        self.last_update_id
    }

    pub fn is_in_sync(&self) -> bool {
        self.in_sync
    }

    pub fn updates_applied(&self) -> u64 {
        self.updates_applied
    }

    pub fn updates_stale(&self) -> u64 {
        self.updates_stale
    }

    pub fn gaps_detected(&self) -> u64 {
        self.gaps_detected
    }
}

impl Default for UpdateSequencer {
    fn default() -> Self {
        Self::new()
    }
}
