//! In-memory order book state builder
//!
//! Maintains the mirrored book for one symbol from upstream snapshots and
//! diffs. Uses `BTreeMap` so both sides iterate in price order and a price
//! can only ever appear once per side.
//!
//! Each applied update bumps the book version by exactly one and produces a
//! fresh immutable [`BookState`] for readers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;
use types::numeric::{Level, Price, Quantity};
use types::symbol::Symbol;

use crate::events::{BookUpdate, UpdateKind};
use crate::ingestion::{IngestError, Sequencing, UpdateSequencer};

/// Immutable view of a symbol's book at one version.
///
/// Bids in descending price order (best first), asks ascending (best first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookState {
    pub symbol: Symbol,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    /// Bumped by one on every applied update.
    pub version: u64,
}

impl BookState {
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(Level::price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(Level::price)
    }
}

/// Result of applying one update to the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Book changed; carries the new version.
    Applied(u64),
    /// Update was older than the book and was dropped.
    Ignored,
}

/// Mutable order book mirror for a single symbol.
#[derive(Debug, Clone)]
pub struct OrderBook {
    /// Trading pair symbol.
    symbol: Symbol,
    /// Bid levels: price → quantity (BTreeMap sorts ascending, reversed on read).
    bids: BTreeMap<Price, Quantity>,
    /// Ask levels: price → quantity (ascending = best ask first).
    asks: BTreeMap<Price, Quantity>,
    /// Upstream id tracking.
    sequencer: UpdateSequencer,
    /// Number of updates applied so far.
    version: u64,
}

impl OrderBook {
    /// Create an empty order book for the given symbol.
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            sequencer: UpdateSequencer::new(),
            version: 0,
        }
    }

    /// Apply a snapshot or diff.
    ///
    /// Either the whole update is applied or none of it: sequencing is
    /// checked before any level is touched.
    pub fn apply(&mut self, update: &BookUpdate) -> Result<ApplyOutcome, IngestError> {
        if self.sequencer.check(update)? == Sequencing::Stale {
            return Ok(ApplyOutcome::Ignored);
        }

        if update.kind == UpdateKind::Snapshot {
            self.bids.clear();
            self.asks.clear();
        }
        apply_levels(&mut self.bids, &update.bids);
        apply_levels(&mut self.asks, &update.asks);

        self.sequencer.commit(update);
        self.version += 1;

        trace!(
            symbol = %self.symbol,
            version = self.version,
            kind = update.kind_label(),
            bid_depth = self.bids.len(),
            ask_depth = self.asks.len(),
            "Applied book update"
        );

        Ok(ApplyOutcome::Applied(self.version))
    }

    /// Build an immutable state with at most `max_depth` levels per side.
    pub fn state(&self, max_depth: usize) -> BookState {
        let bids = self
            .bids
            .iter()
            .rev() // Descending for bids (best bid = highest price)
            .take(max_depth)
            .map(|(price, qty)| Level::new(*price, *qty))
            .collect();

        let asks = self
            .asks
            .iter()
            .take(max_depth) // Ascending for asks (best ask = lowest price)
            .map(|(price, qty)| Level::new(*price, *qty))
            .collect();

        BookState {
            symbol: self.symbol.clone(),
            bids,
            asks,
            version: self.version,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of bid price levels.
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    /// Number of ask price levels.
    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    pub fn sequencer(&self) -> &UpdateSequencer {
        &self.sequencer
    }
}

/// Upsert levels; a zero quantity removes the price if present.
fn apply_levels(side: &mut BTreeMap<Price, Quantity>, levels: &[Level]) {
    for level in levels {
        if level.quantity().is_zero() {
            side.remove(&level.price());
        } else {
            side.insert(level.price(), level.quantity());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn make_book() -> OrderBook {
        OrderBook::new(Symbol::parse("BTCUSDT").unwrap())
    }

    fn lvl(price: u64, qty: u64) -> Level {
        Level::new(Price::from_u64(price), Quantity::from_u64(qty))
    }

    #[test]
    fn test_empty_book() {
        let book = make_book();
        let state = book.state(20);
        assert_eq!(book.bid_depth(), 0);
        assert_eq!(book.ask_depth(), 0);
        assert_eq!(state.version, 0);
        assert!(state.best_bid().is_none());
        assert!(state.best_ask().is_none());
    }

    #[test]
    fn test_snapshot_orders_sides() {
        let mut book = make_book();
        book.apply(&BookUpdate::snapshot(
            vec![lvl(49000, 1), lvl(50000, 2), lvl(49500, 3)],
            vec![lvl(51500, 1), lvl(51000, 2)],
        ))
        .unwrap();

        let state = book.state(20);
        let bid_prices: Vec<_> = state.bids.iter().map(|l| l.price()).collect();
        let ask_prices: Vec<_> = state.asks.iter().map(|l| l.price()).collect();

        assert_eq!(
            bid_prices,
            vec![Price::from_u64(50000), Price::from_u64(49500), Price::from_u64(49000)]
        );
        assert_eq!(ask_prices, vec![Price::from_u64(51000), Price::from_u64(51500)]);
        assert_eq!(state.best_bid(), Some(Price::from_u64(50000)));
        assert_eq!(state.best_ask(), Some(Price::from_u64(51000)));
    }

    #[test]
    fn test_snapshot_replaces_book() {
        let mut book = make_book();
        book.apply(&BookUpdate::snapshot(vec![lvl(100, 1)], vec![lvl(101, 1)]))
            .unwrap();
        book.apply(&BookUpdate::snapshot(vec![lvl(200, 1)], vec![])).unwrap();

        let state = book.state(20);
        assert_eq!(state.bids, vec![lvl(200, 1)]);
        assert!(state.asks.is_empty());
    }

    #[test]
    fn test_diff_upserts_and_removes_levels() {
        let mut book = make_book();
        book.apply(&BookUpdate::snapshot(
            vec![lvl(100, 1), lvl(99, 1)],
            vec![lvl(101, 1)],
        ))
        .unwrap();

        // Replace qty at 100, remove 99, add 98
        book.apply(&BookUpdate::diff(
            vec![lvl(100, 5), lvl(99, 0), lvl(98, 2)],
            vec![],
        ))
        .unwrap();

        let state = book.state(20);
        assert_eq!(state.bids, vec![lvl(100, 5), lvl(98, 2)]);
        assert_eq!(state.asks, vec![lvl(101, 1)]);
    }

    #[test]
    fn test_removing_missing_level_is_harmless() {
        let mut book = make_book();
        let outcome = book
            .apply(&BookUpdate::diff(vec![lvl(100, 0)], vec![]))
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied(1));
        assert_eq!(book.bid_depth(), 0);
    }

    #[test]
    fn test_version_bumps_once_per_update() {
        let mut book = make_book();
        assert_eq!(
            book.apply(&BookUpdate::snapshot(vec![lvl(1, 1)], vec![])).unwrap(),
            ApplyOutcome::Applied(1)
        );
        assert_eq!(
            book.apply(&BookUpdate::diff(vec![lvl(2, 1)], vec![])).unwrap(),
            ApplyOutcome::Applied(2)
        );
        assert_eq!(book.version(), 2);
    }

    #[test]
    fn test_stale_update_does_not_bump_version() {
        let mut book = make_book();
        book.apply(&BookUpdate::snapshot(vec![lvl(1, 1)], vec![]).with_update_ids(1, 10))
            .unwrap();

        let outcome = book
            .apply(&BookUpdate::diff(vec![lvl(2, 1)], vec![]).with_update_ids(5, 9))
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Ignored);
        assert_eq!(book.version(), 1);
        assert_eq!(book.bid_depth(), 1);
    }

    #[test]
    fn test_gap_leaves_book_untouched() {
        let mut book = make_book();
        book.apply(&BookUpdate::snapshot(vec![lvl(1, 1)], vec![]).with_update_ids(1, 10))
            .unwrap();

        let err = book
            .apply(&BookUpdate::diff(vec![lvl(2, 1)], vec![]).with_update_ids(15, 16))
            .unwrap_err();
        assert!(matches!(err, IngestError::SequenceGap { .. }));
        assert_eq!(book.version(), 1);
        assert_eq!(book.bid_depth(), 1);
    }

    #[test]
    fn test_state_depth_limit() {
        let mut book = make_book();
        let bids = (1..=30).map(|i| lvl(1000 - i, 1)).collect();
        let asks = (1..=30).map(|i| lvl(1000 + i, 1)).collect();
        book.apply(&BookUpdate::snapshot(bids, asks)).unwrap();

        let state = book.state(20);
        assert_eq!(state.bids.len(), 20);
        assert_eq!(state.asks.len(), 20);
        assert_eq!(state.best_bid(), Some(Price::from_u64(999)));
        assert_eq!(state.best_ask(), Some(Price::from_u64(1001)));
        assert_eq!(book.bid_depth(), 30);
    }

    #[test]
    fn test_state_serialization() {
        let mut book = make_book();
        book.apply(&BookUpdate::snapshot(vec![lvl(1800, 2)], vec![lvl(1801, 3)]))
            .unwrap();

        let state = book.state(10);
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: BookState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }

    fn arb_levels() -> impl Strategy<Value = Vec<Level>> {
        prop::collection::vec((1u64..50, 0u64..5), 0..20)
            .prop_map(|pairs| pairs.into_iter().map(|(p, q)| lvl(p, q)).collect())
    }

    proptest! {
        #[test]
        fn prop_sides_sorted_unique_and_non_zero(
            diffs in prop::collection::vec((arb_levels(), arb_levels()), 1..30)
        ) {
            let mut book = make_book();
            let mut last_version = 0;

            for (bids, asks) in diffs {
                match book.apply(&BookUpdate::diff(bids, asks)).unwrap() {
                    ApplyOutcome::Applied(version) => {
                        prop_assert_eq!(version, last_version + 1);
                        last_version = version;
                    }
                    ApplyOutcome::Ignored => prop_assert!(false, "diffs without ids never go stale"),
                }

                let state = book.state(usize::MAX);
                prop_assert!(state.bids.windows(2).all(|w| w[0].price() > w[1].price()));
                prop_assert!(state.asks.windows(2).all(|w| w[0].price() < w[1].price()));
                prop_assert!(state.bids.iter().chain(state.asks.iter()).all(|l| !l.quantity().is_zero()));
            }
        }
    }
}
