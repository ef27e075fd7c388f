//! Symbol book cache
//!
//! Holds the latest book per symbol. Each symbol has its own slot: a mutex
//! around the mutable book (the single writer path) and a read lock around
//! the last published immutable state. Ingesting one symbol never touches
//! another symbol's locks, and readers only ever see whole states.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use types::errors::StreamError;
use types::symbol::Symbol;

use crate::events::BookUpdate;
use crate::ingestion::IngestError;
use crate::order_book::{ApplyOutcome, BookState, OrderBook};

/// Default number of levels published per side.
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// What an ingest did to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New state published.
    Applied(Arc<BookState>),
    /// Stale update dropped; the published state is unchanged.
    Ignored,
}

struct SymbolSlot {
    book: Mutex<OrderBook>,
    published: RwLock<Option<Arc<BookState>>>,
}

impl SymbolSlot {
    fn new(symbol: Symbol) -> Self {
        Self {
            book: Mutex::new(OrderBook::new(symbol)),
            published: RwLock::new(None),
        }
    }
}

/// Latest book per symbol, shared by the ingest path and every session.
pub struct SymbolBookCache {
    slots: DashMap<Symbol, Arc<SymbolSlot>>,
    max_depth: usize,
    updates_applied: AtomicU64,
    updates_ignored: AtomicU64,
    updates_rejected: AtomicU64,
}

impl SymbolBookCache {
    pub fn new(max_depth: usize) -> Self {
        Self {
            slots: DashMap::new(),
            max_depth: max_depth.max(1),
            updates_applied: AtomicU64::new(0),
            updates_ignored: AtomicU64::new(0),
            updates_rejected: AtomicU64::new(0),
        }
    }

    /// Apply an upstream update and publish the resulting state.
    ///
    /// Publication happens while the book lock is still held, so published
    /// versions for a symbol only ever move forward.
    pub fn ingest(&self, symbol: &Symbol, update: &BookUpdate) -> Result<IngestOutcome, IngestError> {
        let slot = self.slot(symbol);
        let mut book = slot.book.lock();

        match book.apply(update) {
            Ok(ApplyOutcome::Applied(_)) => {
                let state = Arc::new(book.state(self.max_depth));
                *slot.published.write() = Some(Arc::clone(&state));
                self.updates_applied.fetch_add(1, Ordering::Relaxed);
                Ok(IngestOutcome::Applied(state))
            }
            Ok(ApplyOutcome::Ignored) => {
                self.updates_ignored.fetch_add(1, Ordering::Relaxed);
                Ok(IngestOutcome::Ignored)
            }
            Err(e) => {
                self.updates_rejected.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Latest published state for `symbol`.
    ///
    /// Never fabricates an empty book: a symbol nothing has been applied to
    /// yet reports `UpstreamDataUnavailable`.
    pub fn snapshot(&self, symbol: &Symbol) -> Result<Arc<BookState>, StreamError> {
        let unavailable = || StreamError::UpstreamDataUnavailable {
            symbol: symbol.clone(),
        };
        let slot = self
            .slots
            .get(symbol)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(unavailable)?;
        let published = slot.published.read().clone();
        published.ok_or_else(unavailable)
    }

    /// Symbols with a published book, sorted.
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self
            .slots
            .iter()
            .filter(|entry| entry.value().published.read().is_some())
            .map(|entry| entry.key().clone())
            .collect();
        symbols.sort();
        symbols
    }

    /// Number of symbols with a published book.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.value().published.read().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn updates_applied(&self) -> u64 {
        self.updates_applied.load(Ordering::Relaxed)
    }

    pub fn updates_ignored(&self) -> u64 {
        self.updates_ignored.load(Ordering::Relaxed)
    }

    pub fn updates_rejected(&self) -> u64 {
        self.updates_rejected.load(Ordering::Relaxed)
    }

    fn slot(&self, symbol: &Symbol) -> Arc<SymbolSlot> {
        if let Some(slot) = self.slots.get(symbol) {
            return Arc::clone(slot.value());
        }
        // Clone out of the entry so the shard lock is released before the
        // book mutex is taken.
        let entry = self
            .slots
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(SymbolSlot::new(symbol.clone())));
        Arc::clone(entry.value())
    }
}

impl Default for SymbolBookCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}
