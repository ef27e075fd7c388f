//! Market Data Service
//!
//! Mirrors the upstream order book feed and serves the latest state per
//! symbol:
//! - Snapshot / diff ingestion with update-id continuity checks
//! - Per-symbol order book mirrors with top-N depth publication
//! - Immutable, versioned `BookState`s for concurrent readers
//! - Pluggable upstream sources (in-process channel, journal replay)
//!
//! # Architecture
//!
//! ```text
//!  MarketDataSource
//!        │
//!    ┌───▼────┐
//!    │Sequence│  ← Drops stale diffs, detects gaps
//!    └───┬────┘
//!        │
//!   ┌────▼─────┐
//!   │OrderBook │  ← One per symbol, behind its own lock
//!   └────┬─────┘
//!        │
//!   ┌────▼──────────┐
//!   │Arc<BookState> │  ← Published snapshot, read by the gateway
//!   └───────────────┘
//! ```

pub mod cache;
pub mod events;
pub mod ingestion;
pub mod order_book;
pub mod replay;
pub mod source;

pub use cache::{IngestOutcome, SymbolBookCache, DEFAULT_MAX_DEPTH};
pub use events::{BookUpdate, SourceEvent, UpdateKind};
pub use ingestion::IngestError;
pub use order_book::BookState;
pub use source::{ChannelSource, MarketDataSource};
