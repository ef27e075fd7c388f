//! Fan-out dispatcher
//!
//! Feeds upstream updates into the book cache and pushes each newly
//! published state to the sessions watching that symbol. Pushing only ever
//! touches one session's delivery lock and its non-blocking outbox, so a
//! slow client can never hold up ingestion or other clients.

use std::sync::Arc;

use market_data::{BookState, BookUpdate, IngestError, IngestOutcome, MarketDataSource, SymbolBookCache};
use tracing::{debug, info, warn};
use types::errors::StreamError;
use types::symbol::Symbol;

use crate::audit::{AuditEvent, AuditKind, AuditSink};
use crate::metrics::ServiceMetrics;
use crate::session::{Offer, PushOutcome, Session, SessionRegistry, SubscriptionRouter};

/// Per-ingest delivery summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Sessions that had the new state queued.
    pub delivered: usize,
    /// Of those, sessions where it replaced an unsent book.
    pub superseded: usize,
    /// Sessions closed because their outbox was gone.
    pub closed: usize,
}

pub struct Dispatcher {
    cache: Arc<SymbolBookCache>,
    router: Arc<SubscriptionRouter>,
    registry: Arc<SessionRegistry>,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<ServiceMetrics>,
}

impl Dispatcher {
    pub fn new(
        cache: Arc<SymbolBookCache>,
        router: Arc<SubscriptionRouter>,
        registry: Arc<SessionRegistry>,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            cache,
            router,
            registry,
            audit,
            metrics,
        }
    }

    /// Apply an upstream update and fan the new state out.
    ///
    /// A rejected update only affects its own symbol.
    pub fn ingest(&self, symbol: &Symbol, update: &BookUpdate) -> Result<FanOut, IngestError> {
        match self.cache.ingest(symbol, update) {
            Ok(IngestOutcome::Applied(state)) => {
                self.metrics.record_ingest_applied();
                Ok(self.fan_out(&state))
            }
            Ok(IngestOutcome::Ignored) => {
                self.metrics.record_ingest_ignored();
                Ok(FanOut::default())
            }
            Err(e) => {
                self.metrics.record_ingest_rejected();
                warn!(symbol = %symbol, kind = update.kind_label(), error = %e, "Rejected book update");
                Err(e)
            }
        }
    }

    fn fan_out(&self, state: &Arc<BookState>) -> FanOut {
        let mut summary = FanOut::default();

        // Router lock is released before any session lock is taken.
        for id in self.router.subscribers(&state.symbol) {
            let Some(session) = self.registry.get(&id) else {
                continue;
            };
            match self.offer(&session, state) {
                Offer::Delivered(outcome) => {
                    summary.delivered += 1;
                    if outcome == PushOutcome::Superseded {
                        summary.superseded += 1;
                    }
                }
                Offer::OutboxClosed => summary.closed += 1,
                Offer::Skipped | Offer::Detached => {}
            }
        }

        debug!(
            symbol = %state.symbol,
            version = state.version,
            delivered = summary.delivered,
            superseded = summary.superseded,
            "Fanned out book"
        );
        summary
    }

    fn offer(&self, session: &Session, state: &Arc<BookState>) -> Offer {
        let offer = session.lock().offer(state);
        match offer {
            Offer::Delivered(PushOutcome::Queued) => self.metrics.record_frame_queued(),
            Offer::Delivered(PushOutcome::Superseded) => self.metrics.record_frame_superseded(),
            Offer::Delivered(PushOutcome::DroppedOldest) => {
                self.metrics.record_frame_queued();
                self.metrics.record_frame_dropped();
            }
            Offer::OutboxClosed => {
                debug!(session_id = %session.id(), "Outbox closed during dispatch, closing session");
                self.registry.close(&session.id());
            }
            Offer::Skipped | Offer::Detached => {}
        }
        offer
    }

    /// Subscribe `session` to `raw` and push the current book if there is one.
    pub fn subscribe(&self, session: &Session, raw: &str) -> Result<Symbol, StreamError> {
        let symbol = match self.router.subscribe(session, raw) {
            Ok(symbol) => symbol,
            Err(e) => {
                if matches!(e, StreamError::InvalidSymbol { .. }) {
                    self.metrics.record_invalid_symbol();
                }
                return Err(e);
            }
        };

        self.metrics.record_subscription();
        self.audit
            .record(AuditEvent::new(session.id(), AuditKind::Subscribed).with_symbol(symbol.clone()));

        match self.deliver_snapshot(session, &symbol) {
            Ok(()) => {}
            Err(StreamError::UpstreamDataUnavailable { .. }) => {
                debug!(session_id = %session.id(), symbol = %symbol, "No book yet, delivery deferred");
            }
            Err(e) => return Err(e),
        }
        Ok(symbol)
    }

    /// Send the cached book for `symbol` to a session watching it.
    ///
    /// `UpstreamDataUnavailable` means nothing has been ingested yet; the
    /// first ingest will reach the session through the normal fan-out.
    pub fn deliver_snapshot(&self, session: &Session, symbol: &Symbol) -> Result<(), StreamError> {
        let state = self.cache.snapshot(symbol)?;
        match self.offer(session, &state) {
            Offer::OutboxClosed => Err(StreamError::SessionClosed),
            _ => Ok(()),
        }
    }

    /// Pump a source into the cache until it is exhausted.
    ///
    /// Returns the number of updates pulled.
    pub async fn run_source<S: MarketDataSource>(&self, mut source: S) -> u64 {
        info!(source = source.name(), "Market data source started");
        let mut pulled = 0u64;

        while let Some(event) = source.next_update().await {
            pulled += 1;
            // Errors are per symbol and already logged by ingest.
            let _ = self.ingest(&event.symbol, &event.update);
        }

        info!(source = source.name(), updates = pulled, "Market data source exhausted");
        pulled
    }

    pub fn cache(&self) -> &Arc<SymbolBookCache> {
        &self.cache
    }
}
