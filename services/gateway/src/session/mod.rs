//! Client sessions
//!
//! A `Session` is one registered client. Its mutable part (lifecycle state,
//! bound outbox, current symbol, last delivered version) sits behind a single
//! mutex, the delivery lock. Subscription changes and book deliveries both
//! take it, so they never interleave for one session while different
//! sessions proceed independently.
//!
//! Lock order: a session's delivery lock before the router index lock. The
//! router lock is never held while a delivery lock is acquired.

pub mod outbox;
pub mod registry;
pub mod router;

use std::sync::Arc;
use std::time::Instant;

use market_data::BookState;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use types::errors::StreamError;
use types::ids::SessionId;
use types::symbol::Symbol;

pub use outbox::{Outbound, Outbox, OutboxClosed, PushOutcome};
pub use registry::SessionRegistry;
pub use router::SubscriptionRouter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Issued, possibly attached, no symbol yet.
    Registered,
    /// Watching a symbol.
    Subscribed,
    /// Teardown in progress; no new subscriptions or deliveries.
    Closing,
    Closed,
}

impl SessionState {
    pub fn is_open(self) -> bool {
        matches!(self, SessionState::Registered | SessionState::Subscribed)
    }
}

/// Result of offering a book to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Delivered(PushOutcome),
    /// Not newer than what was already delivered, or for another symbol.
    Skipped,
    /// No transport bound yet.
    Detached,
    /// The outbox refused the frame; the session must be closed.
    OutboxClosed,
}

/// Mutable session state guarded by the delivery lock.
#[derive(Debug)]
pub struct Delivery {
    state: SessionState,
    outbox: Option<Arc<Outbox>>,
    symbol: Option<Symbol>,
    /// Version of the last book handed to the outbox for `symbol`; 0 for none.
    last_version: u64,
}

impl Delivery {
    fn new() -> Self {
        Self {
            state: SessionState::Registered,
            outbox: None,
            symbol: None,
            last_version: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn symbol(&self) -> Option<&Symbol> {
        self.symbol.as_ref()
    }

    pub fn last_version(&self) -> u64 {
        self.last_version
    }

    pub fn outbox(&self) -> Option<&Arc<Outbox>> {
        self.outbox.as_ref()
    }

    /// Enqueue `book` if it is for the watched symbol and newer than the
    /// last delivered version.
    pub fn offer(&mut self, book: &Arc<BookState>) -> Offer {
        if !self.state.is_open() || self.symbol.as_ref() != Some(&book.symbol) {
            return Offer::Skipped;
        }
        if book.version <= self.last_version {
            return Offer::Skipped;
        }
        let Some(outbox) = &self.outbox else {
            return Offer::Detached;
        };

        match outbox.push(Outbound::Book(Arc::clone(book))) {
            Ok(outcome) => {
                self.last_version = book.version;
                Offer::Delivered(outcome)
            }
            Err(OutboxClosed) => Offer::OutboxClosed,
        }
    }

    /// Point the session at `symbol` and forget what was delivered before.
    ///
    /// Queued books for the previous symbol are purged so the client never
    /// sees them after the switch.
    pub(crate) fn rebind(&mut self, symbol: Symbol) -> Result<(), StreamError> {
        if !self.state.is_open() {
            return Err(StreamError::SessionClosed);
        }
        if let Some(outbox) = &self.outbox {
            outbox.purge_books();
        }
        self.symbol = Some(symbol);
        self.last_version = 0;
        self.state = SessionState::Subscribed;
        Ok(())
    }

    fn bind(&mut self, outbox: Arc<Outbox>) -> Result<(), StreamError> {
        if !self.state.is_open() {
            return Err(StreamError::UnknownSession);
        }
        if self.outbox.is_some() {
            return Err(StreamError::AlreadyAttached);
        }
        self.outbox = Some(outbox);
        Ok(())
    }

    /// Move to `Closing`, handing back the outbox. `None` if already closing.
    fn begin_close(&mut self) -> Option<Option<Arc<Outbox>>> {
        if !self.state.is_open() {
            return None;
        }
        self.state = SessionState::Closing;
        self.symbol = None;
        Some(self.outbox.take())
    }
}

pub struct Session {
    id: SessionId,
    registered_at: Instant,
    delivery: Mutex<Delivery>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            registered_at: Instant::now(),
            delivery: Mutex::new(Delivery::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn registered_at(&self) -> Instant {
        self.registered_at
    }

    /// Acquire the delivery lock.
    pub fn lock(&self) -> MutexGuard<'_, Delivery> {
        self.delivery.lock()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn current_symbol(&self) -> Option<Symbol> {
        self.lock().symbol.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.lock().outbox.is_some()
    }

    /// Whether a book has been delivered since the last (re)subscription.
    pub fn has_book(&self) -> bool {
        self.lock().last_version > 0
    }

    /// Queue an error frame. Fails if the session has no open outbox.
    pub fn send_error(&self, message: impl Into<String>) -> Result<PushOutcome, OutboxClosed> {
        let delivery = self.lock();
        match &delivery.outbox {
            Some(outbox) => outbox.push(Outbound::Error(message.into())),
            None => Err(OutboxClosed),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
