//! Subscription router
//!
//! Maps symbols to the sessions watching them. Both directions of the index
//! live under one lock, so a rebind from one symbol to another is a single
//! critical section: no reader ever sees the session in two sets, or in
//! none mid-switch.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use tracing::{debug, info};
use types::errors::StreamError;
use types::ids::SessionId;
use types::symbol::Symbol;

use super::Session;

#[derive(Debug, Default)]
struct Index {
    by_symbol: HashMap<Symbol, BTreeSet<SessionId>>,
    by_session: HashMap<SessionId, Symbol>,
}

impl Index {
    fn remove(&mut self, id: &SessionId) -> Option<Symbol> {
        let symbol = self.by_session.remove(id)?;
        if let Some(set) = self.by_symbol.get_mut(&symbol) {
            set.remove(id);
            if set.is_empty() {
                self.by_symbol.remove(&symbol);
            }
        }
        Some(symbol)
    }
}

pub struct SubscriptionRouter {
    index: RwLock<Index>,
    /// When set, only these symbols may be subscribed.
    allowlist: Option<BTreeSet<Symbol>>,
}

impl SubscriptionRouter {
    pub fn new(allowlist: Option<BTreeSet<Symbol>>) -> Self {
        Self {
            index: RwLock::new(Index::default()),
            allowlist,
        }
    }

    /// Normalize `raw` and check it against the allowlist.
    pub fn validate(&self, raw: &str) -> Result<Symbol, StreamError> {
        let symbol = Symbol::parse(raw)?;
        match &self.allowlist {
            Some(allowed) if !allowed.contains(&symbol) => {
                Err(StreamError::invalid_symbol(raw, format!("pair {} not found", symbol)))
            }
            _ => Ok(symbol),
        }
    }

    /// Point `session` at the symbol named by `raw`.
    ///
    /// On error the session keeps its current subscription.
    pub fn subscribe(&self, session: &Session, raw: &str) -> Result<Symbol, StreamError> {
        let symbol = self.validate(raw)?;

        let mut delivery = session.lock();
        delivery.rebind(symbol.clone())?;

        let previous = {
            let mut index = self.index.write();
            let previous = index.remove(&session.id());
            index
                .by_symbol
                .entry(symbol.clone())
                .or_default()
                .insert(session.id());
            index.by_session.insert(session.id(), symbol.clone());
            previous
        };
        drop(delivery);

        match previous {
            Some(prev) if prev != symbol => {
                info!(session_id = %session.id(), from = %prev, to = %symbol, "Session switched symbol")
            }
            Some(_) => debug!(session_id = %session.id(), symbol = %symbol, "Session resubscribed"),
            None => info!(session_id = %session.id(), symbol = %symbol, "Session subscribed"),
        }
        Ok(symbol)
    }

    /// Drop whatever subscription `id` has. No-op if it has none.
    pub fn unsubscribe(&self, id: &SessionId) -> Option<Symbol> {
        let removed = self.index.write().remove(id);
        if let Some(symbol) = &removed {
            debug!(session_id = %id, symbol = %symbol, "Session unsubscribed");
        }
        removed
    }

    /// Sessions currently watching `symbol`, in id order.
    pub fn subscribers(&self, symbol: &Symbol) -> Vec<SessionId> {
        self.index
            .read()
            .by_symbol
            .get(symbol)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn symbol_of(&self, id: &SessionId) -> Option<Symbol> {
        self.index.read().by_session.get(id).cloned()
    }

    /// Number of sessions with an active subscription.
    pub fn subscription_count(&self) -> usize {
        self.index.read().by_session.len()
    }

    /// Number of symbols with at least one subscriber.
    pub fn watched_symbols(&self) -> usize {
        self.index.read().by_symbol.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Outbox, SessionState};
    use std::sync::Arc;
    use std::thread;

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn open_session() -> Session {
        let session = Session::new(SessionId::new());
        session.lock().bind(Arc::new(Outbox::new(8))).unwrap();
        session
    }

    #[test]
    fn test_subscribe_normalizes() {
        let router = SubscriptionRouter::new(None);
        let session = open_session();

        let symbol = router.subscribe(&session, " btcusdt ").unwrap();
        assert_eq!(symbol, sym("BTCUSDT"));
        assert_eq!(router.subscribers(&symbol), vec![session.id()]);
        assert_eq!(session.state(), SessionState::Subscribed);
        assert_eq!(session.current_symbol(), Some(symbol));
    }

    #[test]
    fn test_switch_moves_between_sets() {
        let router = SubscriptionRouter::new(None);
        let session = open_session();

        router.subscribe(&session, "BTCUSDT").unwrap();
        router.subscribe(&session, "ETHUSDT").unwrap();

        assert!(router.subscribers(&sym("BTCUSDT")).is_empty());
        assert_eq!(router.subscribers(&sym("ETHUSDT")), vec![session.id()]);
        assert_eq!(router.subscription_count(), 1);
        assert_eq!(router.watched_symbols(), 1);
    }

    #[test]
    fn test_invalid_symbol_keeps_subscription() {
        let router = SubscriptionRouter::new(None);
        let session = open_session();
        router.subscribe(&session, "BTCUSDT").unwrap();

        let err = router.subscribe(&session, "btc").unwrap_err();
        assert!(matches!(err, StreamError::InvalidSymbol { .. }));
        assert_eq!(router.symbol_of(&session.id()), Some(sym("BTCUSDT")));
        assert_eq!(session.current_symbol(), Some(sym("BTCUSDT")));
    }

    #[test]
    fn test_allowlist() {
        let allowed = [sym("BTCUSDT")].into_iter().collect();
        let router = SubscriptionRouter::new(Some(allowed));

        assert!(router.validate("btcusdt").is_ok());
        let err = router.validate("dogeusdt").unwrap_err();
        assert_eq!(err.to_string(), "invalid symbol \"dogeusdt\": pair DOGEUSDT not found");
    }

    #[test]
    fn test_unsubscribe_is_noop_when_unsubscribed() {
        let router = SubscriptionRouter::new(None);
        let session = open_session();

        assert!(router.unsubscribe(&session.id()).is_none());
        router.subscribe(&session, "BTCUSDT").unwrap();
        assert_eq!(router.unsubscribe(&session.id()), Some(sym("BTCUSDT")));
        assert_eq!(router.watched_symbols(), 0);
    }

    #[test]
    fn test_subscribe_on_closed_session_fails() {
        let router = SubscriptionRouter::new(None);
        let session = open_session();
        session.lock().begin_close();

        assert_eq!(
            router.subscribe(&session, "BTCUSDT").unwrap_err(),
            StreamError::SessionClosed
        );
        assert_eq!(router.subscription_count(), 0);
    }

    #[test]
    fn test_racing_switches_never_split_the_session() {
        let router = Arc::new(SubscriptionRouter::new(None));
        let session = Arc::new(open_session());
        let symbols = ["BTCUSDT", "ETHUSDT", "SOLUSDT"];

        let writers: Vec<_> = (0..3)
            .map(|i| {
                let router = Arc::clone(&router);
                let session = Arc::clone(&session);
                thread::spawn(move || {
                    for n in 0..200 {
                        router.subscribe(&session, symbols[(i + n) % 3]).unwrap();
                    }
                })
            })
            .collect();

        let observer = {
            let router = Arc::clone(&router);
            let id = session.id();
            thread::spawn(move || {
                for _ in 0..500 {
                    let index = router.index.read();
                    let memberships = index
                        .by_symbol
                        .values()
                        .filter(|set| set.contains(&id))
                        .count();
                    // Either not yet subscribed, or in exactly one set.
                    assert!(memberships <= 1);
                    if index.by_session.contains_key(&id) {
                        assert_eq!(memberships, 1);
                    }
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        observer.join().unwrap();

        // Router and session agree on the winner.
        let current = session.current_symbol().unwrap();
        assert_eq!(router.symbol_of(&session.id()), Some(current.clone()));
        assert_eq!(router.subscribers(&current), vec![session.id()]);
    }
}
