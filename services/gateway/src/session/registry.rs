//! Session registry
//!
//! Owns every live session. Ids are issued here and nowhere else; attaching
//! to an id that was never issued fails instead of creating a session.
//! Registered sessions that never attach are swept after the attach timeout.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::errors::StreamError;
use types::ids::SessionId;

use super::router::SubscriptionRouter;
use super::{Outbox, Session, SessionState};
use crate::audit::{AuditEvent, AuditKind, AuditSink};
use crate::metrics::ServiceMetrics;

pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    router: Arc<SubscriptionRouter>,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<ServiceMetrics>,
}

impl SessionRegistry {
    pub fn new(
        router: Arc<SubscriptionRouter>,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            router,
            audit,
            metrics,
        }
    }

    /// Issue a fresh session id. The session has no transport and no symbol.
    pub fn register(&self) -> SessionId {
        let id = SessionId::new();
        self.sessions.insert(id, Arc::new(Session::new(id)));
        self.metrics.record_registered();
        self.audit.record(AuditEvent::new(id, AuditKind::Registered));
        info!(session_id = %id, sessions = self.sessions.len(), "Session registered");
        id
    }

    /// Bind a transport to a registered session, exactly once.
    pub fn attach(&self, id: &SessionId, outbox: Arc<Outbox>) -> Result<Arc<Session>, StreamError> {
        let session = match self.get(id) {
            Some(session) => session,
            None => {
                self.metrics.record_attach_rejected();
                return Err(StreamError::UnknownSession);
            }
        };

        if let Err(e) = session.lock().bind(outbox) {
            self.metrics.record_attach_rejected();
            return Err(e);
        }

        self.metrics.record_attached();
        self.audit.record(AuditEvent::new(*id, AuditKind::Attached));
        info!(session_id = %id, "Session attached");
        Ok(session)
    }

    /// Tear a session down. Returns false if it was unknown or already closed.
    pub fn close(&self, id: &SessionId) -> bool {
        let Some((_, session)) = self.sessions.remove(id) else {
            return false;
        };

        let outbox = {
            let mut delivery = session.lock();
            let Some(outbox) = delivery.begin_close() else {
                return false;
            };
            // Still under the delivery lock so no subscribe can slip in.
            self.router.unsubscribe(id);
            outbox
        };

        if let Some(outbox) = outbox {
            outbox.close();
        }
        session.lock().state = SessionState::Closed;

        self.metrics.record_closed();
        self.audit.record(AuditEvent::new(*id, AuditKind::Closed));
        info!(session_id = %id, sessions = self.sessions.len(), "Session closed");
        true
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close sessions that were registered at least `timeout` ago and never
    /// attached. Returns how many were reaped.
    pub fn reap_unattached(&self, timeout: Duration) -> usize {
        let candidates: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().registered_at().elapsed() >= timeout)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut reaped = 0;
        for session in candidates {
            {
                let mut delivery = session.lock();
                if delivery.outbox.is_some() || !delivery.state.is_open() {
                    continue;
                }
                // Marked under the lock so a racing attach sees a dead session.
                delivery.state = SessionState::Closed;
            }

            let id = session.id();
            self.sessions.remove(&id);
            self.router.unsubscribe(&id);
            self.metrics.record_reaped();
            self.audit.record(AuditEvent::new(id, AuditKind::Reaped));
            debug!(session_id = %id, "Reaped unattached session");
            reaped += 1;
        }

        if reaped > 0 {
            warn!(reaped, timeout_secs = timeout.as_secs(), "Reaped sessions that never attached");
        }
        reaped
    }

    /// Periodically reap unattached sessions until the task is aborted.
    pub fn spawn_reaper(self: Arc<Self>, interval: Duration, timeout: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.reap_unattached(timeout);
            }
        })
    }
}
