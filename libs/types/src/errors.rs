//! Error types for the stream gateway
//!
//! Session-facing error taxonomy using thiserror. Each variant documents
//! whether it is recoverable for the session that hit it.

use thiserror::Error;

use crate::symbol::Symbol;

/// Errors surfaced while registering, attaching, subscribing or delivering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Session id was never issued, or the session is already gone.
    /// Fatal to the connection attempt; no session is created.
    #[error("unknown session")]
    UnknownSession,

    /// A transport is already bound to this session. The new connection is
    /// rejected and the existing one is preserved.
    #[error("session already attached")]
    AlreadyAttached,

    /// Malformed or too-short symbol selection. Recoverable: the session
    /// stays open and may resubmit.
    #[error("invalid symbol {input:?}: {reason}")]
    InvalidSymbol { input: String, reason: String },

    /// No book has been ingested yet for a validly subscribed symbol.
    /// Delivery is deferred until data arrives.
    #[error("no data yet for {symbol}")]
    UpstreamDataUnavailable { symbol: Symbol },

    /// Read or write failure on the connection, or unparseable input.
    /// Fatal to that session only; never retried.
    #[error("transport fault: {0}")]
    TransportFault(String),

    /// The session has been closed; late deliveries to it are dropped.
    #[error("session closed")]
    SessionClosed,
}

impl StreamError {
    pub fn invalid_symbol(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSymbol {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Whether the session may continue after reporting this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StreamError::InvalidSymbol { .. } | StreamError::UpstreamDataUnavailable { .. }
        )
    }
}
