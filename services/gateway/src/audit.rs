//! Session bookkeeping sink
//!
//! Lifecycle events (register, attach, subscribe, close) are handed to an
//! `AuditSink`. Recording never blocks the caller: the journal sink queues
//! into a bounded channel and drops events when its writer falls behind.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use types::ids::SessionId;
use types::symbol::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Registered,
    Attached,
    Subscribed,
    Closed,
    /// Registered but never attached within the attach timeout.
    Reaped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub session_id: SessionId,
    pub kind: AuditKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<Symbol>,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(session_id: SessionId, kind: AuditKind) -> Self {
        Self {
            session_id,
            kind,
            symbol: None,
            at: Utc::now(),
        }
    }

    pub fn with_symbol(mut self, symbol: Symbol) -> Self {
        self.symbol = Some(symbol);
        self
    }
}

/// Destination for session lifecycle events. Must not block.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAudit;

impl AuditSink for NoopAudit {
    fn record(&self, _event: AuditEvent) {}
}

/// Appends events as JSON lines to a file from a background task.
pub struct JournalAudit {
    tx: mpsc::Sender<AuditEvent>,
    dropped: AtomicU64,
}

impl JournalAudit {
    /// Open (or create) the journal and spawn its writer task.
    ///
    /// The writer exits once every sender is gone and the queue is drained.
    pub async fn open(
        path: impl AsRef<Path>,
        capacity: usize,
    ) -> std::io::Result<(Self, JoinHandle<()>)> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(write_journal(path, file, rx));

        Ok((
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            handle,
        ))
    }

    /// Events discarded because the writer was behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AuditSink for JournalAudit {
    fn record(&self, event: AuditEvent) {
        if let Err(e) = self.tx.try_send(event) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "full",
                mpsc::error::TrySendError::Closed(_) => "closed",
            };
            warn!(reason, dropped, "Audit journal queue rejected event");
        }
    }
}

async fn write_journal(path: PathBuf, mut file: tokio::fs::File, mut rx: mpsc::Receiver<AuditEvent>) {
    info!(path = %path.display(), "Audit journal writer started");

    while let Some(event) = rx.recv().await {
        let mut line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Failed to encode audit event");
                continue;
            }
        };
        line.push('\n');

        if let Err(e) = file.write_all(line.as_bytes()).await {
            error!(path = %path.display(), error = %e, "Audit journal write failed; stopping writer");
            return;
        }
        if rx.is_empty() {
            if let Err(e) = file.flush().await {
                error!(path = %path.display(), error = %e, "Audit journal flush failed; stopping writer");
                return;
            }
        }
    }

    let _ = file.flush().await;
    info!(path = %path.display(), "Audit journal writer stopped");
}
