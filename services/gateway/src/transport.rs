//! Session transport over WebSocket
//!
//! Each connection runs two tasks:
//! - the session task reads client frames, drives subscriptions and owns the
//!   lifecycle of the session;
//! - the writer task drains the session's outbox into the socket. A frame
//!   the peer does not accept within the write timeout ends the writer,
//!   which closes the session.
//!
//! The socket is upgraded before the session is attached, so attach
//! failures can be reported to the client as an error frame.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{Sink, SinkExt, StreamExt};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use types::errors::StreamError;
use types::ids::SessionId;
use types::symbol::Symbol;

use crate::metrics::ServiceMetrics;
use crate::protocol::{parse_client_message, ServerFrame};
use crate::session::{Outbound, Outbox, Session};
use crate::state::AppState;

/// How long the writer gets to flush the final frames after close.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type WsSink = SplitSink<WebSocket, Message>;

/// Drive one upgraded connection until it closes.
///
/// `session_id` is `None` when the path segment was not a valid id.
pub async fn run_connection(socket: WebSocket, state: AppState, session_id: Option<SessionId>) {
    let (mut sink, mut stream) = socket.split();

    let outbox = Arc::new(Outbox::new(state.config.outbox_capacity));
    let attached = match session_id {
        Some(id) => state.registry.attach(&id, Arc::clone(&outbox)),
        None => {
            state.metrics.record_attach_rejected();
            Err(StreamError::UnknownSession)
        }
    };
    let session = match attached {
        Ok(session) => session,
        Err(e) => {
            warn!(session_id = ?session_id, error = %e, "Rejected connection");
            reject(&mut sink, &e).await;
            return;
        }
    };
    let id = session.id();

    let mut writer = tokio::spawn(write_frames(
        sink,
        Arc::clone(&outbox),
        Arc::clone(&state.metrics),
        id,
        state.config.write_timeout(),
    ));
    let mut writer_done = false;

    // Symbol awaiting its first book, with the deadline for the notice.
    let mut awaiting: Option<(Symbol, Instant)> = None;

    loop {
        let deadline = awaiting.as_ref().map(|(_, at)| *at);

        tokio::select! {
            msg = stream.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(_))) => {
                        fatal(&session, StreamError::TransportFault("binary frames are not supported".into()));
                        break;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(session_id = %id, "Client closed connection");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(session_id = %id, error = %e, "WebSocket read failed");
                        break;
                    }
                };

                match handle_text(&state, &session, text.as_str()) {
                    Ok(symbol) => {
                        awaiting = state
                            .config
                            .snapshot_timeout()
                            .filter(|_| !session.has_book())
                            .map(|timeout| (symbol, Instant::now() + timeout));
                    }
                    Err(e) if e.is_recoverable() => {
                        if session.send_error(e.to_string()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        fatal(&session, e);
                        break;
                    }
                }
            }

            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some((symbol, _)) = awaiting.take() {
                    let still_waiting = session.current_symbol().as_ref() == Some(&symbol) && !session.has_book();
                    if still_waiting {
                        debug!(session_id = %id, symbol = %symbol, "No book within snapshot timeout");
                        let notice = StreamError::UpstreamDataUnavailable { symbol };
                        if session.send_error(notice.to_string()).is_err() {
                            break;
                        }
                    }
                }
            }

            _ = &mut writer => {
                writer_done = true;
                break;
            }
        }
    }

    state.registry.close(&id);

    if !writer_done {
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
            warn!(session_id = %id, "Writer did not drain in time, aborting");
            writer.abort();
        }
    }
    info!(session_id = %id, "Connection finished");
}

/// Parse a client frame and subscribe. Returns the subscribed symbol.
fn handle_text(state: &AppState, session: &Session, text: &str) -> Result<Symbol, StreamError> {
    let raw = parse_client_message(text)?;
    debug!(session_id = %session.id(), requested = %raw, "Symbol requested");
    state.dispatcher.subscribe(session, &raw)
}

/// Queue a final error frame; the caller then closes the session.
fn fatal(session: &Session, err: StreamError) {
    warn!(session_id = %session.id(), error = %err, "Closing session after fatal error");
    let _ = session.send_error(err.to_string());
}

/// Report an attach failure directly on the socket and close it.
async fn reject(sink: &mut WsSink, err: &StreamError) {
    if let Ok(text) = ServerFrame::error(err.to_string()).to_json() {
        let _ = sink.send(Message::Text(text.into())).await;
    }
    let _ = sink.send(Message::Close(None)).await;
}

/// Drain the outbox into the socket until the outbox closes, a write fails
/// or a write exceeds `write_timeout`.
async fn write_frames<S>(
    mut sink: S,
    outbox: Arc<Outbox>,
    metrics: Arc<ServiceMetrics>,
    id: SessionId,
    write_timeout: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(frame) = outbox.pop().await {
        let wire = match &frame {
            Outbound::Book(state) => ServerFrame::book(state),
            Outbound::Error(message) => ServerFrame::error(message.clone()),
        };
        let text = match wire.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!(session_id = %id, error = %e, "Failed to encode frame");
                continue;
            }
        };

        match tokio::time::timeout(write_timeout, sink.send(Message::Text(text.into()))).await {
            Ok(Ok(())) => metrics.record_frame_sent(),
            Ok(Err(e)) => {
                debug!(session_id = %id, error = %e, "WebSocket write failed");
                outbox.close();
                return;
            }
            Err(_) => {
                warn!(
                    session_id = %id,
                    timeout_ms = write_timeout.as_millis() as u64,
                    "Peer stopped reading, closing session"
                );
                metrics.record_write_timeout();
                outbox.close();
                return;
            }
        }
    }

    let _ = tokio::time::timeout(write_timeout, sink.send(Message::Close(None))).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;

    #[tokio::test]
    async fn test_writer_drains_outbox_then_closes() {
        let (sink, peer) = mpsc::unbounded::<Message>();
        let outbox = Arc::new(Outbox::new(8));
        let metrics = Arc::new(ServiceMetrics::new());
        outbox.push(Outbound::Error("pair BTC not found".into())).unwrap();
        outbox.close();

        write_frames(sink, outbox, Arc::clone(&metrics), SessionId::new(), Duration::from_secs(1)).await;

        let sent: Vec<Message> = peer.collect().await;
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[0], Message::Text(text) if text.as_str().contains("pair BTC not found")));
        assert!(matches!(sent[1], Message::Close(None)));
        assert_eq!(metrics.snapshot().frames_sent, 1);
    }

    #[tokio::test]
    async fn test_stalled_peer_ends_writer() {
        // Zero-buffer channel whose receiver is never polled.
        let (sink, _peer) = mpsc::channel::<Message>(0);
        let outbox = Arc::new(Outbox::new(8));
        let metrics = Arc::new(ServiceMetrics::new());
        for i in 0..3 {
            outbox.push(Outbound::Error(format!("frame {}", i))).unwrap();
        }

        let writer = write_frames(
            sink,
            Arc::clone(&outbox),
            Arc::clone(&metrics),
            SessionId::new(),
            Duration::from_millis(50),
        );
        tokio::time::timeout(Duration::from_secs(2), writer)
            .await
            .expect("writer should give up on a stalled peer");

        assert!(outbox.is_closed());
        assert_eq!(metrics.snapshot().write_timeouts, 1);
    }
}
