use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use types::errors::StreamError;
use types::ids::SessionId;
use types::symbol::Symbol;

use crate::error::AppError;
use crate::session::SessionState;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub state: SessionState,
    pub attached: bool,
    pub symbol: Option<Symbol>,
    pub last_version: u64,
}

/// Current status of one session.
pub async fn get_session(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<SessionInfo>, AppError> {
    let id: SessionId = raw
        .parse()
        .map_err(|_| AppError::BadRequest(format!("malformed session id {:?}", raw)))?;
    let session = state.registry.get(&id).ok_or(StreamError::UnknownSession)?;

    let delivery = session.lock();
    Ok(Json(SessionInfo {
        id,
        state: delivery.state(),
        attached: delivery.outbox().is_some(),
        symbol: delivery.symbol().cloned(),
        last_version: delivery.last_version(),
    }))
}
