use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use tracing::warn;
use types::ids::SessionId;

use crate::error::AppError;
use crate::state::AppState;
use crate::transport::run_connection;

/// Upgrade to a WebSocket for `session_id`.
///
/// The id is checked after the upgrade so a bad id is reported in-band.
pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let ws = ws.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let id = session_id.parse::<SessionId>().ok();

    Ok(ws
        .on_failed_upgrade(move |e| warn!(session_id = %session_id, error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| run_connection(socket, state, id)))
}
