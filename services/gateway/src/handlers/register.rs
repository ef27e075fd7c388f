use axum::{extract::State, http::StatusCode, Json};
use types::ids::SessionId;

use crate::state::AppState;

/// Issue a new session id. The body is the id as a JSON string.
pub async fn register(State(state): State<AppState>) -> (StatusCode, Json<SessionId>) {
    let id = state.registry.register();
    (StatusCode::CREATED, Json(id))
}
