use axum::Json;

/// Liveness probe. Body is the JSON string `"OK"`.
pub async fn health() -> Json<&'static str> {
    Json("OK")
}
