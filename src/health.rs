use axum::{extract::State, http::StatusCode, response::IntoResponse};

/// Liveness endpoint. The element store is not probed; a store outage shows
/// up as 502 on the transfer routes instead.
pub async fn health() -> impl IntoResponse {
	(StatusCode::OK, "OK")
}

/// Prometheus metrics endpoint: returns metrics in Prometheus text format
pub async fn metrics_handler(State(state): State<crate::state::AppState>) -> impl IntoResponse {
	let metrics_text = state.metrics.encode();
	(StatusCode::OK, metrics_text).into_response()
}
