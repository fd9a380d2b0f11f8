pub mod handler;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::header::AUTHORIZATION;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;

use crate::health::{health, metrics_handler};
use crate::state::AppState;

pub use handler::{ImportRequest, USER_HEADER};

pub const EXPORT_ROUTE: &str =
	"/export/organization/{org_id}/project/{project_id}/branch/{branch_id}";
pub const IMPORT_ROUTE: &str =
	"/import/organization/{org_id}/project/{project_id}/branch/{branch_id}";

/// Build the service router. Request bodies above `max_body_bytes` are
/// rejected with 413 before any handler runs.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
	Router::new()
		.route(EXPORT_ROUTE, post(handler::export_branch))
		.route(IMPORT_ROUTE, post(handler::import_branch))
		.route("/health", get(health))
		.route("/metrics", get(metrics_handler))
		.layer(DefaultBodyLimit::disable())
		.layer(RequestBodyLimitLayer::new(max_body_bytes))
		.layer(SetSensitiveRequestHeadersLayer::new([AUTHORIZATION]))
		.with_state(state)
}
