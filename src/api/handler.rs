use std::convert::Infallible;

use axum::Json;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use log::info;
use serde::Deserialize;

use crate::element::Element;
use crate::error::TransferError;
use crate::ids::BranchScope;
use crate::state::AppState;
use crate::store::User;

/// Header naming the acting user. Requests without it act as `anonymous`
/// and rely on the bearer token for authorization downstream.
pub const USER_HEADER: &str = "x-mbee-user";

/// Body of an import request.
///
/// Accepts `{"data": [...]}` as well as the wrapped form
/// `{"type": "...", "data": {"data": [...]}}` sent by the browser client.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ImportRequest {
	Flat { data: Vec<Element> },
	Wrapped { data: ImportBody },
}

#[derive(Debug, Deserialize)]
pub struct ImportBody {
	pub data: Vec<Element>,
}

impl ImportRequest {
	pub fn into_elements(self) -> Vec<Element> {
		match self {
			ImportRequest::Flat { data } => data,
			ImportRequest::Wrapped { data } => data.data,
		}
	}
}

impl<S> FromRequestParts<S> for User
where
	S: Send + Sync,
{
	type Rejection = Infallible;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let username = parts
			.headers
			.get(USER_HEADER)
			.and_then(|v| v.to_str().ok())
			.filter(|v| !v.is_empty())
			.unwrap_or("anonymous");
		let mut user = User::new(username);

		let token = parts
			.headers
			.get(AUTHORIZATION)
			.and_then(|v| v.to_str().ok())
			.and_then(|v| v.strip_prefix("Bearer "))
			.map(str::trim)
			.filter(|t| !t.is_empty());
		if let Some(token) = token {
			user = user.with_token(token);
		}
		Ok(user)
	}
}

/// `POST /export/organization/{org_id}/project/{project_id}/branch/{branch_id}`
pub async fn export_branch(
	State(state): State<AppState>,
	Path((org_id, project_id, branch_id)): Path<(String, String, String)>,
	user: User,
) -> Result<Json<Vec<Element>>, TransferError> {
	let scope = BranchScope::new(&org_id, &project_id, &branch_id)?;
	info!("{} exporting {}", user.username, scope);
	let document = state.exporter.export_branch(&user, &scope).await?;
	Ok(Json(document))
}

/// `POST /import/organization/{org_id}/project/{project_id}/branch/{branch_id}`
///
/// Responds with the branch as exported after the import.
pub async fn import_branch(
	State(state): State<AppState>,
	Path((org_id, project_id, branch_id)): Path<(String, String, String)>,
	user: User,
	Json(request): Json<ImportRequest>,
) -> Result<Json<Vec<Element>>, TransferError> {
	let scope = BranchScope::new(&org_id, &project_id, &branch_id)?;
	let document = request.into_elements();
	info!(
		"{} importing {} elements into {}",
		user.username,
		document.len(),
		scope
	);
	let outcome = state.importer.import_branch(&user, &scope, document).await?;
	Ok(Json(outcome.elements))
}
