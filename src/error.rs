use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::ids::IdError;
use crate::store::StoreError;

/// A store operation that completed before an import was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedOperation {
	pub kind: OperationKind,
	/// Local ids the operation carried.
	pub ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
	IndividualUpdate,
	BatchUpdate,
	Create,
}

/// Errors surfaced by export and import.
#[derive(Debug, Error)]
pub enum TransferError {
	#[error("malformed identifier: {0}")]
	MalformedIdentifier(#[from] IdError),

	#[error("not found: {0}")]
	NotFound(String),

	#[error("element store failure: {0}")]
	StoreFailure(StoreError),

	#[error(
		"import failed during {stage}: {source}; the branch may be partially modified up to the last completed operation"
	)]
	ImportFailure {
		stage: &'static str,
		#[source]
		source: StoreError,
		completed: Vec<CompletedOperation>,
	},

	#[error("invalid import document: {0}")]
	InvalidDocument(String),
}

impl From<StoreError> for TransferError {
	fn from(err: StoreError) -> Self {
		match err {
			StoreError::NotFound(what) => TransferError::NotFound(what),
			other => TransferError::StoreFailure(other),
		}
	}
}

impl TransferError {
	pub fn status(&self) -> StatusCode {
		match self {
			TransferError::MalformedIdentifier(_) | TransferError::InvalidDocument(_) => {
				StatusCode::BAD_REQUEST
			}
			TransferError::NotFound(_) => StatusCode::NOT_FOUND,
			TransferError::StoreFailure(StoreError::Unauthorized(_)) => StatusCode::FORBIDDEN,
			TransferError::StoreFailure(StoreError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
			TransferError::StoreFailure(_) => StatusCode::BAD_GATEWAY,
			TransferError::ImportFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for TransferError {
	fn into_response(self) -> Response {
		let status = self.status();
		let body = match &self {
			TransferError::ImportFailure { completed, .. } => json!({
				"error": self.to_string(),
				"partial": !completed.is_empty(),
				"completed": completed,
			}),
			_ => json!({ "error": self.to_string() }),
		};
		(status, Json(body)).into_response()
	}
}
