pub mod http;
pub mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::element::Element;
use crate::ids::BranchScope;

pub use http::HttpStore;
pub use memory::{MemoryStore, StoreCall, StoreOp};

/// The caller on whose behalf the store is accessed. Capability checks are the
/// store's job; the transfer code only forwards this.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	pub username: String,
	/// Bearer token forwarded to remote stores.
	#[serde(default, skip_serializing)]
	pub token: Option<String>,
}

impl User {
	pub fn new(username: impl Into<String>) -> Self {
		Self {
			username: username.into(),
			token: None,
		}
	}

	pub fn with_token(mut self, token: impl Into<String>) -> Self {
		self.token = Some(token.into());
		self
	}
}

/// Errors reported by an element store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
	#[error("not found: {0}")]
	NotFound(String),

	#[error("not authorized: {0}")]
	Unauthorized(String),

	#[error("store rejected request ({status}): {message}")]
	Rejected { status: u16, message: String },

	#[error("store unavailable: {0}")]
	Unavailable(String),

	#[error("store call timed out after {0:?}")]
	Timeout(Duration),

	#[error("batch lookup not supported by this store")]
	BatchLookupUnsupported,

	#[error("invalid store response: {0}")]
	Decode(String),
}

/// Persistence collaborator for elements.
///
/// `ids`, created and updated elements use local ids; the store namespaces
/// them into `scope`. Returned records are the store's internal form and may
/// carry namespaced references and bookkeeping.
#[async_trait]
pub trait ElementStore: Send + Sync + 'static {
	/// Fetch elements of a branch; `None` fetches all of them.
	async fn find(
		&self,
		user: &User,
		scope: &BranchScope,
		ids: Option<&[String]>,
	) -> Result<Vec<Element>, StoreError>;

	async fn create(
		&self,
		user: &User,
		scope: &BranchScope,
		elements: Vec<Element>,
	) -> Result<Vec<Element>, StoreError>;

	async fn update(
		&self,
		user: &User,
		scope: &BranchScope,
		elements: Vec<Element>,
	) -> Result<Vec<Element>, StoreError>;

	async fn search(
		&self,
		user: &User,
		scope: &BranchScope,
		query: &str,
	) -> Result<Vec<Element>, StoreError>;

	/// Whether `find` accepts more than one id per call.
	fn supports_batch_find(&self) -> bool {
		true
	}
}

/// Run a store call with an upper bound on its duration.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
	F: Future<Output = Result<T, StoreError>>,
{
	match tokio::time::timeout(limit, call).await {
		Ok(res) => res,
		Err(_) => Err(StoreError::Timeout(limit)),
	}
}
