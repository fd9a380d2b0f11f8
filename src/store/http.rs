use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use url::Url;

use super::{ElementStore, StoreError, User};
use crate::element::Element;
use crate::ids::BranchScope;

/// Element store backed by the platform's REST element API.
///
/// Elements live under
/// `/api/orgs/{org}/projects/{project}/branches/{branch}/elements`:
/// `GET` (optionally `?ids=a,b`) finds, `POST` creates, `PATCH` updates and
/// `GET .../elements/search?query=` searches. The caller's bearer token is
/// forwarded; a service token is used when the caller carries none.
pub struct HttpStore {
	client: Client,
	base_url: Url,
	timeout: Duration,
	service_token: Option<String>,
}

impl HttpStore {
	pub fn new(base_url: Url, timeout: Duration) -> Result<Self, StoreError> {
		let client = Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| StoreError::Unavailable(format!("failed to build HTTP client: {}", e)))?;
		Ok(Self {
			client,
			base_url,
			timeout,
			service_token: None,
		})
	}

	pub fn with_service_token(mut self, token: impl Into<String>) -> Self {
		self.service_token = Some(token.into());
		self
	}

	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	fn elements_url(&self, scope: &BranchScope, tail: &[&str]) -> Result<Url, StoreError> {
		let mut url = self.base_url.clone();
		url.path_segments_mut()
			.map_err(|_| StoreError::Unavailable(format!("invalid store URL {}", self.base_url)))?
			.pop_if_empty()
			.extend([
				"api",
				"orgs",
				scope.org.as_str(),
				"projects",
				scope.project.as_str(),
				"branches",
				scope.branch.as_str(),
				"elements",
			])
			.extend(tail);
		Ok(url)
	}

	fn request(&self, method: Method, url: Url, user: &User) -> RequestBuilder {
		debug!("{} {}", method, url);
		let req = self.client.request(method, url);
		match user.token.as_deref().or(self.service_token.as_deref()) {
			Some(token) => req.bearer_auth(token),
			None => req,
		}
	}

	async fn send(&self, req: RequestBuilder) -> Result<Response, StoreError> {
		req.send().await.map_err(|e| {
			if e.is_timeout() {
				StoreError::Timeout(self.timeout)
			} else {
				StoreError::Unavailable(e.to_string())
			}
		})
	}
}

async fn decode(resp: Response) -> Result<Vec<Element>, StoreError> {
	let status = resp.status();
	if status.is_success() {
		return resp
			.json::<Vec<Element>>()
			.await
			.map_err(|e| StoreError::Decode(e.to_string()));
	}

	let message = resp.text().await.unwrap_or_default();
	Err(match status {
		StatusCode::NOT_FOUND => StoreError::NotFound(message),
		StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized(message),
		_ => StoreError::Rejected {
			status: status.as_u16(),
			message,
		},
	})
}

#[async_trait]
impl ElementStore for HttpStore {
	async fn find(
		&self,
		user: &User,
		scope: &BranchScope,
		ids: Option<&[String]>,
	) -> Result<Vec<Element>, StoreError> {
		let mut url = self.elements_url(scope, &[])?;
		let Some(ids) = ids else {
			let resp = self.send(self.request(Method::GET, url, user)).await?;
			return decode(resp).await;
		};
		if ids.is_empty() {
			return Ok(Vec::new());
		}
		url.query_pairs_mut().append_pair("ids", &ids.join(","));
		let resp = self.send(self.request(Method::GET, url, user)).await?;
		// A lookup by ids answers 404 when none of them exist.
		match decode(resp).await {
			Err(StoreError::NotFound(_)) => Ok(Vec::new()),
			other => other,
		}
	}

	async fn create(
		&self,
		user: &User,
		scope: &BranchScope,
		elements: Vec<Element>,
	) -> Result<Vec<Element>, StoreError> {
		let url = self.elements_url(scope, &[])?;
		let req = self.request(Method::POST, url, user).json(&elements);
		decode(self.send(req).await?).await
	}

	async fn update(
		&self,
		user: &User,
		scope: &BranchScope,
		elements: Vec<Element>,
	) -> Result<Vec<Element>, StoreError> {
		let url = self.elements_url(scope, &[])?;
		let req = self.request(Method::PATCH, url, user).json(&elements);
		decode(self.send(req).await?).await
	}

	async fn search(
		&self,
		user: &User,
		scope: &BranchScope,
		query: &str,
	) -> Result<Vec<Element>, StoreError> {
		let mut url = self.elements_url(scope, &["search"])?;
		url.query_pairs_mut().append_pair("query", query);
		let resp = self.send(self.request(Method::GET, url, user)).await?;
		// The element API answers an empty search with 404.
		match decode(resp).await {
			Err(StoreError::NotFound(_)) => Ok(Vec::new()),
			other => other,
		}
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;

	fn store(base: &str) -> HttpStore {
		HttpStore::new(Url::parse(base).unwrap(), Duration::from_secs(1)).unwrap()
	}

	#[test]
	fn elements_url_encodes_segments() {
		let scope = BranchScope::new("acme corp", "rocket", "master").unwrap();
		let url = store("https://mbee.example.com/")
			.elements_url(&scope, &["search"])
			.unwrap();
		assert_eq!(
			url.as_str(),
			"https://mbee.example.com/api/orgs/acme%20corp/projects/rocket/branches/master/elements/search"
		);
	}

	#[test]
	fn elements_url_keeps_base_path_prefix() {
		let scope = BranchScope::new("acme", "rocket", "master").unwrap();
		let url = store("https://example.com/mbee").elements_url(&scope, &[]).unwrap();
		assert_eq!(
			url.path(),
			"/mbee/api/orgs/acme/projects/rocket/branches/master/elements"
		);
	}
}
