//! HTTP surface tests: the axum router driven with `oneshot` over the
//! in-memory element store.

mod common;

#[cfg(feature = "integration-tests")]
mod tests {
	use std::sync::Arc;

	use axum::Router;
	use axum::body::{Body, to_bytes};
	use axum::http::{Request, StatusCode};
	use serde_json::{Value, json};
	use tower::ServiceExt;

	use mbee_model_transfer::api::{USER_HEADER, router};
	use mbee_model_transfer::observability::MetricsRegistry;
	use mbee_model_transfer::state::AppState;
	use mbee_model_transfer::store::{MemoryStore, StoreError, StoreOp};
	use mbee_model_transfer::strip::RelationshipMode;

	use crate::common::{TIMEOUT, as_dyn, el, scope, seeded_store};

	const EXPORT: &str = "/export/organization/acme/project/rocket/branch/master";
	const IMPORT: &str = "/import/organization/acme/project/rocket/branch/master";

	fn app(store: &Arc<MemoryStore>, max_body_bytes: usize) -> Router {
		let metrics = Arc::new(MetricsRegistry::new().unwrap());
		let state = AppState::new(as_dyn(store), RelationshipMode::Strip, TIMEOUT, metrics);
		router(state, max_body_bytes)
	}

	fn post(uri: &str, body: Value) -> Request<Body> {
		Request::builder()
			.method("POST")
			.uri(uri)
			.header("content-type", "application/json")
			.header(USER_HEADER, "alice")
			.body(Body::from(body.to_string()))
			.unwrap()
	}

	async fn json_body(resp: axum::response::Response) -> Value {
		let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
		serde_json::from_slice(&bytes).unwrap()
	}

	#[tokio::test]
	async fn export_returns_the_stripped_branch() {
		let store = seeded_store(vec![el(json!({"id": "e1", "name": "Engine"}))]).await;
		let resp = app(&store, 1024 * 1024)
			.oneshot(post(EXPORT, json!({})))
			.await
			.unwrap();
		assert_eq!(resp.status(), StatusCode::OK);
		let body = json_body(resp).await;
		let ids: Vec<&str> = body
			.as_array()
			.unwrap()
			.iter()
			.filter_map(|e| e["id"].as_str())
			.collect();
		assert_eq!(ids, vec!["model", "__mbee__", "holding_bin", "undefined", "e1"]);
		assert_eq!(body[4]["parent"], json!("model"));
	}

	#[tokio::test]
	async fn import_accepts_the_wrapped_body_and_returns_the_fresh_export() {
		let store = seeded_store(Vec::new()).await;
		let body = json!({
			"type": "application/json",
			"data": {"data": [{"id": "e1", "name": "Engine", "parent": null}]}
		});
		let resp = app(&store, 1024 * 1024)
			.oneshot(post(IMPORT, body))
			.await
			.unwrap();
		assert_eq!(resp.status(), StatusCode::OK);
		let doc = json_body(resp).await;
		let e1 = doc
			.as_array()
			.unwrap()
			.iter()
			.find(|e| e["id"] == json!("e1"))
			.unwrap();
		assert_eq!(e1["parent"], json!("model"));
		assert_eq!(
			store.get(&scope(), "e1").await.unwrap().str_field("createdBy"),
			Some("alice")
		);
	}

	#[tokio::test]
	async fn import_accepts_the_flat_body() {
		let store = seeded_store(Vec::new()).await;
		let resp = app(&store, 1024 * 1024)
			.oneshot(post(IMPORT, json!({"data": [{"id": "e2"}]})))
			.await
			.unwrap();
		assert_eq!(resp.status(), StatusCode::OK);
		assert!(store.get(&scope(), "e2").await.is_some());
	}

	#[tokio::test]
	async fn unknown_branch_is_404() {
		let store = seeded_store(Vec::new()).await;
		let resp = app(&store, 1024 * 1024)
			.oneshot(post(
				"/export/organization/acme/project/rocket/branch/nope",
				json!({}),
			))
			.await
			.unwrap();
		assert_eq!(resp.status(), StatusCode::NOT_FOUND);
		assert!(json_body(resp).await["error"].is_string());
	}

	#[tokio::test]
	async fn namespaced_ids_are_400_without_writes() {
		let store = seeded_store(Vec::new()).await;
		let resp = app(&store, 1024 * 1024)
			.oneshot(post(IMPORT, json!({"data": [{"id": "a:b:c:e1"}]})))
			.await
			.unwrap();
		assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
		assert!(store.calls().await.is_empty());
	}

	#[tokio::test]
	async fn delimiter_in_path_is_400() {
		let store = seeded_store(Vec::new()).await;
		let resp = app(&store, 1024 * 1024)
			.oneshot(post(
				"/export/organization/acme:x/project/rocket/branch/master",
				json!({}),
			))
			.await
			.unwrap();
		assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn import_failure_is_500_with_partial_progress() {
		let store = seeded_store(vec![el(json!({"id": "e1", "name": "Old"}))]).await;
		store
			.fail_next(StoreOp::Create, StoreError::Unavailable("connection reset".into()))
			.await;
		let body = json!({"data": [
			{"id": "e1", "name": "New"},
			{"id": "e2", "name": "Added"}
		]});
		let resp = app(&store, 1024 * 1024)
			.oneshot(post(IMPORT, body))
			.await
			.unwrap();
		assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
		let body = json_body(resp).await;
		assert_eq!(body["partial"], json!(true));
		assert_eq!(
			body["completed"],
			json!([{"kind": "batch_update", "ids": ["e1"]}])
		);
		assert!(body["error"].as_str().unwrap().contains("partially modified"));
	}

	#[tokio::test]
	async fn oversized_bodies_are_rejected() {
		let store = seeded_store(Vec::new()).await;
		let big = "x".repeat(4096);
		let resp = app(&store, 1024)
			.oneshot(post(IMPORT, json!({"data": [{"id": "e1", "documentation": big}]})))
			.await
			.unwrap();
		assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
		assert!(store.calls().await.is_empty());
	}

	#[tokio::test]
	async fn health_and_metrics() {
		let store = seeded_store(Vec::new()).await;
		let app = app(&store, 1024 * 1024);

		let resp = app
			.clone()
			.oneshot(Request::get("/health").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(resp.status(), StatusCode::OK);

		app.clone().oneshot(post(EXPORT, json!({}))).await.unwrap();
		let resp = app
			.oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
			.await
			.unwrap();
		let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
		let text = String::from_utf8(bytes.to_vec()).unwrap();
		assert!(text.contains("model_transfer_export_requests_total 1"));
		assert!(text.contains("model_transfer_exported_elements_total 4"));
	}

	#[tokio::test]
	async fn import_does_not_count_as_an_export() {
		let store = seeded_store(Vec::new()).await;
		let app = app(&store, 1024 * 1024);

		let resp = app
			.clone()
			.oneshot(post(IMPORT, json!({"data": [{"id": "e1", "name": "Engine"}]})))
			.await
			.unwrap();
		assert_eq!(resp.status(), StatusCode::OK);

		let resp = app
			.oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
			.await
			.unwrap();
		let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
		let text = String::from_utf8(bytes.to_vec()).unwrap();
		assert!(text.contains("model_transfer_import_requests_total 1"));
		assert!(text.contains("model_transfer_elements_created_total 1"));
		assert!(text.contains("model_transfer_export_requests_total 0"));
		assert!(text.contains("model_transfer_exported_elements_total 0"));
	}
}
