pub mod api;
pub mod config;
pub mod diff;
pub mod document;
pub mod element;
pub mod error;
pub mod export;
pub mod health;
pub mod ids;
pub mod import;
pub mod observability;
pub mod state;
pub mod store;
pub mod strip;

use std::sync::Arc;

use anyhow::Context;
use log::{info, warn};

use crate::config::Settings;
use crate::ids::BranchScope;
use crate::state::AppState;
use crate::store::{ElementStore, HttpStore, MemoryStore, User};

/// Build the element store named by `settings.store_url`.
///
/// `memory://local/{org}/{project}/{branch}` starts an in-process store with
/// that branch created; any other URL is the base of the platform's element
/// API.
pub async fn build_store(settings: &Settings) -> anyhow::Result<Arc<dyn ElementStore>> {
	if settings.uses_memory_store() {
		let store = MemoryStore::new();
		let segments: Vec<&str> = settings
			.store_url
			.path_segments()
			.map(|s| s.filter(|seg| !seg.is_empty()).collect())
			.unwrap_or_default();
		if let [org, project, branch] = segments.as_slice() {
			let scope = BranchScope::new(*org, *project, *branch)
				.context("invalid branch in memory store URL")?;
			store.create_branch(&User::new("admin"), &scope).await;
			info!("in-memory store seeded with branch {}", scope);
		}
		warn!("using the in-memory element store; nothing is persisted");
		return Ok(Arc::new(store));
	}

	let mut store = HttpStore::new(settings.store_url.clone(), settings.store_timeout())
		.context("failed to build element store client")?;
	if let Some(token) = &settings.store_token {
		store = store.with_service_token(token.clone());
	}
	Ok(Arc::new(store))
}

pub fn build_state(settings: &Settings, store: Arc<dyn ElementStore>) -> anyhow::Result<AppState> {
	let metrics = observability::init_metrics()?;
	Ok(AppState::new(
		store,
		settings.relationship_mode(),
		settings.store_timeout(),
		metrics,
	))
}

/// Serve the HTTP surface until Ctrl-C.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
	let store = build_store(&settings).await?;
	let state = build_state(&settings, store)?;
	let app = api::router(state, settings.max_body_bytes);

	let addr = format!("{}:{}", settings.host, settings.port);
	let listener = tokio::net::TcpListener::bind(&addr)
		.await
		.with_context(|| format!("failed to bind {}", addr))?;
	info!(
		"model transfer service listening on http://{} (store {})",
		addr, settings.store_url
	);

	axum::serve(listener, app)
		.with_graceful_shutdown(async {
			let _ = tokio::signal::ctrl_c().await;
			info!("shutting down");
		})
		.await
		.context("server error")?;
	Ok(())
}
