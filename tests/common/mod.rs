#![allow(dead_code)]
//! Common test utilities and helpers for integration tests.
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use mbee_model_transfer::element::Element;
use mbee_model_transfer::export::Exporter;
use mbee_model_transfer::ids::BranchScope;
use mbee_model_transfer::import::Importer;
use mbee_model_transfer::store::{ElementStore, MemoryStore, User};
use mbee_model_transfer::strip::ReferenceStripper;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn scope() -> BranchScope {
	BranchScope::new("acme", "rocket", "master").unwrap()
}

pub fn admin() -> User {
	User::new("admin")
}

pub fn el(v: Value) -> Element {
	Element::try_from(v).unwrap()
}

/// A memory store holding the standard branch plus `extra` elements.
pub async fn seeded_store(extra: Vec<Element>) -> Arc<MemoryStore> {
	seed(MemoryStore::new(), extra).await
}

pub async fn seed(store: MemoryStore, extra: Vec<Element>) -> Arc<MemoryStore> {
	let store = Arc::new(store);
	store.create_branch(&admin(), &scope()).await;
	if !extra.is_empty() {
		store.create(&admin(), &scope(), extra).await.unwrap();
	}
	store.clear_calls().await;
	store
}

pub fn exporter(store: Arc<MemoryStore>) -> Exporter {
	Exporter::new(store, Arc::new(ReferenceStripper::default()), TIMEOUT)
}

pub fn importer(store: Arc<MemoryStore>) -> Importer {
	Importer::new(store, Arc::new(ReferenceStripper::default()), TIMEOUT)
}

pub async fn export(store: &Arc<MemoryStore>) -> Vec<Element> {
	exporter(store.clone())
		.export_branch(&admin(), &scope())
		.await
		.unwrap()
}

pub fn find<'a>(doc: &'a [Element], id: &str) -> Option<&'a Element> {
	doc.iter().find(|e| e.id() == Some(id))
}

/// Keeps `Arc<MemoryStore>` usable where a trait object is expected.
pub fn as_dyn(store: &Arc<MemoryStore>) -> Arc<dyn ElementStore> {
	store.clone()
}
