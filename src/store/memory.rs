use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use super::{ElementStore, StoreError, User};
use crate::element::{
	BOOKKEEPING_FIELDS, Element, ID, PARENT, RELATIONSHIP_FIELDS, SOURCE, TARGET,
};
use crate::ids::{BranchScope, denamespace};

/// Kind of store call, recorded by [`MemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
	Find,
	Create,
	Update,
	Search,
}

/// One recorded store call. `ids` holds the local ids the call carried (the
/// query string for searches, empty for a find-all).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
	pub op: StoreOp,
	pub ids: Vec<String>,
}

/// In-process element store.
///
/// Behaves like the platform's element controller closely enough to drive
/// imports end to end: it namespaces references on write, stamps bookkeeping,
/// computes relationship views on read and seeds every branch with the
/// structural root elements. Every call is recorded so callers can assert on
/// call order.
pub struct MemoryStore {
	branches: RwLock<HashMap<BranchScope, Vec<Element>>>,
	calls: Mutex<Vec<StoreCall>>,
	failures: Mutex<HashMap<StoreOp, StoreError>>,
	latency: Option<Duration>,
	batch_find: bool,
}

impl Default for MemoryStore {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryStore {
	pub fn new() -> Self {
		Self {
			branches: RwLock::new(HashMap::new()),
			calls: Mutex::new(Vec::new()),
			failures: Mutex::new(HashMap::new()),
			latency: None,
			batch_find: true,
		}
	}

	/// Delay every call by `latency`.
	pub fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = Some(latency);
		self
	}

	/// Reject `find` calls that carry more than one id.
	pub fn without_batch_find(mut self) -> Self {
		self.batch_find = false;
		self
	}

	/// Create a branch seeded with `model`, `__mbee__`, `holding_bin` and
	/// `undefined`. Existing branches are left untouched.
	pub async fn create_branch(&self, user: &User, scope: &BranchScope) {
		let mut branches = self.branches.write().await;
		if branches.contains_key(scope) {
			return;
		}
		let now = Utc::now().to_rfc3339();
		let roots = [
			("model", None, "Model"),
			("__mbee__", Some("model"), "__mbee__"),
			("holding_bin", Some("__mbee__"), "holding bin"),
			("undefined", Some("__mbee__"), "undefined element"),
		];
		let elements = roots
			.into_iter()
			.map(|(id, parent, name)| {
				let el = Element::with_id(id)
					.with(PARENT, parent.map_or(Value::Null, Value::from))
					.with("name", name)
					.with("type", "")
					.with("documentation", "")
					.with("custom", Value::Object(Default::default()));
				stamp_new(to_internal(el, scope), user, scope, &now)
			})
			.collect();
		branches.insert(scope.clone(), elements);
	}

	/// Make the next call of `op` fail with `err`.
	pub async fn fail_next(&self, op: StoreOp, err: StoreError) {
		self.failures.lock().await.insert(op, err);
	}

	/// Calls recorded so far, oldest first.
	pub async fn calls(&self) -> Vec<StoreCall> {
		self.calls.lock().await.clone()
	}

	pub async fn calls_of(&self, op: StoreOp) -> Vec<StoreCall> {
		self.calls
			.lock()
			.await
			.iter()
			.filter(|c| c.op == op)
			.cloned()
			.collect()
	}

	pub async fn clear_calls(&self) {
		self.calls.lock().await.clear();
	}

	/// Stored record for `local_id`, without relationship views.
	pub async fn get(&self, scope: &BranchScope, local_id: &str) -> Option<Element> {
		let full = scope.element_id(local_id);
		self.branches
			.read()
			.await
			.get(scope)?
			.iter()
			.find(|el| el.id() == Some(full.as_str()))
			.cloned()
	}

	async fn enter(&self, op: StoreOp, ids: Vec<String>) -> Result<(), StoreError> {
		if let Some(latency) = self.latency {
			tokio::time::sleep(latency).await;
		}
		self.calls.lock().await.push(StoreCall { op, ids });
		match self.failures.lock().await.remove(&op) {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}
}

#[async_trait]
impl ElementStore for MemoryStore {
	async fn find(
		&self,
		_user: &User,
		scope: &BranchScope,
		ids: Option<&[String]>,
	) -> Result<Vec<Element>, StoreError> {
		self.enter(StoreOp::Find, ids.map(<[String]>::to_vec).unwrap_or_default())
			.await?;
		if !self.batch_find && ids.is_some_and(|ids| ids.len() > 1) {
			return Err(StoreError::BatchLookupUnsupported);
		}

		let branches = self.branches.read().await;
		let elements = branches
			.get(scope)
			.ok_or_else(|| StoreError::NotFound(format!("branch {scope}")))?;

		let wanted: Option<Vec<String>> =
			ids.map(|ids| ids.iter().map(|id| scope.element_id(denamespace(id))).collect());
		let found = elements
			.iter()
			.filter(|el| !is_archived(el))
			.filter(|el| match (&wanted, el.id()) {
				(None, _) => true,
				(Some(w), Some(id)) => w.iter().any(|x| x == id),
				(Some(_), None) => false,
			})
			.map(|el| with_views(el, elements))
			.collect();
		Ok(found)
	}

	async fn create(
		&self,
		user: &User,
		scope: &BranchScope,
		elements: Vec<Element>,
	) -> Result<Vec<Element>, StoreError> {
		self.enter(StoreOp::Create, local_ids(&elements)).await?;

		let mut branches = self.branches.write().await;
		let existing = branches
			.get_mut(scope)
			.ok_or_else(|| StoreError::NotFound(format!("branch {scope}")))?;

		// Validate the whole batch before writing anything.
		let mut incoming_ids: Vec<String> = Vec::with_capacity(elements.len());
		for el in &elements {
			let id = el.id().ok_or_else(|| StoreError::Rejected {
				status: 400,
				message: "element is missing an id".to_string(),
			})?;
			let full = scope.element_id(denamespace(id));
			if existing.iter().any(|e| e.id() == Some(full.as_str())) || incoming_ids.contains(&full)
			{
				return Err(StoreError::Rejected {
					status: 403,
					message: format!("element with id {} already exists", denamespace(id)),
				});
			}
			incoming_ids.push(full);
		}

		let now = Utc::now().to_rfc3339();
		let mut created = Vec::with_capacity(elements.len());
		for mut el in elements {
			for field in RELATIONSHIP_FIELDS.iter().chain(BOOKKEEPING_FIELDS.iter()) {
				el.remove(field);
			}
			// Elements without a parent land under the model root.
			if el.parent().is_none() {
				el.set(PARENT, Value::from("model"));
			}
			let el = stamp_new(to_internal(el, scope), user, scope, &now);
			debug!("memory store created {}", el.id().unwrap_or_default());
			created.push(el.clone());
			existing.push(el);
		}
		Ok(created)
	}

	async fn update(
		&self,
		user: &User,
		scope: &BranchScope,
		elements: Vec<Element>,
	) -> Result<Vec<Element>, StoreError> {
		self.enter(StoreOp::Update, local_ids(&elements)).await?;

		let mut branches = self.branches.write().await;
		let existing = branches
			.get_mut(scope)
			.ok_or_else(|| StoreError::NotFound(format!("branch {scope}")))?;

		let mut positions = Vec::with_capacity(elements.len());
		for el in &elements {
			let id = el.id().ok_or_else(|| StoreError::Rejected {
				status: 400,
				message: "element is missing an id".to_string(),
			})?;
			let full = scope.element_id(denamespace(id));
			let pos = existing
				.iter()
				.position(|e| e.id() == Some(full.as_str()))
				.ok_or_else(|| StoreError::NotFound(format!("element {}", denamespace(id))))?;
			positions.push(pos);
		}

		let now = Utc::now().to_rfc3339();
		let mut updated = Vec::with_capacity(elements.len());
		for (pos, el) in positions.into_iter().zip(elements) {
			let el = to_internal(el, scope);
			let target = &mut existing[pos];
			for (key, value) in el.iter() {
				let key = key.as_str();
				if key == ID
					|| BOOKKEEPING_FIELDS.contains(&key)
					|| RELATIONSHIP_FIELDS.contains(&key)
				{
					continue;
				}
				target.set(key, value.clone());
			}
			target.set("updatedOn", Value::from(now.clone()));
			target.set("lastModifiedBy", Value::from(user.username.clone()));
			updated.push(target.clone());
		}
		Ok(updated)
	}

	async fn search(
		&self,
		_user: &User,
		scope: &BranchScope,
		query: &str,
	) -> Result<Vec<Element>, StoreError> {
		self.enter(StoreOp::Search, vec![query.to_string()]).await?;

		let branches = self.branches.read().await;
		let elements = branches
			.get(scope)
			.ok_or_else(|| StoreError::NotFound(format!("branch {scope}")))?;
		let needle = query.to_lowercase();
		let hits = elements
			.iter()
			.filter(|el| !is_archived(el))
			.filter(|el| {
				el.id() == Some(query)
					|| ["name", "documentation"].iter().any(|f| {
						el.str_field(f)
							.is_some_and(|v| v.to_lowercase().contains(&needle))
					})
			})
			.map(|el| with_views(el, elements))
			.collect();
		Ok(hits)
	}

	fn supports_batch_find(&self) -> bool {
		self.batch_find
	}
}

fn local_ids(elements: &[Element]) -> Vec<String> {
	elements
		.iter()
		.filter_map(Element::id)
		.map(|id| denamespace(id).to_string())
		.collect()
}

fn is_archived(el: &Element) -> bool {
	matches!(el.get("archived"), Some(Value::Bool(true)))
}

// Namespace every reference into `scope`.
fn to_internal(mut el: Element, scope: &BranchScope) -> Element {
	for field in [ID, PARENT, SOURCE, TARGET] {
		let full = match el.get(field) {
			Some(Value::String(s)) => scope.element_id(denamespace(s)),
			_ => continue,
		};
		el.set(field, Value::String(full));
	}
	el
}

fn stamp_new(mut el: Element, user: &User, scope: &BranchScope, now: &str) -> Element {
	el.set("org", Value::from(scope.org.clone()));
	el.set(
		"project",
		Value::from(format!("{}:{}", scope.org, scope.project)),
	);
	el.set("branch", Value::from(scope.key()));
	el.set("createdBy", Value::from(user.username.clone()));
	el.set("createdOn", Value::from(now));
	el.set("lastModifiedBy", Value::from(user.username.clone()));
	el.set("updatedOn", Value::from(now));
	el.set("archived", Value::Bool(false));
	el.set("archivedOn", Value::Null);
	el.set("archivedBy", Value::Null);
	el
}

fn with_views(el: &Element, all: &[Element]) -> Element {
	let mut out = el.clone();
	let Some(id) = el.id() else {
		return out;
	};
	let related = |field: &str| -> Value {
		Value::Array(
			all.iter()
				.filter(|other| !is_archived(other) && other.str_field(field) == Some(id))
				.filter_map(|other| other.id().map(Value::from))
				.collect(),
		)
	};
	out.set("contains", related(PARENT));
	out.set("sourceOf", related(SOURCE));
	out.set("targetOf", related(TARGET));
	out
}
