//! Reconciliation of an exported (and possibly edited) document back into a
//! branch.
//!
//! Every incoming element is classified as a create, a batched update, an
//! individual update (its `parent` changed) or a no-op. Execution happens in
//! three phases: individual updates run concurrently and are awaited
//! together, then one bulk update, then one bulk create. Reparenting is thus
//! settled before sibling mutations are issued.
//!
//! Failure policy is fail fast: the first store error aborts the import and
//! is reported with the list of operations that had already completed.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::diff::Comparable;
use crate::element::{
	CLIENT_IMMUTABLE_FIELDS, Element, ID, PARENT, REFERENCE_FIELDS, RELATIONSHIP_FIELDS,
};
use crate::error::{CompletedOperation, OperationKind, TransferError};
use crate::export::Exporter;
use crate::ids::{BranchScope, ID_DELIMITER, IdError, denamespace};
use crate::observability::MetricsRegistry;
use crate::store::{ElementStore, StoreError, User, with_timeout};
use crate::strip::PublicDataProjector;

/// Local id of the branch root. Its parent is never taken from a document.
pub const MODEL_ID: &str = "model";

/// How a protected element is resolved in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectedLookup {
	/// Search by the namespaced id.
	NamespacedId,
	/// Search by a fixed label instead of the id.
	Label(&'static str),
}

/// Structural elements that import never creates, only updates.
///
/// `holding_bin` is looked up by its legacy label `holding bin` (with a
/// space), which is what the platform's search matches on.
pub const PROTECTED_ELEMENTS: [(&str, ProtectedLookup); 4] = [
	(MODEL_ID, ProtectedLookup::NamespacedId),
	("__mbee__", ProtectedLookup::NamespacedId),
	("undefined", ProtectedLookup::NamespacedId),
	("holding_bin", ProtectedLookup::Label("holding bin")),
];

pub fn protected_lookup(local_id: &str) -> Option<ProtectedLookup> {
	PROTECTED_ELEMENTS
		.iter()
		.find(|(id, _)| *id == local_id)
		.map(|(_, lookup)| *lookup)
}

/// What an import will do, computed before any write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportPlan {
	pub creates: Vec<Element>,
	pub batch_updates: Vec<Element>,
	pub individual_updates: Vec<Element>,
	/// Local ids that need no write.
	pub skipped: Vec<String>,
}

impl ImportPlan {
	pub fn is_noop(&self) -> bool {
		self.creates.is_empty() && self.batch_updates.is_empty() && self.individual_updates.is_empty()
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
	pub created: usize,
	pub updated: usize,
	pub skipped: usize,
}

/// Result of a successful import: the branch as exported after the writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
	pub elements: Vec<Element>,
	pub summary: ImportSummary,
}

/// The reconciliation engine.
pub struct Importer {
	store: Arc<dyn ElementStore>,
	exporter: Exporter,
	projector: Arc<dyn PublicDataProjector>,
	timeout: Duration,
	metrics: Option<Arc<MetricsRegistry>>,
}

impl Importer {
	pub fn new(
		store: Arc<dyn ElementStore>,
		projector: Arc<dyn PublicDataProjector>,
		timeout: Duration,
	) -> Self {
		Self {
			exporter: Exporter::new(store.clone(), projector.clone(), timeout),
			store,
			projector,
			timeout,
			metrics: None,
		}
	}

	/// Record import metrics. The re-export after the writes stays out of the
	/// export counters.
	pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
		self.metrics = Some(metrics);
		self
	}

	/// Reconcile `document` into `scope` and return the freshly exported
	/// branch.
	pub async fn import_branch(
		&self,
		user: &User,
		scope: &BranchScope,
		document: Vec<Element>,
	) -> Result<ImportOutcome, TransferError> {
		if let Some(m) = &self.metrics {
			m.import_requests_total.inc();
		}

		let res = self.run(user, scope, document).await;
		match &res {
			Ok(outcome) => {
				info!(
					"import into {} complete: {} created, {} updated, {} unchanged",
					scope, outcome.summary.created, outcome.summary.updated, outcome.summary.skipped
				);
				if let Some(m) = &self.metrics {
					m.elements_created_total.inc_by(outcome.summary.created as u64);
					m.elements_updated_total.inc_by(outcome.summary.updated as u64);
					m.elements_skipped_total.inc_by(outcome.summary.skipped as u64);
				}
			}
			Err(e) => {
				error!("import into {} failed: {}", scope, e);
				if let Some(m) = &self.metrics {
					m.import_failures_total.inc();
				}
			}
		}
		res
	}

	async fn run(
		&self,
		user: &User,
		scope: &BranchScope,
		document: Vec<Element>,
	) -> Result<ImportOutcome, TransferError> {
		let incoming = prepare(document)?;
		let plan = self.plan(user, scope, incoming).await?;
		let summary = ImportSummary {
			created: plan.creates.len(),
			updated: plan.batch_updates.len() + plan.individual_updates.len(),
			skipped: plan.skipped.len(),
		};

		let completed = self.execute(user, scope, plan).await?;

		let elements = self
			.exporter
			.export_branch(user, scope)
			.await
			.map_err(|e| match e {
				TransferError::StoreFailure(source) => TransferError::ImportFailure {
					stage: "re-export",
					source,
					completed,
				},
				other => other,
			})?;

		Ok(ImportOutcome { elements, summary })
	}

	/// Classify sanitized incoming elements against the store. Read only.
	pub async fn plan(
		&self,
		user: &User,
		scope: &BranchScope,
		incoming: Vec<Element>,
	) -> Result<ImportPlan, TransferError> {
		let ordinary: Vec<String> = incoming
			.iter()
			.filter_map(Element::id)
			.filter(|id| protected_lookup(id).is_none())
			.map(str::to_string)
			.collect();
		let existing = self.lookup(user, scope, &ordinary).await?;

		let mut plan = ImportPlan::default();
		for mut el in incoming {
			let Some(local_id) = el.id().map(str::to_string) else {
				continue;
			};

			let stored = match protected_lookup(&local_id) {
				Some(lookup) => {
					if local_id == MODEL_ID {
						el.remove(PARENT);
					}
					match self.resolve_protected(user, scope, &local_id, lookup).await? {
						Some(stored) => stored,
						None => {
							warn!(
								"protected element {} not found in {}; it is never created by import",
								local_id, scope
							);
							plan.skipped.push(local_id);
							continue;
						}
					}
				}
				None => match existing.get(&local_id) {
					Some(stored) => stored.clone(),
					None => {
						debug!("creating new element {}", scope.element_id(&local_id));
						plan.creates.push(el);
						continue;
					}
				},
			};

			let changes = el.diff(&stored);
			if !changes.has_changed {
				plan.skipped.push(local_id);
				continue;
			}

			debug!(
				"updating {} ({})",
				scope.element_id(&local_id),
				changes.properties.join(", ")
			);
			let mut patch = Element::with_id(local_id);
			for name in &changes.properties {
				if let Some(value) = el.get(name) {
					patch.set(name, value.clone());
				}
			}
			if changes.touches(PARENT) {
				plan.individual_updates.push(patch);
			} else {
				plan.batch_updates.push(patch);
			}
		}
		Ok(plan)
	}

	/// Fetch the public form of existing elements for `ids`, keyed by local id.
	async fn lookup(
		&self,
		user: &User,
		scope: &BranchScope,
		ids: &[String],
	) -> Result<HashMap<String, Element>, TransferError> {
		if ids.is_empty() {
			return Ok(HashMap::new());
		}

		let batch = if self.store.supports_batch_find() {
			match self.timed(self.store.find(user, scope, Some(ids))).await {
				Err(StoreError::BatchLookupUnsupported) => None,
				other => Some(other.map_err(lookup_failure)?),
			}
		} else {
			None
		};

		let found = match batch {
			Some(found) => found,
			None => {
				debug!("batch lookup unavailable; looking up {} ids one by one", ids.len());
				let mut found = Vec::with_capacity(ids.len());
				for id in ids {
					let one = self
						.timed(self.store.find(user, scope, Some(std::slice::from_ref(id))))
						.await
						.map_err(lookup_failure)?;
					found.extend(one);
				}
				found
			}
		};

		Ok(found
			.iter()
			.map(|el| self.projector.public_data(el))
			.filter_map(|el| Some((el.id()?.to_string(), el)))
			.collect())
	}

	async fn resolve_protected(
		&self,
		user: &User,
		scope: &BranchScope,
		local_id: &str,
		lookup: ProtectedLookup,
	) -> Result<Option<Element>, TransferError> {
		let query = match lookup {
			ProtectedLookup::NamespacedId => scope.element_id(local_id),
			ProtectedLookup::Label(label) => label.to_string(),
		};
		let hits = self
			.timed(self.store.search(user, scope, &query))
			.await
			.map_err(lookup_failure)?;

		// Label searches may match unrelated elements; only the one carrying
		// the protected id counts.
		Ok(hits
			.iter()
			.map(|el| self.projector.public_data(el))
			.find(|el| el.id() == Some(local_id)))
	}

	async fn execute(
		&self,
		user: &User,
		scope: &BranchScope,
		plan: ImportPlan,
	) -> Result<Vec<CompletedOperation>, TransferError> {
		let mut completed: Vec<CompletedOperation> = Vec::new();

		// Phase 1: reparenting updates, concurrently, all awaited.
		if !plan.individual_updates.is_empty() {
			let calls = plan.individual_updates.into_iter().map(|el| {
				let ids = local_ids(std::slice::from_ref(&el));
				info!("Updating {} (reparent)", scope.element_id(el.id().unwrap_or_default()));
				async move { (ids, self.timed(self.store.update(user, scope, vec![el])).await) }
			});
			let mut first_error: Option<StoreError> = None;
			for (ids, res) in join_all(calls).await {
				match res {
					Ok(_) => completed.push(CompletedOperation {
						kind: OperationKind::IndividualUpdate,
						ids,
					}),
					Err(e) => {
						error!("update of {} in {} failed: {}", ids.join(","), scope, e);
						if first_error.is_none() {
							first_error = Some(e);
						}
					}
				}
			}
			if let Some(source) = first_error {
				return Err(TransferError::ImportFailure {
					stage: "individual update",
					source,
					completed,
				});
			}
		}

		// Phase 2: every other update in one call.
		if !plan.batch_updates.is_empty() {
			let ids = local_ids(&plan.batch_updates);
			info!("Updating {} elements in {}", ids.len(), scope);
			if let Err(source) = self
				.timed(self.store.update(user, scope, plan.batch_updates))
				.await
			{
				return Err(TransferError::ImportFailure {
					stage: "batch update",
					source,
					completed,
				});
			}
			completed.push(CompletedOperation {
				kind: OperationKind::BatchUpdate,
				ids,
			});
		}

		// Phase 3: creates in one call.
		if !plan.creates.is_empty() {
			let ids = local_ids(&plan.creates);
			info!("Creating {} new elements in {}", ids.len(), scope);
			if let Err(source) = self.timed(self.store.create(user, scope, plan.creates)).await {
				return Err(TransferError::ImportFailure {
					stage: "create",
					source,
					completed,
				});
			}
			completed.push(CompletedOperation {
				kind: OperationKind::Create,
				ids,
			});
		}

		Ok(completed)
	}

	async fn timed<T, F>(&self, call: F) -> Result<T, StoreError>
	where
		F: Future<Output = Result<T, StoreError>>,
	{
		let start = Instant::now();
		let res = with_timeout(self.timeout, call).await;
		if let Some(m) = &self.metrics {
			m.store_call_duration_seconds
				.observe(start.elapsed().as_secs_f64());
		}
		res
	}
}

/// Sanitize an import document: drop client-supplied bookkeeping and
/// relationship views, and reject documents whose ids cannot be reconciled.
/// Runs before any store call.
pub fn prepare(document: Vec<Element>) -> Result<Vec<Element>, TransferError> {
	let mut seen: HashSet<String> = HashSet::with_capacity(document.len());
	let mut out = Vec::with_capacity(document.len());

	for (index, mut el) in document.into_iter().enumerate() {
		for field in CLIENT_IMMUTABLE_FIELDS.iter().chain(RELATIONSHIP_FIELDS.iter()) {
			el.remove(field);
		}

		let id = match el.get(ID) {
			Some(Value::String(id)) if !id.is_empty() => id.clone(),
			_ => {
				return Err(TransferError::InvalidDocument(format!(
					"element at index {} has no string id",
					index
				)));
			}
		};
		for field in REFERENCE_FIELDS {
			if let Some(reference) = el.str_field(field) {
				if reference.contains(ID_DELIMITER) {
					return Err(IdError::Malformed {
						id: reference.to_string(),
					}
					.into());
				}
			}
		}
		if !seen.insert(id.clone()) {
			return Err(TransferError::InvalidDocument(format!(
				"duplicate element id {}",
				id
			)));
		}
		out.push(el);
	}
	Ok(out)
}

fn local_ids(elements: &[Element]) -> Vec<String> {
	elements
		.iter()
		.filter_map(Element::id)
		.map(|id| denamespace(id).to_string())
		.collect()
}

fn lookup_failure(source: StoreError) -> TransferError {
	match source {
		StoreError::NotFound(what) => TransferError::NotFound(what),
		source => TransferError::ImportFailure {
			stage: "lookup",
			source,
			completed: Vec::new(),
		},
	}
}
