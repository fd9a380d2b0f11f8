use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info};

use crate::element::Element;
use crate::error::TransferError;
use crate::ids::BranchScope;
use crate::observability::MetricsRegistry;
use crate::store::{ElementStore, User, with_timeout};
use crate::strip::PublicDataProjector;

/// Fetches a whole branch and projects it into an exported document.
pub struct Exporter {
	store: Arc<dyn ElementStore>,
	projector: Arc<dyn PublicDataProjector>,
	timeout: Duration,
	metrics: Option<Arc<MetricsRegistry>>,
}

impl Exporter {
	pub fn new(
		store: Arc<dyn ElementStore>,
		projector: Arc<dyn PublicDataProjector>,
		timeout: Duration,
	) -> Self {
		Self {
			store,
			projector,
			timeout,
			metrics: None,
		}
	}

	pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
		self.metrics = Some(metrics);
		self
	}

	/// Export every element of `scope` in store order. Never writes to the
	/// store and never returns a partial document.
	pub async fn export_branch(
		&self,
		user: &User,
		scope: &BranchScope,
	) -> Result<Vec<Element>, TransferError> {
		if let Some(m) = &self.metrics {
			m.export_requests_total.inc();
		}

		let start = Instant::now();
		let res = with_timeout(self.timeout, self.store.find(user, scope, None)).await;
		if let Some(m) = &self.metrics {
			m.store_call_duration_seconds
				.observe(start.elapsed().as_secs_f64());
		}

		let elements = match res {
			Ok(elements) => elements,
			Err(e) => {
				error!("export of {} failed: {}", scope, e);
				if let Some(m) = &self.metrics {
					m.export_failures_total.inc();
				}
				return Err(e.into());
			}
		};

		let document: Vec<Element> = elements
			.iter()
			.map(|el| self.projector.public_data(el))
			.collect();

		if let Some(m) = &self.metrics {
			m.exported_elements_total.inc_by(document.len() as u64);
		}
		info!(
			"exported {} elements from {}; organization, project, and branch references removed",
			document.len(),
			scope
		);
		Ok(document)
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;
	use crate::store::{MemoryStore, StoreError, StoreOp};
	use crate::strip::ReferenceStripper;

	fn scope() -> BranchScope {
		BranchScope::new("acme", "rocket", "master").unwrap()
	}

	async fn exporter() -> (Arc<MemoryStore>, Exporter) {
		let store = Arc::new(MemoryStore::new());
		store.create_branch(&User::new("admin"), &scope()).await;
		let exporter = Exporter::new(
			store.clone(),
			Arc::new(ReferenceStripper::default()),
			Duration::from_secs(5),
		);
		(store, exporter)
	}

	#[tokio::test]
	async fn export_strips_every_element() {
		let (store, exporter) = exporter().await;
		let doc = exporter
			.export_branch(&User::new("admin"), &scope())
			.await
			.unwrap();
		assert_eq!(doc.len(), 4);
		for el in &doc {
			assert!(!el.id().unwrap().contains(':'));
			assert!(!el.contains_key("createdBy"));
			assert!(!el.contains_key("contains"));
		}
		// export is read only
		let calls = store.calls().await;
		assert!(calls.iter().all(|c| c.op == StoreOp::Find));
	}

	#[tokio::test]
	async fn export_failure_has_no_partial_document() {
		let (store, exporter) = exporter().await;
		store
			.fail_next(StoreOp::Find, StoreError::Unavailable("db down".into()))
			.await;
		let err = exporter
			.export_branch(&User::new("admin"), &scope())
			.await
			.unwrap_err();
		assert!(matches!(err, TransferError::StoreFailure(_)));
	}

	#[tokio::test]
	async fn export_of_unknown_branch_is_not_found() {
		let (_store, exporter) = exporter().await;
		let other = BranchScope::new("acme", "rocket", "dev").unwrap();
		let err = exporter
			.export_branch(&User::new("admin"), &other)
			.await
			.unwrap_err();
		assert!(matches!(err, TransferError::NotFound(_)));
	}
}
