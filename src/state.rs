use std::sync::Arc;
use std::time::Duration;

use crate::export::Exporter;
use crate::import::Importer;
use crate::observability::MetricsRegistry;
use crate::store::ElementStore;
use crate::strip::{PublicDataProjector, ReferenceStripper, RelationshipMode};

/// Application state passed to handlers via Axum's `State` extractor.
///
/// Exporter and importer share one store handle. Nothing here caches element
/// data; every request reads the store afresh.
#[derive(Clone)]
pub struct AppState {
	pub exporter: Arc<Exporter>,
	pub importer: Arc<Importer>,
	pub metrics: Arc<MetricsRegistry>,
}

impl AppState {
	pub fn new(
		store: Arc<dyn ElementStore>,
		mode: RelationshipMode,
		timeout: Duration,
		metrics: Arc<MetricsRegistry>,
	) -> Self {
		let projector: Arc<dyn PublicDataProjector> = Arc::new(ReferenceStripper::new(mode));
		let exporter = Exporter::new(store.clone(), projector.clone(), timeout)
			.with_metrics(metrics.clone());
		let importer = Importer::new(store, projector, timeout).with_metrics(metrics.clone());
		Self {
			exporter: Arc::new(exporter),
			importer: Arc::new(importer),
			metrics,
		}
	}
}
