use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Central registry for all Prometheus metrics
pub struct MetricsRegistry {
	registry: Registry,

	// Export metrics
	pub export_requests_total: IntCounter,
	pub export_failures_total: IntCounter,
	pub exported_elements_total: IntCounter,

	// Import metrics
	pub import_requests_total: IntCounter,
	pub import_failures_total: IntCounter,
	pub elements_created_total: IntCounter,
	pub elements_updated_total: IntCounter,
	pub elements_skipped_total: IntCounter,

	// Store metrics
	pub store_call_duration_seconds: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
	let c = IntCounter::with_opts(Opts::new(name, help).namespace("model_transfer"))?;
	registry.register(Box::new(c.clone()))?;
	Ok(c)
}

impl MetricsRegistry {
	pub fn new() -> prometheus::Result<Self> {
		let registry = Registry::new();

		let export_requests_total =
			counter(&registry, "export_requests_total", "Total number of export requests")?;
		let export_failures_total =
			counter(&registry, "export_failures_total", "Total number of failed exports")?;
		let exported_elements_total = counter(
			&registry,
			"exported_elements_total",
			"Total number of elements written to exported documents",
		)?;

		let import_requests_total =
			counter(&registry, "import_requests_total", "Total number of import requests")?;
		let import_failures_total =
			counter(&registry, "import_failures_total", "Total number of failed imports")?;
		let elements_created_total = counter(
			&registry,
			"elements_created_total",
			"Elements created by imports",
		)?;
		let elements_updated_total = counter(
			&registry,
			"elements_updated_total",
			"Elements updated by imports",
		)?;
		let elements_skipped_total = counter(
			&registry,
			"elements_skipped_total",
			"Imported elements skipped because nothing changed",
		)?;

		let store_call_duration_seconds = Histogram::with_opts(
			HistogramOpts::new(
				"store_call_duration_seconds",
				"Duration of element store calls in seconds",
			)
			.namespace("model_transfer")
			.buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
		)?;
		registry.register(Box::new(store_call_duration_seconds.clone()))?;

		Ok(Self {
			registry,
			export_requests_total,
			export_failures_total,
			exported_elements_total,
			import_requests_total,
			import_failures_total,
			elements_created_total,
			elements_updated_total,
			elements_skipped_total,
			store_call_duration_seconds,
		})
	}

	/// Encode metrics in Prometheus text format
	pub fn encode(&self) -> String {
		let encoder = TextEncoder::new();
		let metric_families = self.registry.gather();
		match encoder.encode_to_string(&metric_families) {
			Ok(s) => s,
			Err(e) => {
				log::error!("failed to encode metrics: {}", e);
				String::new()
			}
		}
	}
}

/// Build the shared metrics registry
pub fn init_metrics() -> anyhow::Result<Arc<MetricsRegistry>> {
	Ok(Arc::new(MetricsRegistry::new()?))
}

#[cfg(feature = "unit-tests")]
mod tests {
	#[test]
	fn metrics_registry_creation() {
		let registry = super::MetricsRegistry::new().unwrap();
		let text = registry.encode();
		assert!(text.contains("model_transfer_import_requests_total"));
		assert!(text.contains("model_transfer_store_call_duration_seconds"));
	}

	#[test]
	fn metrics_increment() {
		let registry = super::MetricsRegistry::new().unwrap();
		registry.import_requests_total.inc();
		registry.elements_created_total.inc_by(10);
		let text = registry.encode();
		assert!(text.contains("model_transfer_import_requests_total 1"));
		assert!(text.contains("model_transfer_elements_created_total 10"));
	}
}
