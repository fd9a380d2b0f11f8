use std::time::Duration;

use log::Level;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::strip::RelationshipMode;

/// URL scheme that selects the in-process element store.
pub const MEMORY_STORE_SCHEME: &str = "memory";

/// Runtime configuration for the model transfer service.
///
/// Values are loaded from (in order): `/etc/mbee/model-transfer.json`, the
/// same file name under the user config folders (optional), and environment
/// variables prefixed with `MTX_` (e.g. `MTX_PORT`).
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(default)]
pub struct Settings {
	pub host: String,
	pub port: u16,
	pub log_level: Level,
	/// Base URL of the element API, or `memory://` for the in-process store.
	pub store_url: Url,
	/// Service token used when a caller carries none.
	pub store_token: Option<String>,
	pub store_timeout_ms: u64,
	pub max_body_bytes: usize,
	/// Keep `contains`/`sourceOf`/`targetOf` in exported documents.
	pub retain_relationships: bool,
}

impl Default for Settings {
	fn default() -> Self {
		let host = hostname::get()
			.ok()
			.and_then(|s| s.into_string().ok())
			.unwrap_or_else(|| "127.0.0.1".to_string());

		Self {
			host,
			port: 9080,
			log_level: Level::Info,
			store_url: Url::parse("http://localhost:6233/").unwrap(),
			store_token: None,
			store_timeout_ms: 30_000,
			// imports of large models arrive as a single body
			max_body_bytes: 50 * 1024 * 1024,
			retain_relationships: false,
		}
	}
}

impl Settings {
	pub fn store_timeout(&self) -> Duration {
		Duration::from_millis(self.store_timeout_ms)
	}

	pub fn relationship_mode(&self) -> RelationshipMode {
		if self.retain_relationships {
			RelationshipMode::Retain
		} else {
			RelationshipMode::Strip
		}
	}

	pub fn uses_memory_store(&self) -> bool {
		self.store_url.scheme() == MEMORY_STORE_SCHEME
	}
}

#[derive(Debug, Error)]
pub enum SettingsError {
	#[error("configuration error: {0}")]
	Config(#[from] config::ConfigError),

	#[error("invalid value for {key}: {value}")]
	Invalid { key: &'static str, value: String },
}

pub fn load() -> Result<Settings, SettingsError> {
	let mut builder = config::Config::builder()
		.add_source(config::File::with_name("/etc/mbee/model-transfer.json").required(false));

	if let Some(folder) = dirs::config_dir() {
		let user_config_path = folder.join("mbee").join("model-transfer.json");
		builder = builder.add_source(config::File::from(user_config_path).required(false));
	}
	if let Some(folder) = dirs::config_local_dir() {
		let local_config_path = folder.join("mbee").join("model-transfer.json");
		builder = builder.add_source(config::File::from(local_config_path).required(false));
	}

	builder = builder.add_source(config::Environment::with_prefix("MTX").separator("__"));

	let cfg = builder.build()?;

	let mut s: Settings = cfg.try_deserialize()?;

	// Direct environment variables win over everything else; the `config`
	// crate does not map single-underscore names onto fields.
	if let Some(h) = env_value("MTX_HOST") {
		s.host = h;
	}
	if let Some(p) = env_value("MTX_PORT") {
		s.port = parse("MTX_PORT", p)?;
	}
	if let Some(u) = env_value("MTX_STORE_URL") {
		s.store_url = Url::parse(&u).map_err(|_| SettingsError::Invalid {
			key: "MTX_STORE_URL",
			value: u,
		})?;
	}
	if let Some(t) = env_value("MTX_STORE_TOKEN") {
		s.store_token = Some(t);
	}
	if let Some(ms) = env_value("MTX_STORE_TIMEOUT_MS") {
		s.store_timeout_ms = parse("MTX_STORE_TIMEOUT_MS", ms)?;
	}
	if let Some(l) = env_value("MTX_LOG_LEVEL") {
		s.log_level = parse("MTX_LOG_LEVEL", l)?;
	}
	if let Some(b) = env_value("MTX_MAX_BODY_BYTES") {
		s.max_body_bytes = parse("MTX_MAX_BODY_BYTES", b)?;
	}
	if let Some(r) = env_value("MTX_RETAIN_RELATIONSHIPS") {
		s.retain_relationships = parse("MTX_RETAIN_RELATIONSHIPS", r)?;
	}

	Ok(s)
}

fn env_value(key: &str) -> Option<String> {
	std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, SettingsError> {
	value
		.parse::<T>()
		.map_err(|_| SettingsError::Invalid { key, value })
}
