//! Configuration of the order management service.
//!
//! The service reads one TOML file, optionally pulling in further files via
//! `include = ["api.toml", ...]`. A top-level section may appear in only one
//! of them. `${NAME}` and `${NAME:-fallback}` placeholders are replaced from
//! the environment before parsing, and the result is validated as a whole.

#[cfg(any(test, feature = "testing"))]
pub mod builders;
mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Upper bound accepted for `service.store_timeout_ms`.
const MAX_STORE_TIMEOUT_MS: u64 = 300_000;

/// Failures while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// A configuration file could not be read.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// The TOML did not match the expected structure.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// The values are well-formed but unusable.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep only the message, not the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the order service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to the service instance.
	pub service: ServiceConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for the internal event bus.
	#[serde(default)]
	pub events: EventsConfig,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Configuration specific to the service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Identifier of this instance, used in logs.
	pub id: String,
	/// Deadline in milliseconds for every store call made by the manager.
	#[serde(default = "default_store_timeout_ms")]
	pub store_timeout_ms: u64,
}

impl ServiceConfig {
	/// Returns the store deadline as a `Duration`.
	pub fn store_timeout(&self) -> Duration {
		Duration::from_millis(self.store_timeout_ms)
	}
}

fn default_store_timeout_ms() -> u64 {
	5000
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the internal event bus.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
	/// Capacity of the broadcast channel.
	#[serde(default = "default_channel_capacity")]
	pub channel_capacity: usize,
	/// Maximum number of event handlers running at the same time.
	#[serde(default = "default_max_concurrent_handlers")]
	pub max_concurrent_handlers: usize,
}

impl Default for EventsConfig {
	fn default() -> Self {
		Self {
			channel_capacity: default_channel_capacity(),
			max_concurrent_handlers: default_max_concurrent_handlers(),
		}
	}
}

fn default_channel_capacity() -> usize {
	1000
}

fn default_max_concurrent_handlers() -> usize {
	100
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// CORS configuration.
	pub cors: Option<CorsConfig>,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			host: default_api_host(),
			port: default_api_port(),
			timeout_seconds: default_api_timeout(),
			max_request_size: default_max_request_size(),
			cors: None,
		}
	}
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Allowed origins for CORS.
	pub allowed_origins: Vec<String>,
	/// Allowed headers for CORS.
	pub allowed_headers: Vec<String>,
	/// Allowed methods for CORS.
	pub allowed_methods: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024
}

/// Largest configuration text accepted for placeholder substitution.
const MAX_CONFIG_BYTES: usize = 1024 * 1024;

/// Substitutes `${NAME}` and `${NAME:-fallback}` placeholders.
///
/// A placeholder whose variable is unset and has no fallback is an error.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	if input.len() > MAX_CONFIG_BYTES {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_CONFIG_BYTES
		)));
	}

	let placeholder = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut output = String::with_capacity(input.len());
	let mut copied_up_to = 0;
	for cap in placeholder.captures_iter(input) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match (std::env::var(name.as_str()), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(fallback)) => fallback.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					name.as_str()
				)))
			},
		};

		output.push_str(&input[copied_up_to..whole.start()]);
		output.push_str(&value);
		copied_up_to = whole.end();
	}
	output.push_str(&input[copied_up_to..]);

	Ok(output)
}

impl Config {
	/// Loads configuration from a file, resolving includes and environment variables.
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates the configuration to ensure all required fields are properly set.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}
		if self.service.store_timeout_ms == 0 || self.service.store_timeout_ms > MAX_STORE_TIMEOUT_MS
		{
			return Err(ConfigError::Validation(format!(
				"store_timeout_ms must be between 1 and {}",
				MAX_STORE_TIMEOUT_MS
			)));
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		if self.events.channel_capacity == 0 {
			return Err(ConfigError::Validation(
				"events.channel_capacity must be greater than 0".into(),
			));
		}
		if self.events.max_concurrent_handlers == 0 {
			return Err(ConfigError::Validation(
				"events.max_concurrent_handlers must be greater than 0".into(),
			));
		}

		if let Some(ref api) = self.api {
			if api.enabled && api.timeout_seconds == 0 {
				return Err(ConfigError::Validation(
					"api.timeout_seconds must be greater than 0".into(),
				));
			}
		}

		Ok(())
	}
}

/// Parses a configuration from a TOML string, resolving environment variables
/// and validating the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
