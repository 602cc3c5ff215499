//! Configuration module for the order queue service.
//!
//! Configuration is read from TOML. `${VAR}` and `${VAR:-default}` references
//! are resolved from the environment before parsing, and a file may pull in
//! others with `include = ["storage.toml", ...]`. Each top-level section must
//! be defined in exactly one file.

mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Reading a config file failed.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// The config is not valid TOML or does not match the schema.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// The config parsed but is not usable.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Only the message; the default Display repeats the input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub service: ServiceConfig,
	/// Storage backend selection.
	pub storage: StorageConfig,
	/// Background task dispatching.
	#[serde(default)]
	pub tasks: TaskConfig,
	/// HTTP API server. The API is disabled when the section is absent.
	pub api: Option<ApiConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this instance, used in logs.
	pub id: String,
}

/// Storage backends keyed by implementation name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Name of the implementation the service runs on.
	pub primary: String,
	/// Per-implementation tables from `[storage.implementations.<name>]`.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the side effect dispatcher.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskConfig {
	/// Number of parallel lanes. Effects of one order always share a lane.
	#[serde(default = "default_lanes")]
	pub lanes: usize,
}

impl Default for TaskConfig {
	fn default() -> Self {
		Self {
			lanes: default_lanes(),
		}
	}
}

fn default_lanes() -> usize {
	4
}

const MAX_LANES: usize = 64;

/// HTTP API settings. The API stays off unless `enabled` is set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Serve the HTTP API.
	#[serde(default)]
	pub enabled: bool,
	/// Bind address.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Bind port.
	#[serde(default = "default_api_port")]
	pub port: u16,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	9001
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of `VAR_NAME`, or with `default` for
/// `${VAR_NAME:-default}` when the variable is unset. An unset variable
/// without a default is an error.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	// Bounded input keeps the regex scan cheap.
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut output = String::with_capacity(input.len());
	let mut last = 0;
	for cap in re.captures_iter(input) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};

		let value = match (std::env::var(name.as_str()), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					name.as_str()
				)))
			},
		};

		output.push_str(&input[last..whole.start()]);
		output.push_str(&value);
		last = whole.end();
	}
	output.push_str(&input[last..]);

	Ok(output)
}

impl Config {
	/// Loads configuration from a file, following its includes.
	///
	/// Relative includes are resolved against the directory of `path`.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path = Path::new(path);
		let base_dir = path
			.parent()
			.filter(|p| !p.as_os_str().is_empty())
			.unwrap_or_else(|| Path::new("."));

		let file_name = path
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path.display())))?;
		loader::ConfigLoader::new(base_dir).load_config(file_name).await
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
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

		if !(1..=MAX_LANES).contains(&self.tasks.lanes) {
			return Err(ConfigError::Validation(format!(
				"tasks.lanes must be between 1 and {}, got {}",
				MAX_LANES, self.tasks.lanes
			)));
		}

		if let Some(api) = &self.api {
			if api.host.trim().is_empty() {
				return Err(ConfigError::Validation("API host cannot be empty".into()));
			}
		}

		Ok(())
	}
}

/// Parses a TOML string, resolving environment variables and validating the
/// result. Includes are not followed; use [`Config::from_file`] for that.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
[service]
id = "kitchen-1"

[storage]
primary = "memory"
[storage.implementations.memory]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("ORDERQ_TEST_HOST", "localhost");
		std::env::set_var("ORDERQ_TEST_PORT", "9100");

		let input = "host = \"${ORDERQ_TEST_HOST}:${ORDERQ_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:9100\"");

		std::env::remove_var("ORDERQ_TEST_HOST");
		std::env::remove_var("ORDERQ_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${ORDERQ_UNSET_VAR:-fallback}\"";
		assert_eq!(resolve_env_vars(input).unwrap(), "value = \"fallback\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let result = resolve_env_vars("value = \"${ORDERQ_UNSET_VAR}\"");
		assert!(result.unwrap_err().to_string().contains("ORDERQ_UNSET_VAR"));
	}

	#[test]
	fn test_defaults_applied() {
		let config: Config = MINIMAL.parse().unwrap();
		assert_eq!(config.service.id, "kitchen-1");
		assert_eq!(config.tasks.lanes, 4);
		assert!(config.api.is_none());

		let with_api = format!("{}\n[api]\nenabled = true\n", MINIMAL);
		let api = with_api.parse::<Config>().unwrap().api.unwrap();
		assert!(api.enabled);
		assert_eq!((api.host.as_str(), api.port), ("127.0.0.1", 9001));
	}

	#[test]
	fn test_service_id_from_env() {
		std::env::set_var("ORDERQ_TEST_SERVICE_ID", "from-env");
		let config: Config = MINIMAL
			.replace("kitchen-1", "${ORDERQ_TEST_SERVICE_ID}")
			.parse()
			.unwrap();
		assert_eq!(config.service.id, "from-env");
		std::env::remove_var("ORDERQ_TEST_SERVICE_ID");
	}

	#[test]
	fn test_unknown_primary_storage_rejected() {
		let config = MINIMAL.replace("primary = \"memory\"", "primary = \"redis\"");
		let err = config.parse::<Config>().unwrap_err();
		assert!(matches!(err, ConfigError::Validation(ref msg) if msg.contains("redis")));
	}

	#[test]
	fn test_lane_bounds() {
		let zero = format!("{}\n[tasks]\nlanes = 0\n", MINIMAL);
		assert!(matches!(
			zero.parse::<Config>(),
			Err(ConfigError::Validation(_))
		));

		let too_many = format!("{}\n[tasks]\nlanes = 65\n", MINIMAL);
		assert!(too_many.parse::<Config>().is_err());

		let eight = format!("{}\n[tasks]\nlanes = 8\n", MINIMAL);
		assert_eq!(eight.parse::<Config>().unwrap().tasks.lanes, 8);
	}

	#[test]
	fn test_empty_service_id_rejected() {
		let config = MINIMAL.replace("kitchen-1", " ");
		assert!(config.parse::<Config>().is_err());
	}
}
