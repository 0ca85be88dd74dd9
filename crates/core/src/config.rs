//! Session configuration.
//!
//! Loaded from JSON; every field is optional and falls back to the defaults
//! below.

use std::path::Path;
use std::time::Duration;

use coderun_protocol::Language;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Interactive execution endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "wss://compiler.skillshikshya.com/ws/compiler/";

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// 1 MiB of retained output per run.
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1024 * 1024;

/// Settings for one [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	/// WebSocket URL of the backend's interactive-execution endpoint.
	pub endpoint: String,
	/// Languages `start` accepts.
	pub languages: Vec<Language>,
	/// Upper bound on the WebSocket handshake.
	pub connect_timeout_ms: u64,
	/// Report a run that produced no output for this long (`None` = never).
	pub stale_run_timeout_ms: Option<u64>,
	/// Bytes of output retained per run (`None` = unbounded).
	pub output_limit_bytes: Option<usize>,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			endpoint: DEFAULT_ENDPOINT.to_string(),
			languages: Language::ALL.to_vec(),
			connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
			stale_run_timeout_ms: None,
			output_limit_bytes: Some(DEFAULT_OUTPUT_LIMIT_BYTES),
		}
	}
}

impl SessionConfig {
	/// Default configuration pointed at `endpoint`.
	pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
		Self {
			endpoint: endpoint.into(),
			..Self::default()
		}
	}

	/// Load configuration from a JSON file.
	pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
		let content = std::fs::read_to_string(path)?;
		Self::from_json(&content)
	}

	/// Parse configuration from a JSON string.
	pub fn from_json(json: &str) -> Result<Self> {
		let config: SessionConfig = serde_json::from_str(json)?;
		config.validate()?;
		Ok(config)
	}

	/// Validate configuration values.
	pub fn validate(&self) -> Result<()> {
		let url = url::Url::parse(&self.endpoint).map_err(|e| Error::Config(format!("endpoint {:?} is not a valid URL: {e}", self.endpoint)))?;
		if !matches!(url.scheme(), "ws" | "wss") {
			return Err(Error::Config(format!("endpoint must use ws:// or wss://, got {}://", url.scheme())));
		}

		if self.languages.is_empty() {
			return Err(Error::Config("languages must not be empty".to_string()));
		}

		if self.connect_timeout_ms == 0 {
			return Err(Error::Config("connect_timeout_ms must be > 0".to_string()));
		}

		if self.stale_run_timeout_ms == Some(0) {
			return Err(Error::Config("stale_run_timeout_ms must be > 0 when set".to_string()));
		}

		if self.output_limit_bytes == Some(0) {
			return Err(Error::Config("output_limit_bytes must be > 0 when set".to_string()));
		}

		Ok(())
	}

	pub fn connect_timeout(&self) -> Duration {
		Duration::from_millis(self.connect_timeout_ms)
	}

	pub fn stale_run_timeout(&self) -> Option<Duration> {
		self.stale_run_timeout_ms.map(Duration::from_millis)
	}

	pub fn supports(&self, language: Language) -> bool {
		self.languages.contains(&language)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_default_config_is_valid() {
		let config = SessionConfig::default();
		config.validate().unwrap();
		assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
		assert!(config.supports(Language::Python));
		assert!(config.supports(Language::JavaScript));
		assert_eq!(config.stale_run_timeout(), None);
	}

	#[test]
	fn test_partial_json_uses_defaults() {
		let config = SessionConfig::from_json(r#"{"endpoint": "ws://localhost:9000/ws", "languages": ["python"], "stale_run_timeout_ms": 2500}"#).unwrap();

		assert_eq!(config.endpoint, "ws://localhost:9000/ws");
		assert_eq!(config.languages, vec![Language::Python]);
		assert!(!config.supports(Language::JavaScript));
		assert_eq!(config.stale_run_timeout(), Some(Duration::from_millis(2500)));
		assert_eq!(config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
		assert_eq!(config.output_limit_bytes, Some(DEFAULT_OUTPUT_LIMIT_BYTES));
	}

	#[test]
	fn test_null_output_limit_means_unbounded() {
		let config = SessionConfig::from_json(r#"{"output_limit_bytes": null}"#).unwrap();
		assert_eq!(config.output_limit_bytes, None);
	}

	#[test]
	fn test_validation_rejects_bad_values() {
		let cases = [
			r#"{"endpoint": "not a url"}"#,
			r#"{"endpoint": "https://example.com/ws"}"#,
			r#"{"languages": []}"#,
			r#"{"connect_timeout_ms": 0}"#,
			r#"{"stale_run_timeout_ms": 0}"#,
			r#"{"output_limit_bytes": 0}"#,
		];
		for case in cases {
			let err = SessionConfig::from_json(case).unwrap_err();
			assert!(matches!(err, Error::Config(_)), "{case} should fail validation, got {err:?}");
		}
	}

	#[test]
	fn test_unknown_language_is_a_parse_error() {
		let err = SessionConfig::from_json(r#"{"languages": ["cobol"]}"#).unwrap_err();
		assert!(matches!(err, Error::Json(_)));
	}

	#[test]
	fn test_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, r#"{{"endpoint": "wss://runner.example/ws/", "connect_timeout_ms": 250}}"#).unwrap();

		let config = SessionConfig::from_file(file.path()).unwrap();
		assert_eq!(config.endpoint, "wss://runner.example/ws/");
		assert_eq!(config.connect_timeout(), Duration::from_millis(250));
	}

	#[test]
	fn test_missing_file_is_io_error() {
		let dir = tempfile::tempdir().unwrap();
		let err = SessionConfig::from_file(dir.path().join("absent.json")).unwrap_err();
		assert!(matches!(err, Error::Io(_)));
	}
}
