// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	BackendConfigLayer, HttpConfigLayer, JobsConfigLayer, LogFormat, LoggingConfigLayer,
	PathsConfigLayer, PortsConfigLayer, SupervisorConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/pooled/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: POOLED_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			http: Some(load_http_from_env()?),
			ports: Some(load_ports_from_env()?),
			backend: Some(load_backend_from_env()),
			supervisor: Some(load_supervisor_from_env()?),
			jobs: Some(load_jobs_from_env()?),
			paths: Some(load_paths_from_env()),
			logging: Some(load_logging_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_u16(name: &str) -> Result<Option<u16>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u16 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u64 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn load_http_from_env() -> Result<HttpConfigLayer, ConfigError> {
	Ok(HttpConfigLayer {
		host: env_var("POOLED_SERVER_HOST"),
		port: env_u16("POOLED_SERVER_PORT")?,
		public_host: env_var("POOLED_SERVER_PUBLIC_HOST"),
	})
}

fn load_ports_from_env() -> Result<PortsConfigLayer, ConfigError> {
	Ok(PortsConfigLayer {
		base: env_u16("POOLED_SERVER_PORTS_BASE")?,
		range: env_u16("POOLED_SERVER_PORTS_RANGE")?,
	})
}

fn load_backend_from_env() -> BackendConfigLayer {
	BackendConfigLayer {
		binary: env_var("POOLED_SERVER_BACKEND_BINARY"),
		config_path: env_var("POOLED_SERVER_BACKEND_CONFIG_PATH"),
		vfs_cache_mode: env_var("POOLED_SERVER_BACKEND_VFS_CACHE_MODE"),
		vfs_cache_max_age: env_var("POOLED_SERVER_BACKEND_VFS_CACHE_MAX_AGE"),
		buffer_size: env_var("POOLED_SERVER_BACKEND_BUFFER_SIZE"),
		log_level: env_var("POOLED_SERVER_BACKEND_LOG_LEVEL"),
	}
}

fn load_supervisor_from_env() -> Result<SupervisorConfigLayer, ConfigError> {
	Ok(SupervisorConfigLayer {
		stop_timeout_secs: env_u64("POOLED_SERVER_STOP_TIMEOUT_SECS")?,
		shutdown_timeout_secs: env_u64("POOLED_SERVER_SHUTDOWN_TIMEOUT_SECS")?,
	})
}

fn load_jobs_from_env() -> Result<JobsConfigLayer, ConfigError> {
	Ok(JobsConfigLayer {
		usage_refresh_enabled: env_bool("POOLED_SERVER_USAGE_REFRESH_ENABLED"),
		usage_refresh_interval_secs: env_u64("POOLED_SERVER_USAGE_REFRESH_INTERVAL_SECS")?,
	})
}

fn load_paths_from_env() -> PathsConfigLayer {
	PathsConfigLayer {
		data_dir: env_var("POOLED_SERVER_DATA_DIR"),
	}
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	let format = match env_var("POOLED_SERVER_LOG_FORMAT") {
		Some(v) => Some(v.parse::<LogFormat>().map_err(|message| ConfigError::InvalidValue {
			key: "POOLED_SERVER_LOG_FORMAT".to_string(),
			message,
		})?),
		None => None,
	};

	Ok(LoggingConfigLayer {
		level: env_var("POOLED_SERVER_LOG_LEVEL"),
		format,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tempfile::NamedTempFile;

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Environment > Precedence::ConfigFile);
		assert!(Precedence::ConfigFile > Precedence::Defaults);
	}

	#[test]
	fn test_defaults_source_returns_empty_layer() {
		let layer = DefaultsSource.load().unwrap();
		assert!(layer.http.is_none());
		assert!(layer.ports.is_none());
	}

	#[test]
	fn test_toml_source_missing_file_returns_empty() {
		let source = TomlSource::new("/nonexistent/config.toml");
		let layer = source.load().unwrap();
		assert!(layer.http.is_none());
	}

	#[test]
	fn test_toml_source_reads_file() {
		let mut file = NamedTempFile::new().unwrap();
		writeln!(file, "[supervisor]\nstop_timeout_secs = 3").unwrap();
		let layer = TomlSource::new(file.path()).load().unwrap();
		assert_eq!(layer.supervisor.unwrap().stop_timeout_secs, Some(3));
	}

	#[test]
	fn test_toml_source_reports_parse_errors() {
		let mut file = NamedTempFile::new().unwrap();
		writeln!(file, "[ports]\nbase = \"not a number\"").unwrap();
		assert!(matches!(
			TomlSource::new(file.path()).load(),
			Err(ConfigError::TomlParse { .. })
		));
	}

	#[test]
	fn test_env_u16_rejects_garbage() {
		std::env::set_var("POOLED_SERVER_TEST_ONLY_U16", "seventy");
		let result = env_u16("POOLED_SERVER_TEST_ONLY_U16");
		std::env::remove_var("POOLED_SERVER_TEST_ONLY_U16");
		assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
	}
}
