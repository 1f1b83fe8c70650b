// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for the pooled storage server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`POOLED_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use pooled_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Server listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use std::path::PathBuf;

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub ports: PortsConfig,
	pub backend: BackendConfig,
	pub supervisor: SupervisorConfig,
	pub jobs: JobsConfig,
	pub paths: PathsConfig,
	pub logging: LoggingConfig,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`POOLED_SERVER_*`)
/// 2. Config file (`/etc/pooled/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(config_path: impl Into<PathBuf>) -> Result<ServerConfig, ConfigError> {
	load_from(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let http = layer.http.unwrap_or_default().finalize();
	let ports = layer.ports.unwrap_or_default().finalize()?;
	let paths = layer.paths.unwrap_or_default().finalize();
	let backend = layer.backend.unwrap_or_default().finalize(&paths.data_dir);
	let supervisor = layer.supervisor.unwrap_or_default().finalize();
	let jobs = layer.jobs.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&http, &ports, &jobs)?;

	info!(
		host = %http.host,
		port = http.port,
		port_base = ports.base,
		port_range = ports.range,
		data_dir = %paths.data_dir.display(),
		backend = %backend.binary.display(),
		usage_refresh_enabled = jobs.usage_refresh_enabled,
		"Server configuration loaded"
	);

	Ok(ServerConfig {
		http,
		ports,
		backend,
		supervisor,
		jobs,
		paths,
		logging,
	})
}

/// Validate cross-field configuration rules.
fn validate_config(http: &HttpConfig, ports: &PortsConfig, jobs: &JobsConfig) -> Result<(), ConfigError> {
	if http.port >= ports.base && u32::from(http.port) < u32::from(ports.base) + u32::from(ports.range) {
		return Err(ConfigError::Validation(format!(
			"http.port {} lies inside the pool port range {}-{}",
			http.port,
			ports.base,
			ports.last()
		)));
	}

	if jobs.usage_refresh_enabled && jobs.usage_refresh_interval_secs == 0 {
		return Err(ConfigError::Validation(
			"jobs.usage_refresh_interval_secs must be greater than zero".to_string(),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_finalize() {
		let config = finalize(ServerConfigLayer::default()).unwrap();
		assert_eq!(config.socket_addr(), "0.0.0.0:20050");
		assert_eq!(config.ports.base, 20060);
		assert_eq!(config.ports.range, 40);
		assert_eq!(config.backend.config_path, PathBuf::from("/config/rclone.conf"));
		assert_eq!(
			config.paths.state_file(),
			PathBuf::from("/config/pooled-storage-data.json")
		);
	}

	#[test]
	fn test_http_port_inside_pool_range_rejected() {
		let layer = ServerConfigLayer {
			http: Some(HttpConfigLayer {
				port: Some(20070),
				..Default::default()
			}),
			..Default::default()
		};
		let result = finalize(layer);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("pool port range"));
	}

	#[test]
	fn test_zero_refresh_interval_rejected() {
		let layer = ServerConfigLayer {
			jobs: Some(JobsConfigLayer {
				usage_refresh_enabled: Some(true),
				usage_refresh_interval_secs: Some(0),
			}),
			..Default::default()
		};
		assert!(finalize(layer).is_err());
	}

	#[test]
	fn test_data_dir_moves_backend_config() {
		let layer = ServerConfigLayer {
			paths: Some(PathsConfigLayer {
				data_dir: Some("/data".to_string()),
			}),
			..Default::default()
		};
		let config = finalize(layer).unwrap();
		assert_eq!(config.backend.config_path, PathBuf::from("/data/rclone.conf"));
	}
}
