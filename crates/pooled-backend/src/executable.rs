// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The external aggregation executable.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use pooled_core::{PoolId, ServeProtocol, UsageSnapshot};
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum BackendError {
	#[error("failed to run {binary}: {source}")]
	Spawn {
		binary: String,
		#[source]
		source: std::io::Error,
	},

	#[error("{command} exited with status {status:?}: {stderr}")]
	Failed {
		command: String,
		status: Option<i32>,
		stderr: String,
	},

	#[error("{command} timed out after {secs}s")]
	Timeout { command: String, secs: u64 },

	#[error("unexpected output from {command}: {message}")]
	Parse { command: String, message: String },
}

/// Tuning flags passed to every serve invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeOptions {
	pub vfs_cache_mode: String,
	pub vfs_cache_max_age: String,
	pub buffer_size: String,
	pub log_level: String,
}

impl Default for ServeOptions {
	fn default() -> Self {
		Self {
			vfs_cache_mode: "full".to_string(),
			vfs_cache_max_age: "1h".to_string(),
			buffer_size: "64M".to_string(),
			log_level: "INFO".to_string(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeRequest {
	pub pool_id: PoolId,
	pub protocol: ServeProtocol,
	/// Section name of the remote to serve, without the trailing colon.
	pub remote: String,
	pub port: u16,
}

#[async_trait]
pub trait BackendExecutable: Send + Sync {
	/// Command that serves `request.remote` on `request.port`. Not yet spawned.
	fn serve_command(&self, request: &ServeRequest) -> Command;

	/// Capacity of a configured remote.
	async fn about(&self, remote: &str) -> Result<UsageSnapshot, BackendError>;

	/// First line of the executable's version output.
	async fn version(&self) -> Result<String, BackendError>;
}

/// rclone-compatible executable.
#[derive(Debug, Clone)]
pub struct RcloneExecutable {
	binary: PathBuf,
	config_path: PathBuf,
	options: ServeOptions,
	probe_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct AboutOutput {
	total: Option<u64>,
	used: Option<u64>,
	free: Option<u64>,
}

impl RcloneExecutable {
	pub fn new(binary: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
		Self {
			binary: binary.into(),
			config_path: config_path.into(),
			options: ServeOptions::default(),
			probe_timeout: Duration::from_secs(60),
		}
	}

	pub fn with_options(mut self, options: ServeOptions) -> Self {
		self.options = options;
		self
	}

	pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
		self.probe_timeout = timeout;
		self
	}

	fn binary_name(&self) -> String {
		self.binary.display().to_string()
	}

	async fn run(&self, args: &[&str]) -> Result<String, BackendError> {
		let command = format!("{} {}", self.binary_name(), args.join(" "));
		debug!(%command, "running backend command");

		let output = Command::new(&self.binary)
			.args(args)
			.arg("--config")
			.arg(&self.config_path)
			.stdin(Stdio::null())
			.kill_on_drop(true)
			.output();

		let output = tokio::time::timeout(self.probe_timeout, output)
			.await
			.map_err(|_| BackendError::Timeout {
				command: command.clone(),
				secs: self.probe_timeout.as_secs(),
			})?
			.map_err(|source| BackendError::Spawn {
				binary: self.binary_name(),
				source,
			})?;

		if !output.status.success() {
			return Err(BackendError::Failed {
				command,
				status: output.status.code(),
				stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
			});
		}

		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	}
}

#[async_trait]
impl BackendExecutable for RcloneExecutable {
	fn serve_command(&self, request: &ServeRequest) -> Command {
		let mut cmd = Command::new(&self.binary);
		cmd.arg("serve")
			.arg(request.protocol.as_str())
			.arg(format!("{}:", request.remote))
			.arg("--addr")
			.arg(format!(":{}", request.port))
			.arg("--config")
			.arg(&self.config_path)
			.arg("--vfs-cache-mode")
			.arg(&self.options.vfs_cache_mode)
			.arg("--vfs-cache-max-age")
			.arg(&self.options.vfs_cache_max_age)
			.arg("--buffer-size")
			.arg(&self.options.buffer_size)
			.arg("--log-level")
			.arg(&self.options.log_level);
		cmd
	}

	#[instrument(skip(self))]
	async fn about(&self, remote: &str) -> Result<UsageSnapshot, BackendError> {
		let target = format!("{remote}:");
		let stdout = self.run(&["about", &target, "--json"]).await?;
		let parsed: AboutOutput =
			serde_json::from_str(stdout.trim()).map_err(|e| BackendError::Parse {
				command: format!("about {target}"),
				message: e.to_string(),
			})?;
		Ok(UsageSnapshot {
			total: parsed.total,
			used: parsed.used,
			free: parsed.free,
			error: None,
		})
	}

	async fn version(&self) -> Result<String, BackendError> {
		let stdout = self.run(&["version"]).await?;
		stdout
			.lines()
			.map(str::trim)
			.find(|l| !l.is_empty())
			.map(str::to_string)
			.ok_or_else(|| BackendError::Parse {
				command: "version".to_string(),
				message: "empty output".to_string(),
			})
	}
}

#[cfg(all(test, unix))]
mod tests {
	use super::*;
	use std::os::unix::fs::PermissionsExt;
	use tempfile::TempDir;

	fn script(dir: &TempDir, body: &str) -> PathBuf {
		let path = dir.path().join("fake-rclone");
		std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
		std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
		path
	}

	#[test]
	fn serve_command_arguments() {
		let exe = RcloneExecutable::new("rclone", "/config/rclone.conf");
		let cmd = exe.serve_command(&ServeRequest {
			pool_id: PoolId::new(),
			protocol: ServeProtocol::Webdav,
			remote: "pool_abcd1234".to_string(),
			port: 20060,
		});
		let args: Vec<String> = cmd
			.as_std()
			.get_args()
			.map(|a| a.to_string_lossy().into_owned())
			.collect();
		assert_eq!(
			args,
			vec![
				"serve",
				"webdav",
				"pool_abcd1234:",
				"--addr",
				":20060",
				"--config",
				"/config/rclone.conf",
				"--vfs-cache-mode",
				"full",
				"--vfs-cache-max-age",
				"1h",
				"--buffer-size",
				"64M",
				"--log-level",
				"INFO",
			]
		);
	}

	#[tokio::test]
	async fn about_parses_json() {
		let dir = TempDir::new().unwrap();
		let bin = script(&dir, r#"echo '{"total":1000,"used":250,"free":750,"trashed":0}'"#);
		let exe = RcloneExecutable::new(bin, dir.path().join("rclone.conf"));

		let usage = exe.about("google_abcd1234").await.unwrap();
		assert_eq!(usage.total, Some(1000));
		assert_eq!(usage.used, Some(250));
		assert_eq!(usage.free, Some(750));
		assert!(usage.error.is_none());
	}

	#[tokio::test]
	async fn about_reports_failure_with_stderr() {
		let dir = TempDir::new().unwrap();
		let bin = script(&dir, "echo 'section not found' >&2; exit 3");
		let exe = RcloneExecutable::new(bin, dir.path().join("rclone.conf"));

		match exe.about("missing").await {
			Err(BackendError::Failed { status, .. }) => assert_eq!(status, Some(3)),
			other => panic!("expected failure, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn version_returns_first_line() {
		let dir = TempDir::new().unwrap();
		let bin = script(&dir, "echo 'rclone v1.66.0'; echo '- os/version: linux'");
		let exe = RcloneExecutable::new(bin, dir.path().join("rclone.conf"));
		assert_eq!(exe.version().await.unwrap(), "rclone v1.66.0");
	}

	#[tokio::test]
	async fn missing_binary_is_a_spawn_error() {
		let exe = RcloneExecutable::new("/nonexistent/rclone", "/tmp/rclone.conf");
		assert!(matches!(
			exe.version().await,
			Err(BackendError::Spawn { .. })
		));
	}
}
