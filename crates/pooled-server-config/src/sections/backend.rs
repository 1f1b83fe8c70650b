// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Backend executable configuration section.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackendConfigLayer {
	pub binary: Option<String>,
	pub config_path: Option<String>,
	pub vfs_cache_mode: Option<String>,
	pub vfs_cache_max_age: Option<String>,
	pub buffer_size: Option<String>,
	pub log_level: Option<String>,
}

impl BackendConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.binary.is_some() {
			self.binary = other.binary;
		}
		if other.config_path.is_some() {
			self.config_path = other.config_path;
		}
		if other.vfs_cache_mode.is_some() {
			self.vfs_cache_mode = other.vfs_cache_mode;
		}
		if other.vfs_cache_max_age.is_some() {
			self.vfs_cache_max_age = other.vfs_cache_max_age;
		}
		if other.buffer_size.is_some() {
			self.buffer_size = other.buffer_size;
		}
		if other.log_level.is_some() {
			self.log_level = other.log_level;
		}
	}

	/// The config file defaults to `rclone.conf` inside `data_dir`.
	pub fn finalize(self, data_dir: &Path) -> BackendConfig {
		BackendConfig {
			binary: PathBuf::from(self.binary.unwrap_or_else(|| "rclone".to_string())),
			config_path: self
				.config_path
				.map(PathBuf::from)
				.unwrap_or_else(|| data_dir.join("rclone.conf")),
			vfs_cache_mode: self.vfs_cache_mode.unwrap_or_else(|| "full".to_string()),
			vfs_cache_max_age: self.vfs_cache_max_age.unwrap_or_else(|| "1h".to_string()),
			buffer_size: self.buffer_size.unwrap_or_else(|| "64M".to_string()),
			log_level: self.log_level.unwrap_or_else(|| "INFO".to_string()),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
	pub binary: PathBuf,
	pub config_path: PathBuf,
	pub vfs_cache_mode: String,
	pub vfs_cache_max_age: String,
	pub buffer_size: String,
	pub log_level: String,
}

impl Default for BackendConfig {
	fn default() -> Self {
		BackendConfigLayer::default().finalize(Path::new("/config"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_config_path_follows_data_dir() {
		let config = BackendConfigLayer::default().finalize(Path::new("/srv/pooled"));
		assert_eq!(config.config_path, PathBuf::from("/srv/pooled/rclone.conf"));
		assert_eq!(config.binary, PathBuf::from("rclone"));
		assert_eq!(config.buffer_size, "64M");
	}

	#[test]
	fn test_explicit_config_path_wins() {
		let layer = BackendConfigLayer {
			config_path: Some("/etc/rclone/rclone.conf".to_string()),
			..Default::default()
		};
		let config = layer.finalize(Path::new("/config"));
		assert_eq!(config.config_path, PathBuf::from("/etc/rclone/rclone.conf"));
	}
}
