// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Filesystem locations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// File name of the persisted state document inside `data_dir`.
pub const STATE_FILE_NAME: &str = "pooled-storage-data.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PathsConfigLayer {
	pub data_dir: Option<String>,
}

impl PathsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.data_dir.is_some() {
			self.data_dir = other.data_dir;
		}
	}

	pub fn finalize(self) -> PathsConfig {
		PathsConfig {
			data_dir: PathBuf::from(self.data_dir.unwrap_or_else(|| "/config".to_string())),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
	pub data_dir: PathBuf,
}

impl PathsConfig {
	pub fn state_file(&self) -> PathBuf {
		self.data_dir.join(STATE_FILE_NAME)
	}
}

impl Default for PathsConfig {
	fn default() -> Self {
		PathsConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_state_file_location() {
		let config = PathsConfigLayer {
			data_dir: Some("/var/lib/pooled".to_string()),
		}
		.finalize();
		assert_eq!(
			config.state_file(),
			PathBuf::from("/var/lib/pooled/pooled-storage-data.json")
		);
	}
}
