// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background jobs configuration section.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobsConfigLayer {
	pub usage_refresh_enabled: Option<bool>,
	pub usage_refresh_interval_secs: Option<u64>,
}

impl JobsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.usage_refresh_enabled.is_some() {
			self.usage_refresh_enabled = other.usage_refresh_enabled;
		}
		if other.usage_refresh_interval_secs.is_some() {
			self.usage_refresh_interval_secs = other.usage_refresh_interval_secs;
		}
	}

	pub fn finalize(self) -> JobsConfig {
		JobsConfig {
			usage_refresh_enabled: self.usage_refresh_enabled.unwrap_or(true),
			usage_refresh_interval_secs: self.usage_refresh_interval_secs.unwrap_or(300), // 5 minutes
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
	pub usage_refresh_enabled: bool,
	pub usage_refresh_interval_secs: u64,
}

impl Default for JobsConfig {
	fn default() -> Self {
		Self {
			usage_refresh_enabled: true,
			usage_refresh_interval_secs: 300, // 5 minutes
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_layer_finalize_defaults() {
		let config = JobsConfigLayer::default().finalize();
		assert_eq!(config, JobsConfig::default());
	}

	#[test]
	fn test_merge_overwrites() {
		let mut base = JobsConfigLayer {
			usage_refresh_enabled: Some(true),
			usage_refresh_interval_secs: Some(300),
		};
		base.merge(JobsConfigLayer {
			usage_refresh_enabled: Some(false),
			usage_refresh_interval_secs: None,
		});
		assert_eq!(base.usage_refresh_enabled, Some(false));
		assert_eq!(base.usage_refresh_interval_secs, Some(300));
	}

	#[test]
	fn test_serde_roundtrip() {
		let config = JobsConfig {
			usage_refresh_enabled: false,
			usage_refresh_interval_secs: 60,
		};
		let toml_str = toml::to_string(&config).unwrap();
		let parsed: JobsConfig = toml::from_str(&toml_str).unwrap();
		assert_eq!(config, parsed);
	}
}
