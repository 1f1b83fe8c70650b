// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Port range handed out to served pools.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PortsConfigLayer {
	pub base: Option<u16>,
	pub range: Option<u16>,
}

impl PortsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.base.is_some() {
			self.base = other.base;
		}
		if other.range.is_some() {
			self.range = other.range;
		}
	}

	pub fn finalize(self) -> Result<PortsConfig, ConfigError> {
		let config = PortsConfig {
			base: self.base.unwrap_or(20060),
			range: self.range.unwrap_or(40),
		};
		config.validate()?;
		Ok(config)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortsConfig {
	pub base: u16,
	pub range: u16,
}

impl PortsConfig {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.range == 0 {
			return Err(ConfigError::Validation(
				"ports.range must be greater than zero".to_string(),
			));
		}
		if u32::from(self.base) + u32::from(self.range) > 65536 {
			return Err(ConfigError::Validation(format!(
				"ports.base + ports.range exceeds 65535 ({} + {})",
				self.base, self.range
			)));
		}
		Ok(())
	}

	/// Last port of the range, inclusive.
	pub fn last(&self) -> u16 {
		self.base + (self.range - 1)
	}
}

impl Default for PortsConfig {
	fn default() -> Self {
		Self {
			base: 20060,
			range: 40,
		}
	}
}
