// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP listener configuration section.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HttpConfigLayer {
	pub host: Option<String>,
	pub port: Option<u16>,
	/// Host name clients use to reach served pools.
	pub public_host: Option<String>,
}

impl HttpConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.host.is_some() {
			self.host = other.host;
		}
		if other.port.is_some() {
			self.port = other.port;
		}
		if other.public_host.is_some() {
			self.public_host = other.public_host;
		}
	}

	pub fn finalize(self) -> HttpConfig {
		let defaults = HttpConfig::default();
		HttpConfig {
			host: self.host.unwrap_or(defaults.host),
			port: self.port.unwrap_or(defaults.port),
			public_host: self.public_host.unwrap_or(defaults.public_host),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
	pub host: String,
	pub port: u16,
	pub public_host: String,
}

impl Default for HttpConfig {
	fn default() -> Self {
		Self {
			host: "0.0.0.0".to_string(),
			port: 20050,
			public_host: "127.0.0.1".to_string(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_values() {
		let config = HttpConfigLayer::default().finalize();
		assert_eq!(config.host, "0.0.0.0");
		assert_eq!(config.port, 20050);
		assert_eq!(config.public_host, "127.0.0.1");
	}

	#[test]
	fn test_deserialize_layer_partial() {
		let layer: HttpConfigLayer = toml::from_str("port = 8081").unwrap();
		assert_eq!(layer.port, Some(8081));
		assert!(layer.host.is_none());
	}
}
