// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration produced by a single source.

use serde::{Deserialize, Serialize};

use crate::sections::{
	BackendConfigLayer, HttpConfigLayer, JobsConfigLayer, LoggingConfigLayer, PathsConfigLayer,
	PortsConfigLayer, SupervisorConfigLayer,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfigLayer {
	pub http: Option<HttpConfigLayer>,
	pub ports: Option<PortsConfigLayer>,
	pub backend: Option<BackendConfigLayer>,
	pub supervisor: Option<SupervisorConfigLayer>,
	pub jobs: Option<JobsConfigLayer>,
	pub paths: Option<PathsConfigLayer>,
	pub logging: Option<LoggingConfigLayer>,
}

macro_rules! merge_section {
	($self:ident, $other:ident, $field:ident) => {
		if let Some(overlay) = $other.$field {
			$self.$field.get_or_insert_with(Default::default).merge(overlay);
		}
	};
}

impl ServerConfigLayer {
	/// Overlay `other` on top of `self`; fields set in `other` win.
	pub fn merge(&mut self, other: Self) {
		merge_section!(self, other, http);
		merge_section!(self, other, ports);
		merge_section!(self, other, backend);
		merge_section!(self, other, supervisor);
		merge_section!(self, other, jobs);
		merge_section!(self, other, paths);
		merge_section!(self, other, logging);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_fills_missing_sections() {
		let mut base = ServerConfigLayer::default();
		let overlay = ServerConfigLayer {
			ports: Some(PortsConfigLayer {
				base: Some(30000),
				range: None,
			}),
			..Default::default()
		};
		base.merge(overlay);
		assert_eq!(base.ports.unwrap().base, Some(30000));
	}

	#[test]
	fn test_merge_is_field_by_field() {
		let mut base = ServerConfigLayer {
			http: Some(HttpConfigLayer {
				host: Some("127.0.0.1".to_string()),
				port: Some(8080),
				public_host: None,
			}),
			..Default::default()
		};
		let overlay = ServerConfigLayer {
			http: Some(HttpConfigLayer {
				host: None,
				port: Some(9090),
				public_host: Some("nas.local".to_string()),
			}),
			..Default::default()
		};
		base.merge(overlay);
		let http = base.http.unwrap();
		assert_eq!(http.host.as_deref(), Some("127.0.0.1"));
		assert_eq!(http.port, Some(9090));
		assert_eq!(http.public_host.as_deref(), Some("nas.local"));
	}

	#[test]
	fn test_parse_full_toml() {
		let layer: ServerConfigLayer = toml::from_str(
			r#"
[http]
port = 8080

[ports]
base = 21000
range = 10

[backend]
binary = "/usr/local/bin/rclone"

[logging]
format = "json"
"#,
		)
		.unwrap();
		assert_eq!(layer.http.unwrap().port, Some(8080));
		assert_eq!(layer.ports.unwrap().range, Some(10));
		assert_eq!(
			layer.backend.unwrap().binary.as_deref(),
			Some("/usr/local/bin/rclone")
		);
		assert!(layer.jobs.is_none());
	}
}
