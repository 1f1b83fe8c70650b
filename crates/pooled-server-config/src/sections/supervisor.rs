// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process supervision timeouts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SupervisorConfigLayer {
	pub stop_timeout_secs: Option<u64>,
	pub shutdown_timeout_secs: Option<u64>,
}

impl SupervisorConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.stop_timeout_secs.is_some() {
			self.stop_timeout_secs = other.stop_timeout_secs;
		}
		if other.shutdown_timeout_secs.is_some() {
			self.shutdown_timeout_secs = other.shutdown_timeout_secs;
		}
	}

	pub fn finalize(self) -> SupervisorConfig {
		SupervisorConfig {
			stop_timeout_secs: self.stop_timeout_secs.unwrap_or(10),
			shutdown_timeout_secs: self.shutdown_timeout_secs.unwrap_or(30),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupervisorConfig {
	/// Grace period between the termination request and a forced kill.
	pub stop_timeout_secs: u64,
	/// Upper bound on stopping every pool at shutdown.
	pub shutdown_timeout_secs: u64,
}

impl SupervisorConfig {
	pub fn stop_timeout(&self) -> Duration {
		Duration::from_secs(self.stop_timeout_secs)
	}

	pub fn shutdown_timeout(&self) -> Duration {
		Duration::from_secs(self.shutdown_timeout_secs)
	}
}

impl Default for SupervisorConfig {
	fn default() -> Self {
		SupervisorConfigLayer::default().finalize()
	}
}
