// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("state store I/O error at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("state document at {path} is corrupt: {source}")]
	Corrupt {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("failed to serialize state document: {0}")]
	Serialize(#[from] serde_json::Error),

	#[error("state store unavailable: {0}")]
	Unavailable(String),
}
