// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdError {
	#[error("invalid id: {0}")]
	InvalidUuid(#[from] uuid::Error),
}
