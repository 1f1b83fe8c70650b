// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable storage for the pools document.

pub mod error;
pub mod json_file;

pub use error::StoreError;
pub use json_file::JsonFileStore;

use async_trait::async_trait;
use pooled_core::PoolsDocument;

/// Whole-document persistence.
///
/// Callers serialize their own writes; implementations only guarantee that a
/// completed `save` is durable and that a failed one leaves the previous
/// document intact.
#[async_trait]
pub trait StateStore: Send + Sync {
	/// Load the persisted document. A store that has never been written
	/// returns an empty document.
	async fn load(&self) -> Result<PoolsDocument, StoreError>;

	async fn save(&self, document: &PoolsDocument) -> Result<(), StoreError>;

	fn describe(&self) -> String;
}
