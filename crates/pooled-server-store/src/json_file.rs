// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pooled_core::PoolsDocument;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::StateStore;

/// Single JSON file, rewritten in full through a temp file and rename.
pub struct JsonFileStore {
	path: PathBuf,
}

impl JsonFileStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn tmp_path(&self) -> PathBuf {
		let mut tmp = self.path.as_os_str().to_owned();
		tmp.push(".tmp");
		PathBuf::from(tmp)
	}

	fn io_error(&self, source: std::io::Error) -> StoreError {
		StoreError::Io {
			path: self.path.clone(),
			source,
		}
	}
}

#[async_trait]
impl StateStore for JsonFileStore {
	async fn load(&self) -> Result<PoolsDocument, StoreError> {
		let content = match tokio::fs::read_to_string(&self.path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				info!(path = %self.path.display(), "no state file, starting empty");
				return Ok(PoolsDocument::default());
			}
			Err(e) => return Err(self.io_error(e)),
		};

		let document: PoolsDocument =
			serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
				path: self.path.clone(),
				source,
			})?;

		debug!(
			path = %self.path.display(),
			pools = document.pools.len(),
			accounts = document.accounts.len(),
			"loaded state document"
		);
		Ok(document)
	}

	async fn save(&self, document: &PoolsDocument) -> Result<(), StoreError> {
		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent)
				.await
				.map_err(|e| self.io_error(e))?;
		}

		let tmp_path = self.tmp_path();
		let json = serde_json::to_string_pretty(document)?;

		tokio::fs::write(&tmp_path, &json)
			.await
			.map_err(|e| self.io_error(e))?;
		tokio::fs::rename(&tmp_path, &self.path)
			.await
			.map_err(|e| self.io_error(e))?;

		debug!(
			path = %self.path.display(),
			pools = document.pools.len(),
			"saved state document"
		);
		Ok(())
	}

	fn describe(&self) -> String {
		self.path.display().to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pooled_core::{LifecycleState, Pool};
	use tempfile::TempDir;

	fn create_test_store() -> (JsonFileStore, TempDir) {
		let tmp = TempDir::new().unwrap();
		let store = JsonFileStore::new(tmp.path().join("pooled-storage-data.json"));
		(store, tmp)
	}

	#[tokio::test]
	async fn test_missing_file_is_empty() {
		let (store, _tmp) = create_test_store();
		let doc = store.load().await.unwrap();
		assert_eq!(doc, PoolsDocument::default());
	}

	#[tokio::test]
	async fn test_save_and_load() {
		let (store, _tmp) = create_test_store();
		let mut pool = Pool::new("Media");
		pool.state = LifecycleState::Running;
		pool.assigned_port = Some(20061);
		let doc = PoolsDocument {
			pools: vec![pool.clone()],
			..Default::default()
		};

		store.save(&doc).await.unwrap();
		let loaded = store.load().await.unwrap();

		assert_eq!(loaded.pools.len(), 1);
		assert_eq!(loaded.pools[0].id, pool.id);
		assert_eq!(loaded.pools[0].assigned_port, Some(20061));
		assert!(!store.tmp_path().exists());
	}

	#[tokio::test]
	async fn test_persisted_json_uses_camel_case() {
		let (store, _tmp) = create_test_store();
		let mut pool = Pool::new("Media");
		pool.assigned_port = Some(20060);
		store
			.save(&PoolsDocument {
				pools: vec![pool],
				..Default::default()
			})
			.await
			.unwrap();

		let raw = std::fs::read_to_string(store.path()).unwrap();
		let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
		assert_eq!(value["pools"][0]["assignedPort"], 20060);
		assert!(value["accounts"].as_array().unwrap().is_empty());
		assert!(value["mounts"].as_array().unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_corrupt_file_is_reported() {
		let (store, _tmp) = create_test_store();
		std::fs::write(store.path(), "{ not json").unwrap();
		assert!(matches!(
			store.load().await,
			Err(StoreError::Corrupt { .. })
		));
	}

	#[tokio::test]
	async fn test_creates_parent_directory() {
		let tmp = TempDir::new().unwrap();
		let store = JsonFileStore::new(tmp.path().join("nested/dir/state.json"));
		store.save(&PoolsDocument::default()).await.unwrap();
		assert!(store.path().exists());
	}
}
