// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The backend configuration file on disk.
//!
//! Every edit reads the whole file, applies a [`ConfigDocument`] change and
//! rewrites it through a temp file and rename. Edits are serialized by an
//! async mutex.

use std::path::{Path, PathBuf};

use pooled_core::PoolId;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::descriptor::{chunker_section_name, union_section_name, BackendDescriptor, SynthesisError};
use crate::ini::{ConfigDocument, IniError, Section};

#[derive(Debug, Error)]
pub enum ConfigFileError {
	#[error("backend config I/O error at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("backend config is malformed: {0}")]
	Parse(#[from] IniError),

	#[error(transparent)]
	Synthesis(#[from] SynthesisError),

	#[error("credential encoding failed: {0}")]
	Encode(#[from] serde_json::Error),
}

pub struct BackendConfigFile {
	path: PathBuf,
	lock: Mutex<()>,
}

impl BackendConfigFile {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			lock: Mutex::new(()),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Directory holding the file; service account keys are written here.
	pub fn dir(&self) -> &Path {
		self.path.parent().unwrap_or_else(|| Path::new("."))
	}

	pub async fn load(&self) -> Result<ConfigDocument, ConfigFileError> {
		let _guard = self.lock.lock().await;
		self.read().await
	}

	/// Replace this pool's sections with the descriptor's. A stale chunker
	/// section from an earlier configuration is dropped.
	pub async fn write_descriptor(&self, descriptor: &BackendDescriptor) -> Result<(), ConfigFileError> {
		let sections = descriptor.sections();
		let pool_id = descriptor.pool_id.clone();
		self.edit(move |doc| {
			doc.remove_section(&union_section_name(&pool_id));
			doc.remove_section(&chunker_section_name(&pool_id));
			for section in sections {
				doc.upsert_section(section)?;
			}
			Ok(())
		})
		.await?;
		debug!(pool_id = %descriptor.pool_id, remote = descriptor.serve_remote(), "wrote pool sections");
		Ok(())
	}

	pub async fn remove_pool(&self, pool_id: &PoolId) -> Result<(), ConfigFileError> {
		let union = union_section_name(pool_id);
		let chunker = chunker_section_name(pool_id);
		self.edit(move |doc| {
			doc.remove_section(&union);
			doc.remove_section(&chunker);
			Ok(())
		})
		.await
	}

	pub async fn upsert_section(&self, section: Section) -> Result<(), ConfigFileError> {
		self.edit(move |doc| {
			doc.upsert_section(section)?;
			Ok(())
		})
		.await
	}

	pub async fn remove_section(&self, name: &str) -> Result<(), ConfigFileError> {
		let name = name.to_string();
		self.edit(move |doc| {
			doc.remove_section(&name);
			Ok(())
		})
		.await
	}

	/// Where the service account key for `remote_name` lives.
	pub fn key_file_path(&self, remote_name: &str) -> Result<PathBuf, ConfigFileError> {
		crate::descriptor::validate_identifier(remote_name)?;
		Ok(self.dir().join(format!("{remote_name}.json")))
	}

	/// Write a service account key next to the config file and return its path.
	pub async fn write_key_file(
		&self,
		remote_name: &str,
		key: &serde_json::Value,
	) -> Result<PathBuf, ConfigFileError> {
		let path = self.key_file_path(remote_name)?;
		let json = serde_json::to_string_pretty(key)?;
		write_atomic(&path, json.as_bytes()).await?;
		info!(path = %path.display(), "wrote service account key");
		Ok(path)
	}

	pub async fn remove_key_file(&self, path: &Path) -> Result<(), ConfigFileError> {
		match tokio::fs::remove_file(path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(source) => Err(ConfigFileError::Io {
				path: path.to_path_buf(),
				source,
			}),
		}
	}

	async fn edit<F>(&self, apply: F) -> Result<(), ConfigFileError>
	where
		F: FnOnce(&mut ConfigDocument) -> Result<(), ConfigFileError>,
	{
		let _guard = self.lock.lock().await;
		let mut doc = self.read().await?;
		apply(&mut doc)?;
		write_atomic(&self.path, doc.render().as_bytes()).await
	}

	async fn read(&self) -> Result<ConfigDocument, ConfigFileError> {
		match tokio::fs::read_to_string(&self.path).await {
			Ok(text) => Ok(ConfigDocument::parse(&text)?),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigDocument::new()),
			Err(source) => Err(ConfigFileError::Io {
				path: self.path.clone(),
				source,
			}),
		}
	}
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ConfigFileError> {
	let io_err = |source| ConfigFileError::Io {
		path: path.to_path_buf(),
		source,
	};
	if let Some(parent) = path.parent() {
		tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
	}
	let mut tmp = path.as_os_str().to_owned();
	tmp.push(".tmp");
	let tmp = PathBuf::from(tmp);
	tokio::fs::write(&tmp, contents).await.map_err(io_err)?;
	tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
	Ok(())
}
