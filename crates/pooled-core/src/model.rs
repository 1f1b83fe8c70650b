// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Account and pool records.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, PoolId};

/// Cloud storage provider behind an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
	Google,
	Microsoft,
}

impl ProviderType {
	pub fn as_str(&self) -> &'static str {
		match self {
			ProviderType::Google => "google",
			ProviderType::Microsoft => "microsoft",
		}
	}

	/// Storage type name understood by the backend executable.
	pub fn backend_type(&self) -> &'static str {
		match self {
			ProviderType::Google => "drive",
			ProviderType::Microsoft => "onedrive",
		}
	}
}

impl fmt::Display for ProviderType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ProviderType {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"google" => Ok(ProviderType::Google),
			"microsoft" => Ok(ProviderType::Microsoft),
			other => Err(format!("unsupported provider type: {other}")),
		}
	}
}

/// Where an account's credential lives. Never the secret itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CredentialRef {
	/// Token stored inside the named backend configuration section.
	Section { name: String },
	/// Service account key written next to the backend configuration.
	ServiceAccountFile { path: PathBuf },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMethod {
	#[serde(rename = "oauth")]
	OAuth,
	#[serde(rename = "serviceAccount")]
	ServiceAccount,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
	#[default]
	Active,
	Error,
}

/// Capacity figures reported by the backend executable, in bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub used: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub free: Option<u64>,
	/// Set when the last probe failed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl UsageSnapshot {
	pub fn failed(message: impl Into<String>) -> Self {
		Self {
			error: Some(message.into()),
			..Default::default()
		}
	}

	/// Free space, derived from total and used when not reported directly.
	pub fn effective_free(&self) -> Option<u64> {
		self.free.or_else(|| match (self.total, self.used) {
			(Some(total), Some(used)) => Some(total.saturating_sub(used)),
			_ => None,
		})
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
	pub id: AccountId,
	pub name: String,
	#[serde(rename = "type")]
	pub provider: ProviderType,
	pub credential_ref: CredentialRef,
	/// Backend identifier of this account's remote.
	pub remote_name: String,
	pub auth_method: AuthMethod,
	#[serde(default)]
	pub usage: Option<UsageSnapshot>,
	#[serde(default)]
	pub status: AccountStatus,
	pub added_at: DateTime<Utc>,
	#[serde(default)]
	pub last_refreshed: Option<DateTime<Utc>>,
}

/// How member accounts are combined by the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregationStrategy {
	Spread,
	#[default]
	MostFreeSpace,
	FirstAvailable,
	Mirror,
}

impl AggregationStrategy {
	pub fn as_str(&self) -> &'static str {
		match self {
			AggregationStrategy::Spread => "spread",
			AggregationStrategy::MostFreeSpace => "most-free-space",
			AggregationStrategy::FirstAvailable => "first-available",
			AggregationStrategy::Mirror => "mirror",
		}
	}
}

impl FromStr for AggregationStrategy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"spread" => Ok(AggregationStrategy::Spread),
			"most-free-space" => Ok(AggregationStrategy::MostFreeSpace),
			"first-available" => Ok(AggregationStrategy::FirstAvailable),
			"mirror" => Ok(AggregationStrategy::Mirror),
			other => Err(format!("unknown aggregation strategy: {other}")),
		}
	}
}

/// Optional splitting of large objects before storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Chunking {
	#[default]
	Disabled,
	Enabled { chunk_size_bytes: u64 },
}

impl Chunking {
	pub fn chunk_size(&self) -> Option<u64> {
		match self {
			Chunking::Disabled => None,
			Chunking::Enabled { chunk_size_bytes } => Some(*chunk_size_bytes),
		}
	}
}

/// Wire protocol a pool is served over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServeProtocol {
	#[default]
	Webdav,
	Ftp,
	Sftp,
	Http,
	Dlna,
	S3,
}

impl ServeProtocol {
	pub fn as_str(&self) -> &'static str {
		match self {
			ServeProtocol::Webdav => "webdav",
			ServeProtocol::Ftp => "ftp",
			ServeProtocol::Sftp => "sftp",
			ServeProtocol::Http => "http",
			ServeProtocol::Dlna => "dlna",
			ServeProtocol::S3 => "s3",
		}
	}
}

impl fmt::Display for ServeProtocol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Runtime state of a pool's backend process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
	#[default]
	Stopped,
	Starting,
	Running,
	Stopping,
	Crashed,
}

impl LifecycleState {
	pub fn as_str(&self) -> &'static str {
		match self {
			LifecycleState::Stopped => "stopped",
			LifecycleState::Starting => "starting",
			LifecycleState::Running => "running",
			LifecycleState::Stopping => "stopping",
			LifecycleState::Crashed => "crashed",
		}
	}

	/// Whether resources (port, process) may still be held in this state.
	pub fn holds_resources(&self) -> bool {
		matches!(
			self,
			LifecycleState::Starting | LifecycleState::Running | LifecycleState::Stopping
		)
	}
}

impl fmt::Display for LifecycleState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Coarse status shown to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
	Active,
	Inactive,
}

impl From<LifecycleState> for PoolStatus {
	fn from(state: LifecycleState) -> Self {
		match state {
			LifecycleState::Running => PoolStatus::Active,
			_ => PoolStatus::Inactive,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
	pub id: PoolId,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default)]
	pub account_ids: Vec<AccountId>,
	#[serde(default)]
	pub strategy: AggregationStrategy,
	#[serde(default)]
	pub chunking: Chunking,
	#[serde(default)]
	pub serve_protocol: ServeProtocol,
	#[serde(default)]
	pub state: LifecycleState,
	#[serde(default)]
	pub assigned_port: Option<u16>,
	#[serde(default)]
	pub remote_name: Option<String>,
	pub created_at: DateTime<Utc>,
	#[serde(default)]
	pub updated_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub started_at: Option<DateTime<Utc>>,
}

impl Pool {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			id: PoolId::new(),
			name: name.into(),
			description: None,
			account_ids: Vec::new(),
			strategy: AggregationStrategy::default(),
			chunking: Chunking::default(),
			serve_protocol: ServeProtocol::default(),
			state: LifecycleState::Stopped,
			assigned_port: None,
			remote_name: None,
			created_at: Utc::now(),
			updated_at: None,
			started_at: None,
		}
	}

	pub fn status(&self) -> PoolStatus {
		self.state.into()
	}

	pub fn has_account(&self, account_id: &AccountId) -> bool {
		self.account_ids.contains(account_id)
	}

	/// Drop runtime fields, leaving the pool stopped.
	pub fn mark_stopped(&mut self) {
		self.state = LifecycleState::Stopped;
		self.assigned_port = None;
		self.remote_name = None;
		self.started_at = None;
	}

	pub fn touch(&mut self) {
		self.updated_at = Some(Utc::now());
	}
}
