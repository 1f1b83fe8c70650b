// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The persisted document holding every pool, account and mount.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, PoolId};
use crate::model::{Account, Pool, ServeProtocol};

/// Endpoint of a running pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountRecord {
	pub pool_id: PoolId,
	pub protocol: ServeProtocol,
	pub port: u16,
	pub url: String,
	pub started_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolsDocument {
	#[serde(default)]
	pub pools: Vec<Pool>,
	#[serde(default)]
	pub accounts: Vec<Account>,
	#[serde(default)]
	pub mounts: Vec<MountRecord>,
}

impl PoolsDocument {
	pub fn pool(&self, id: &PoolId) -> Option<&Pool> {
		self.pools.iter().find(|p| &p.id == id)
	}

	pub fn pool_mut(&mut self, id: &PoolId) -> Option<&mut Pool> {
		self.pools.iter_mut().find(|p| &p.id == id)
	}

	pub fn account(&self, id: &AccountId) -> Option<&Account> {
		self.accounts.iter().find(|a| &a.id == id)
	}

	pub fn account_mut(&mut self, id: &AccountId) -> Option<&mut Account> {
		self.accounts.iter_mut().find(|a| &a.id == id)
	}

	/// Member accounts of a pool in membership order. Dangling ids are skipped.
	pub fn members_of(&self, pool: &Pool) -> Vec<Account> {
		pool.account_ids
			.iter()
			.filter_map(|id| self.account(id).cloned())
			.collect()
	}

	pub fn mount(&self, pool_id: &PoolId) -> Option<&MountRecord> {
		self.mounts.iter().find(|m| &m.pool_id == pool_id)
	}

	pub fn remove_mount(&mut self, pool_id: &PoolId) {
		self.mounts.retain(|m| &m.pool_id != pool_id);
	}

	/// Replace any existing mount for the same pool.
	pub fn put_mount(&mut self, mount: MountRecord) {
		self.remove_mount(&mount.pool_id);
		self.mounts.push(mount);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{AuthMethod, CredentialRef, ProviderType};

	fn account(name: &str) -> Account {
		Account {
			id: AccountId::new(),
			name: name.to_string(),
			provider: ProviderType::Google,
			credential_ref: CredentialRef::Section {
				name: format!("google_{name}"),
			},
			remote_name: format!("google_{name}"),
			auth_method: AuthMethod::OAuth,
			usage: None,
			status: Default::default(),
			added_at: Utc::now(),
			last_refreshed: None,
		}
	}

	#[test]
	fn members_follow_membership_order() {
		let a = account("a");
		let b = account("b");
		let mut pool = Pool::new("Media");
		pool.account_ids = vec![b.id.clone(), AccountId::new(), a.id.clone()];

		let doc = PoolsDocument {
			pools: vec![pool.clone()],
			accounts: vec![a.clone(), b.clone()],
			mounts: Vec::new(),
		};

		let members = doc.members_of(&pool);
		assert_eq!(members.len(), 2);
		assert_eq!(members[0].id, b.id);
		assert_eq!(members[1].id, a.id);
	}

	#[test]
	fn put_mount_replaces_existing() {
		let pool_id = PoolId::new();
		let mut doc = PoolsDocument::default();
		for port in [20060, 20061] {
			doc.put_mount(MountRecord {
				pool_id: pool_id.clone(),
				protocol: ServeProtocol::Webdav,
				port,
				url: format!("webdav://127.0.0.1:{port}"),
				started_at: Utc::now(),
			});
		}
		assert_eq!(doc.mounts.len(), 1);
		assert_eq!(doc.mount(&pool_id).map(|m| m.port), Some(20061));
	}

	#[test]
	fn empty_document_parses() {
		let doc: PoolsDocument = serde_json::from_str("{}").unwrap();
		assert!(doc.pools.is_empty());
		assert!(doc.accounts.is_empty());
		assert!(doc.mounts.is_empty());
	}
}
