// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Events pushed to observers.

use serde::{Deserialize, Serialize};

use crate::document::{MountRecord, PoolsDocument};
use crate::ids::{AccountId, PoolId};
use crate::model::{Account, Pool};

/// A state change, serialized as `{"type": "...", ...payload}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PoolEvent {
	/// Full snapshot, always the first message a new observer receives.
	InitialData { data: PoolsDocument },
	PoolCreated { pool: Pool },
	PoolUpdated { pool: Pool },
	PoolDeleted { pool_id: PoolId },
	PoolStarted { pool: Pool, mount: MountRecord },
	PoolStopped { pool_id: PoolId },
	PoolCrashed {
		pool_id: PoolId,
		exit_code: Option<i32>,
		output: Vec<String>,
	},
	PoolLog { pool_id: PoolId, message: String },
	PoolError { pool_id: PoolId, message: String },
	AccountAdded { account: Account },
	AccountDeleted { account_id: AccountId },
	AccountRefreshed { account: Account },
	PoolAccountAdded { pool_id: PoolId, account_id: AccountId },
	PoolAccountRemoved { pool_id: PoolId, account_id: AccountId },
	StatsUpdated { accounts: Vec<Account> },
}

impl PoolEvent {
	pub fn kind(&self) -> &'static str {
		match self {
			PoolEvent::InitialData { .. } => "initial_data",
			PoolEvent::PoolCreated { .. } => "pool_created",
			PoolEvent::PoolUpdated { .. } => "pool_updated",
			PoolEvent::PoolDeleted { .. } => "pool_deleted",
			PoolEvent::PoolStarted { .. } => "pool_started",
			PoolEvent::PoolStopped { .. } => "pool_stopped",
			PoolEvent::PoolCrashed { .. } => "pool_crashed",
			PoolEvent::PoolLog { .. } => "pool_log",
			PoolEvent::PoolError { .. } => "pool_error",
			PoolEvent::AccountAdded { .. } => "account_added",
			PoolEvent::AccountDeleted { .. } => "account_deleted",
			PoolEvent::AccountRefreshed { .. } => "account_refreshed",
			PoolEvent::PoolAccountAdded { .. } => "pool_account_added",
			PoolEvent::PoolAccountRemoved { .. } => "pool_account_removed",
			PoolEvent::StatsUpdated { .. } => "stats_updated",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn type_tag_matches_kind() {
		let events = vec![
			PoolEvent::InitialData {
				data: PoolsDocument::default(),
			},
			PoolEvent::PoolDeleted {
				pool_id: PoolId::new(),
			},
			PoolEvent::PoolLog {
				pool_id: PoolId::new(),
				message: "serving".to_string(),
			},
			PoolEvent::PoolAccountRemoved {
				pool_id: PoolId::new(),
				account_id: AccountId::new(),
			},
			PoolEvent::StatsUpdated { accounts: vec![] },
		];

		for event in events {
			let json = serde_json::to_value(&event).unwrap();
			assert_eq!(json["type"], event.kind());
		}
	}

	#[test]
	fn payload_fields_are_camel_case() {
		let pool_id = PoolId::new();
		let account_id = AccountId::new();
		let json = serde_json::to_value(PoolEvent::PoolAccountAdded {
			pool_id: pool_id.clone(),
			account_id: account_id.clone(),
		})
		.unwrap();
		assert_eq!(json["poolId"], pool_id.as_str());
		assert_eq!(json["accountId"], account_id.as_str());
	}

	#[test]
	fn crash_event_carries_output() {
		let json = serde_json::to_value(PoolEvent::PoolCrashed {
			pool_id: PoolId::new(),
			exit_code: Some(3),
			output: vec!["boom".to_string()],
		})
		.unwrap();
		assert_eq!(json["type"], "pool_crashed");
		assert_eq!(json["exitCode"], 3);
		assert_eq!(json["output"][0], "boom");
	}
}
