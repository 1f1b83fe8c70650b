// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Port leasing for served pools.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pooled_core::PoolId;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::PortError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortLease {
	pub port: u16,
	pub pool_id: PoolId,
	pub leased_at: DateTime<Utc>,
}

/// Hands out ports from `[base, base + range)`, lowest first.
///
/// At most one lease exists per port and per pool.
pub struct PortAllocator {
	base: u16,
	range: u16,
	leases: Mutex<BTreeMap<u16, PortLease>>,
}

impl PortAllocator {
	/// `range` must be non-zero and `base + range` must not pass 65536; the
	/// server config enforces both.
	pub fn new(base: u16, range: u16) -> Self {
		Self {
			base,
			range,
			leases: Mutex::new(BTreeMap::new()),
		}
	}

	pub fn first(&self) -> u16 {
		self.base
	}

	pub fn last(&self) -> u16 {
		let last = u32::from(self.base) + u32::from(self.range.max(1)) - 1;
		u16::try_from(last).unwrap_or(u16::MAX)
	}

	pub fn capacity(&self) -> usize {
		usize::from(self.range)
	}

	pub async fn allocate(&self, pool_id: &PoolId) -> Result<PortLease, PortError> {
		let mut leases = self.leases.lock().await;

		if let Some(existing) = leases.values().find(|l| &l.pool_id == pool_id) {
			return Err(PortError::PoolAlreadyLeased {
				pool_id: pool_id.clone(),
				port: existing.port,
			});
		}

		let port = (self.first()..=self.last())
			.take(self.capacity())
			.find(|p| !leases.contains_key(p))
			.ok_or(PortError::Exhausted {
				first: self.first(),
				last: self.last(),
			})?;

		let lease = PortLease {
			port,
			pool_id: pool_id.clone(),
			leased_at: Utc::now(),
		};
		leases.insert(port, lease.clone());
		debug!(pool_id = %pool_id, port, "leased port");
		Ok(lease)
	}

	/// Free `port`. Releasing a free port is a no-op.
	pub async fn release(&self, port: u16) -> Option<PortLease> {
		let released = self.leases.lock().await.remove(&port);
		if let Some(lease) = &released {
			debug!(pool_id = %lease.pool_id, port, "released port");
		}
		released
	}

	pub async fn lease_for(&self, pool_id: &PoolId) -> Option<PortLease> {
		self.leases
			.lock()
			.await
			.values()
			.find(|l| &l.pool_id == pool_id)
			.cloned()
	}

	pub async fn leases(&self) -> Vec<PortLease> {
		self.leases.lock().await.values().cloned().collect()
	}

	pub async fn release_all(&self) {
		self.leases.lock().await.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::collections::HashSet;
	use std::sync::Arc;

	#[tokio::test]
	async fn allocates_lowest_free_port() {
		let ports = PortAllocator::new(20060, 40);
		let a = ports.allocate(&PoolId::new()).await.unwrap();
		let b = ports.allocate(&PoolId::new()).await.unwrap();
		assert_eq!((a.port, b.port), (20060, 20061));

		ports.release(a.port).await;
		let c = ports.allocate(&PoolId::new()).await.unwrap();
		assert_eq!(c.port, 20060);
	}

	#[tokio::test]
	async fn one_lease_per_pool() {
		let ports = PortAllocator::new(20060, 40);
		let pool = PoolId::new();
		ports.allocate(&pool).await.unwrap();
		assert_eq!(
			ports.allocate(&pool).await,
			Err(PortError::PoolAlreadyLeased {
				pool_id: pool.clone(),
				port: 20060
			})
		);
		assert_eq!(ports.lease_for(&pool).await.map(|l| l.port), Some(20060));
	}

	#[tokio::test]
	async fn exhaustion_is_reported() {
		let ports = PortAllocator::new(20060, 2);
		ports.allocate(&PoolId::new()).await.unwrap();
		ports.allocate(&PoolId::new()).await.unwrap();
		assert_eq!(
			ports.allocate(&PoolId::new()).await,
			Err(PortError::Exhausted {
				first: 20060,
				last: 20061
			})
		);
	}

	#[tokio::test]
	async fn release_is_idempotent() {
		let ports = PortAllocator::new(20060, 40);
		let lease = ports.allocate(&PoolId::new()).await.unwrap();
		assert!(ports.release(lease.port).await.is_some());
		assert!(ports.release(lease.port).await.is_none());
		assert!(ports.leases().await.is_empty());
	}

	#[tokio::test]
	async fn range_ending_at_u16_max() {
		let ports = PortAllocator::new(65534, 2);
		assert_eq!(ports.allocate(&PoolId::new()).await.unwrap().port, 65534);
		assert_eq!(ports.allocate(&PoolId::new()).await.unwrap().port, 65535);
		assert!(ports.allocate(&PoolId::new()).await.is_err());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_allocations_never_share_a_port() {
		let ports = Arc::new(PortAllocator::new(20060, 40));
		let handles: Vec<_> = (0..60)
			.map(|_| {
				let ports = Arc::clone(&ports);
				tokio::spawn(async move { ports.allocate(&PoolId::new()).await })
			})
			.collect();

		let mut granted = HashSet::new();
		let mut exhausted = 0;
		for handle in handles {
			match handle.await.unwrap() {
				Ok(lease) => assert!(granted.insert(lease.port), "port {} granted twice", lease.port),
				Err(PortError::Exhausted { .. }) => exhausted += 1,
				Err(other) => panic!("unexpected error: {other}"),
			}
		}
		assert_eq!(granted.len(), 40);
		assert_eq!(exhausted, 20);
	}

	proptest! {
		#[test]
		fn leases_stay_unique_and_in_range(ops in proptest::collection::vec(any::<bool>(), 1..120)) {
			let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
			rt.block_on(async {
				let ports = PortAllocator::new(20060, 8);
				let mut held: Vec<u16> = Vec::new();
				for allocate in ops {
					if allocate || held.is_empty() {
						if let Ok(lease) = ports.allocate(&PoolId::new()).await {
							assert!((20060..=20067).contains(&lease.port));
							assert!(!held.contains(&lease.port));
							held.push(lease.port);
						} else {
							assert_eq!(held.len(), 8);
						}
					} else {
						let port = held.remove(0);
						ports.release(port).await;
					}
				}
				assert_eq!(ports.leases().await.len(), held.len());
			});
		}
	}
}
