// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-pool mutual exclusion.

use std::collections::HashMap;
use std::sync::Arc;

use pooled_core::PoolId;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct PoolLocks {
	locks: Mutex<HashMap<PoolId, Arc<Mutex<()>>>>,
}

impl PoolLocks {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn lock(&self, pool_id: &PoolId) -> OwnedMutexGuard<()> {
		let lock = {
			let mut locks = self.locks.lock().await;
			Arc::clone(locks.entry(pool_id.clone()).or_default())
		};
		lock.lock_owned().await
	}

	/// Drop the lock for a pool that no longer exists. Kept while anyone
	/// still holds or awaits it.
	pub async fn forget(&self, pool_id: &PoolId) {
		let mut locks = self.locks.lock().await;
		if locks.get(pool_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
			locks.remove(pool_id);
		}
	}

	/// Lock several pools, always in id order.
	pub async fn lock_many(&self, pool_ids: &[PoolId]) -> Vec<OwnedMutexGuard<()>> {
		let mut ids = pool_ids.to_vec();
		ids.sort();
		ids.dedup();
		let mut guards = Vec::with_capacity(ids.len());
		for id in &ids {
			guards.push(self.lock(id).await);
		}
		guards
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;
	use tokio_test::{assert_pending, assert_ready, task};

	#[tokio::test]
	async fn same_pool_is_exclusive() {
		let locks = PoolLocks::new();
		let id = PoolId::new();
		let guard = locks.lock(&id).await;

		let mut waiter = task::spawn(locks.lock(&id));
		assert_pending!(waiter.poll());

		drop(guard);
		assert!(waiter.is_woken());
		let _second = assert_ready!(waiter.poll());
	}

	#[tokio::test]
	async fn distinct_pools_do_not_block() {
		let locks = PoolLocks::new();
		let _a = locks.lock(&PoolId::new()).await;
		let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(&PoolId::new())).await;
		assert!(b.is_ok());
	}

	#[tokio::test]
	async fn forget_removes_idle_locks_only() {
		let locks = PoolLocks::new();
		let idle = PoolId::new();
		let held = PoolId::new();
		drop(locks.lock(&idle).await);
		let guard = locks.lock(&held).await;

		locks.forget(&idle).await;
		locks.forget(&held).await;
		{
			let map = locks.locks.lock().await;
			assert!(!map.contains_key(&idle));
			assert!(map.contains_key(&held));
		}

		drop(guard);
		locks.forget(&held).await;
		assert!(locks.locks.lock().await.is_empty());
	}

	#[tokio::test]
	async fn lock_many_dedups() {
		let locks = PoolLocks::new();
		let id = PoolId::new();
		let guards = locks.lock_many(&[id.clone(), id.clone()]).await;
		assert_eq!(guards.len(), 1);
	}
}
