// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic account usage refresh.

use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::orchestrator::PoolOrchestrator;

pub struct UsageRefreshJob {
	orchestrator: PoolOrchestrator,
	interval: Duration,
	shutdown_tx: broadcast::Sender<()>,
	handle: Mutex<Option<JoinHandle<()>>>,
}

impl UsageRefreshJob {
	pub fn new(orchestrator: PoolOrchestrator, interval: Duration) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			orchestrator,
			interval,
			shutdown_tx,
			handle: Mutex::new(None),
		}
	}

	pub fn interval(&self) -> Duration {
		self.interval
	}

	/// Spawn the refresh loop. Calling this twice has no effect.
	pub async fn start(&self) {
		let mut handle = self.handle.lock().await;
		if handle.is_some() {
			return;
		}

		let orchestrator = self.orchestrator.clone();
		let interval = self.interval;
		let mut shutdown_rx = self.shutdown_tx.subscribe();

		*handle = Some(tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = tokio::time::sleep(interval) => {
						match orchestrator.refresh_all_usage().await {
							Ok(accounts) => debug!(accounts = accounts.len(), "usage refresh complete"),
							Err(e) => warn!(error = %e, "usage refresh failed"),
						}
					}
					_ = shutdown_rx.recv() => {
						info!("stopping usage refresh");
						break;
					}
				}
			}
		}));

		info!(interval_secs = interval.as_secs(), "usage refresh scheduled");
	}

	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());
		if let Some(handle) = self.handle.lock().await.take() {
			let _ = handle.await;
		}
	}
}
