// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event fan-out to observers.

use pooled_core::{PoolEvent, PoolsDocument};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Per-subscriber buffer. A subscriber further behind than this loses the
/// oldest events.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
	tx: broadcast::Sender<PoolEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity.max(1));
		Self { tx }
	}

	/// Never blocks. Publishing with no subscribers is fine.
	pub fn publish(&self, event: PoolEvent) {
		let kind = event.kind();
		match self.tx.send(event) {
			Ok(receivers) => trace!(kind, receivers, "published event"),
			Err(_) => trace!(kind, "published event with no subscribers"),
		}
	}

	pub fn subscribe_raw(&self) -> broadcast::Receiver<PoolEvent> {
		self.tx.subscribe()
	}

	pub fn subscriber_count(&self) -> usize {
		self.tx.receiver_count()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(DEFAULT_EVENT_CAPACITY)
	}
}

/// A stream of events beginning with an `initial_data` snapshot.
pub struct Subscription {
	initial: Option<PoolEvent>,
	rx: broadcast::Receiver<PoolEvent>,
}

impl Subscription {
	/// `rx` must have been created before `snapshot` was taken.
	pub fn new(snapshot: PoolsDocument, rx: broadcast::Receiver<PoolEvent>) -> Self {
		Self {
			initial: Some(PoolEvent::InitialData { data: snapshot }),
			rx,
		}
	}

	/// Next event, or `None` once the bus is gone. Lagged events are skipped.
	pub async fn recv(&mut self) -> Option<PoolEvent> {
		if let Some(initial) = self.initial.take() {
			return Some(initial);
		}
		loop {
			match self.rx.recv().await {
				Ok(event) => return Some(event),
				Err(broadcast::error::RecvError::Lagged(missed)) => {
					warn!(missed, "event subscriber lagged, dropping events");
				}
				Err(broadcast::error::RecvError::Closed) => return None,
			}
		}
	}
}
