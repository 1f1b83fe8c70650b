// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event stream over WebSocket.
//!
//! Each connection receives `initial_data` followed by every orchestrator
//! event as a JSON text frame. Incoming frames other than close are ignored.

use axum::{
	extract::{
		ws::{Message, WebSocket},
		State, WebSocketUpgrade,
	},
	response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::AppState;

/// GET /api/events
pub async fn ws_upgrade_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
	ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(socket: WebSocket, state: AppState) {
	let (mut sender, mut receiver) = socket.split();
	let mut subscription = state.orchestrator.subscribe().await;
	info!(
		subscribers = state.orchestrator.events().subscriber_count(),
		"event stream client connected"
	);

	loop {
		tokio::select! {
			event = subscription.recv() => {
				let Some(event) = event else {
					break;
				};
				let text = match serde_json::to_string(&event) {
					Ok(text) => text,
					Err(e) => {
						warn!(error = %e, kind = event.kind(), "failed to encode event");
						continue;
					}
				};
				if let Err(e) = sender.send(Message::Text(text.into())).await {
					debug!(error = %e, "failed to send event, closing stream");
					break;
				}
			}
			incoming = receiver.next() => {
				match incoming {
					Some(Ok(Message::Close(_))) | None => break,
					Some(Ok(_)) => {}
					Some(Err(e)) => {
						debug!(error = %e, "event stream receive error");
						break;
					}
				}
			}
		}
	}

	let _ = sender.close().await;
	info!("event stream client disconnected");
}
