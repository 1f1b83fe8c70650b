// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{
	routing::{delete, get, post},
	Router,
};
use pooled_server_pools::PoolOrchestrator;

use crate::{routes, websocket};

#[derive(Clone)]
pub struct AppState {
	pub orchestrator: PoolOrchestrator,
}

impl AppState {
	pub fn new(orchestrator: PoolOrchestrator) -> Self {
		Self { orchestrator }
	}
}

pub fn create_router(state: AppState) -> Router {
	let api = Router::new()
		.route("/health", get(routes::health::health_check))
		.route("/status", get(routes::status::get_status))
		.route(
			"/pools",
			get(routes::pools::list_pools).post(routes::pools::create_pool),
		)
		.route(
			"/pools/{id}",
			get(routes::pools::get_pool)
				.put(routes::pools::update_pool)
				.delete(routes::pools::delete_pool),
		)
		.route("/pools/{id}/start", post(routes::pools::start_pool))
		.route("/pools/{id}/stop", post(routes::pools::stop_pool))
		.route("/pools/{id}/stats", get(routes::pools::pool_stats))
		.route("/pools/{id}/accounts", post(routes::pools::add_account))
		.route(
			"/pools/{id}/accounts/{account_id}",
			delete(routes::pools::remove_account),
		)
		.route(
			"/accounts",
			get(routes::accounts::list_accounts).post(routes::accounts::create_account),
		)
		.route(
			"/accounts/{id}",
			get(routes::accounts::get_account).delete(routes::accounts::delete_account),
		)
		.route("/accounts/{id}/refresh", post(routes::accounts::refresh_account))
		.route("/events", get(websocket::ws_upgrade_handler));

	Router::new().nest("/api", api).with_state(state)
}
