// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pool HTTP handlers.

use axum::{
	extract::{rejection::JsonRejection, Path, State},
	http::StatusCode,
	Json,
};
use pooled_core::{AccountId, Pool, PoolId, PoolStatus, ServeProtocol};
use pooled_server_pools::{CreatePool, PoolStats, UpdatePool};
use serde::{Deserialize, Serialize};

use crate::{api::AppState, error::ServerError};

/// A pool together with its derived status.
#[derive(Debug, Serialize)]
pub struct PoolView {
	#[serde(flatten)]
	pub pool: Pool,
	pub status: PoolStatus,
}

impl From<Pool> for PoolView {
	fn from(pool: Pool) -> Self {
		let status = pool.status();
		Self { pool, status }
	}
}

#[derive(Debug, Serialize)]
pub struct MountInfo {
	pub protocol: ServeProtocol,
	pub port: u16,
	pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
	pub success: bool,
	pub pool: PoolView,
	pub mount_info: MountInfo,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
	pub success: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAccountRequest {
	pub account_id: AccountId,
}

/// GET /api/pools
pub async fn list_pools(State(state): State<AppState>) -> Json<Vec<PoolView>> {
	let pools = state.orchestrator.list_pools().await;
	Json(pools.into_iter().map(PoolView::from).collect())
}

/// POST /api/pools
pub async fn create_pool(
	State(state): State<AppState>,
	payload: Result<Json<CreatePool>, JsonRejection>,
) -> Result<(StatusCode, Json<PoolView>), ServerError> {
	let Json(request) = payload?;
	let pool = state.orchestrator.create_pool(request).await?;
	Ok((StatusCode::CREATED, Json(pool.into())))
}

/// GET /api/pools/{id}
pub async fn get_pool(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<PoolView>, ServerError> {
	let pool = state.orchestrator.get_pool(&PoolId::from_string(id)).await?;
	Ok(Json(pool.into()))
}

/// PUT /api/pools/{id}
pub async fn update_pool(
	State(state): State<AppState>,
	Path(id): Path<String>,
	payload: Result<Json<UpdatePool>, JsonRejection>,
) -> Result<Json<PoolView>, ServerError> {
	let Json(request) = payload?;
	let pool = state
		.orchestrator
		.update_pool(&PoolId::from_string(id), request)
		.await?;
	Ok(Json(pool.into()))
}

/// DELETE /api/pools/{id}
pub async fn delete_pool(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ServerError> {
	state.orchestrator.delete_pool(&PoolId::from_string(id)).await?;
	Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/pools/{id}/start
pub async fn start_pool(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<StartResponse>, ServerError> {
	let started = state.orchestrator.start_pool(&PoolId::from_string(id)).await?;
	Ok(Json(StartResponse {
		success: true,
		pool: started.pool.into(),
		mount_info: MountInfo {
			protocol: started.mount.protocol,
			port: started.mount.port,
			url: started.mount.url,
		},
	}))
}

/// POST /api/pools/{id}/stop
pub async fn stop_pool(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ServerError> {
	state.orchestrator.stop_pool(&PoolId::from_string(id)).await?;
	Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/pools/{id}/stats
pub async fn pool_stats(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<PoolStats>, ServerError> {
	let stats = state.orchestrator.pool_stats(&PoolId::from_string(id)).await?;
	Ok(Json(stats))
}

/// POST /api/pools/{id}/accounts
pub async fn add_account(
	State(state): State<AppState>,
	Path(id): Path<String>,
	payload: Result<Json<AddAccountRequest>, JsonRejection>,
) -> Result<Json<PoolView>, ServerError> {
	let Json(request) = payload?;
	let pool = state
		.orchestrator
		.add_account_to_pool(&PoolId::from_string(id), &request.account_id)
		.await?;
	Ok(Json(pool.into()))
}

/// DELETE /api/pools/{id}/accounts/{account_id}
pub async fn remove_account(
	State(state): State<AppState>,
	Path((id, account_id)): Path<(String, String)>,
) -> Result<Json<PoolView>, ServerError> {
	let pool = state
		.orchestrator
		.remove_account_from_pool(&PoolId::from_string(id), &AccountId::from_string(account_id))
		.await?;
	Ok(Json(pool.into()))
}
