// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Account HTTP handlers.

use axum::{
	extract::{rejection::JsonRejection, Path, State},
	http::StatusCode,
	Json,
};
use pooled_core::{Account, AccountId};
use pooled_server_pools::CreateAccount;

use super::pools::SuccessResponse;
use crate::{api::AppState, error::ServerError};

/// GET /api/accounts
pub async fn list_accounts(State(state): State<AppState>) -> Json<Vec<Account>> {
	Json(state.orchestrator.list_accounts().await)
}

/// POST /api/accounts
pub async fn create_account(
	State(state): State<AppState>,
	payload: Result<Json<CreateAccount>, JsonRejection>,
) -> Result<(StatusCode, Json<Account>), ServerError> {
	let Json(request) = payload?;
	let account = state.orchestrator.create_account(request).await?;
	Ok((StatusCode::CREATED, Json(account)))
}

/// GET /api/accounts/{id}
pub async fn get_account(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<Account>, ServerError> {
	let account = state
		.orchestrator
		.get_account(&AccountId::from_string(id))
		.await?;
	Ok(Json(account))
}

/// DELETE /api/accounts/{id}
pub async fn delete_account(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ServerError> {
	state
		.orchestrator
		.delete_account(&AccountId::from_string(id))
		.await?;
	Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/accounts/{id}/refresh
pub async fn refresh_account(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<Account>, ServerError> {
	let account = state
		.orchestrator
		.refresh_account_usage(&AccountId::from_string(id))
		.await?;
	Ok(Json(account))
}
