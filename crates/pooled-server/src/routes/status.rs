// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{extract::State, Json};
use pooled_server_pools::OrchestratorStatus;

use crate::api::AppState;

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<OrchestratorStatus> {
	Json(state.orchestrator.status().await)
}
