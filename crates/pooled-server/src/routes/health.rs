// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Liveness probe.

use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
	pub status: &'static str,
	pub timestamp: DateTime<Utc>,
}

/// GET /api/health
pub async fn health_check() -> Json<HealthResponse> {
	Json(HealthResponse {
		status: "healthy",
		timestamp: Utc::now(),
	})
}
