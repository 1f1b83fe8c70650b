// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pooled_server_pools::OrchestratorError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error(transparent)]
	Orchestrator(#[from] OrchestratorError),
	#[error("invalid request body: {0}")]
	BadRequest(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	pub error: String,
	pub code: &'static str,
}

impl From<JsonRejection> for ServerError {
	fn from(rejection: JsonRejection) -> Self {
		ServerError::BadRequest(rejection.body_text())
	}
}

impl ServerError {
	pub fn status(&self) -> StatusCode {
		match self {
			ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
			ServerError::Orchestrator(e) => match e {
				OrchestratorError::PoolNotFound(_) | OrchestratorError::AccountNotFound(_) => {
					StatusCode::NOT_FOUND
				}
				OrchestratorError::PortsExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
				OrchestratorError::Validation(_)
				| OrchestratorError::NoAccountsInPool(_)
				| OrchestratorError::AccountAlreadyInPool { .. }
				| OrchestratorError::PoolRunning(_)
				| OrchestratorError::AlreadyRunning(_)
				| OrchestratorError::NotRunning(_)
				| OrchestratorError::Synthesis(_) => StatusCode::BAD_REQUEST,
				OrchestratorError::StopTimedOut(_)
				| OrchestratorError::Supervisor(_)
				| OrchestratorError::BackendConfig(_)
				| OrchestratorError::Backend(_)
				| OrchestratorError::Persistence(_)
				| OrchestratorError::StartInterrupted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
			},
		}
	}

	pub fn code(&self) -> &'static str {
		match self {
			ServerError::BadRequest(_) => "invalid_request",
			ServerError::Orchestrator(e) => e.code(),
		}
	}
}

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		let status = self.status();
		if status.is_server_error() {
			tracing::error!(error = %self, code = self.code(), "request failed");
		}
		let body = ErrorResponse {
			error: self.to_string(),
			code: self.code(),
		};
		(status, Json(body)).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pooled_core::PoolId;
	use pooled_server_pools::PortError;

	#[test]
	fn exhaustion_is_unavailable() {
		let err = ServerError::from(OrchestratorError::from(PortError::Exhausted {
			first: 20060,
			last: 20099,
		}));
		assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
		assert_eq!(err.code(), "ports_exhausted");
	}

	#[test]
	fn conflicts_are_bad_requests() {
		let id = PoolId::new();
		for err in [
			OrchestratorError::AlreadyRunning(id.clone()),
			OrchestratorError::NotRunning(id.clone()),
			OrchestratorError::NoAccountsInPool(id.clone()),
			OrchestratorError::PoolRunning(id),
		] {
			assert_eq!(ServerError::from(err).status(), StatusCode::BAD_REQUEST);
		}
	}

	#[test]
	fn missing_pool_is_not_found() {
		let err = ServerError::from(OrchestratorError::PoolNotFound(PoolId::new()));
		assert_eq!(err.status(), StatusCode::NOT_FOUND);
		assert_eq!(err.code(), "pool_not_found");
	}

	#[test]
	fn interrupted_start_is_internal() {
		let err = ServerError::from(OrchestratorError::StartInterrupted {
			pool_id: PoolId::new(),
			message: "task was cancelled".to_string(),
		});
		assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(err.code(), "start_interrupted");
	}
}
