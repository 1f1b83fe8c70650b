// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use pooled_backend::{BackendError, ConfigFileError, SynthesisError};
use pooled_core::{AccountId, PoolId};
use pooled_server_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortError {
	#[error("no free port in {first}-{last}")]
	Exhausted { first: u16, last: u16 },

	#[error("pool {pool_id} already holds port {port}")]
	PoolAlreadyLeased { pool_id: PoolId, port: u16 },
}

#[derive(Debug, Error)]
pub enum SupervisorError {
	#[error("pool {0} is already starting")]
	AlreadyStarting(PoolId),

	#[error("pool {0} is already running")]
	AlreadyRunning(PoolId),

	#[error("pool {0} is already stopping")]
	AlreadyStopping(PoolId),

	#[error("pool {0} is not running")]
	NotRunning(PoolId),

	#[error("failed to spawn backend for pool {pool_id}: {message}")]
	SpawnFailed { pool_id: PoolId, message: String },

	#[error("monitor for pool {0} went away before reporting")]
	MonitorLost(PoolId),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
	#[error("pool not found: {0}")]
	PoolNotFound(PoolId),

	#[error("account not found: {0}")]
	AccountNotFound(AccountId),

	#[error("{0}")]
	Validation(String),

	#[error("pool {0} has no accounts")]
	NoAccountsInPool(PoolId),

	#[error("account {account_id} is already in pool {pool_id}")]
	AccountAlreadyInPool { pool_id: PoolId, account_id: AccountId },

	#[error("pool {0} must be stopped first")]
	PoolRunning(PoolId),

	#[error("pool {0} is already running")]
	AlreadyRunning(PoolId),

	#[error("pool {0} is not running")]
	NotRunning(PoolId),

	#[error("no free ports: {0}")]
	PortsExhausted(PortError),

	#[error("stopping pool {0} timed out")]
	StopTimedOut(PoolId),

	#[error(transparent)]
	Synthesis(#[from] SynthesisError),

	#[error(transparent)]
	Supervisor(SupervisorError),

	#[error("backend configuration error: {0}")]
	BackendConfig(#[from] ConfigFileError),

	#[error("backend error: {0}")]
	Backend(#[from] BackendError),

	#[error("persistence failed: {0}")]
	Persistence(#[from] StoreError),

	#[error("start of pool {pool_id} was interrupted: {message}")]
	StartInterrupted { pool_id: PoolId, message: String },
}

impl OrchestratorError {
	/// Stable machine-readable code.
	pub fn code(&self) -> &'static str {
		match self {
			OrchestratorError::PoolNotFound(_) => "pool_not_found",
			OrchestratorError::AccountNotFound(_) => "account_not_found",
			OrchestratorError::Validation(_) => "validation_failed",
			OrchestratorError::NoAccountsInPool(_) => "no_accounts_in_pool",
			OrchestratorError::AccountAlreadyInPool { .. } => "account_already_in_pool",
			OrchestratorError::PoolRunning(_) => "pool_running",
			OrchestratorError::AlreadyRunning(_) => "already_running",
			OrchestratorError::NotRunning(_) => "not_running",
			OrchestratorError::PortsExhausted(_) => "ports_exhausted",
			OrchestratorError::StopTimedOut(_) => "stop_timed_out",
			OrchestratorError::Synthesis(SynthesisError::InvalidIdentifier(_)) => "invalid_identifier",
			OrchestratorError::Synthesis(SynthesisError::EmptyPool) => "no_accounts_in_pool",
			OrchestratorError::Synthesis(SynthesisError::UnknownAccount(_)) => "account_not_found",
			OrchestratorError::Synthesis(_) => "invalid_configuration",
			OrchestratorError::Supervisor(_) => "process_failed",
			OrchestratorError::BackendConfig(_) => "backend_config_failed",
			OrchestratorError::Backend(_) => "backend_failed",
			OrchestratorError::Persistence(_) => "persistence_failed",
			OrchestratorError::StartInterrupted { .. } => "start_interrupted",
		}
	}
}

impl From<PortError> for OrchestratorError {
	fn from(err: PortError) -> Self {
		match err {
			PortError::PoolAlreadyLeased { pool_id, .. } => OrchestratorError::AlreadyRunning(pool_id),
			exhausted @ PortError::Exhausted { .. } => OrchestratorError::PortsExhausted(exhausted),
		}
	}
}

impl From<SupervisorError> for OrchestratorError {
	fn from(err: SupervisorError) -> Self {
		match err {
			SupervisorError::AlreadyStarting(id)
			| SupervisorError::AlreadyRunning(id)
			| SupervisorError::AlreadyStopping(id) => OrchestratorError::AlreadyRunning(id),
			SupervisorError::NotRunning(id) => OrchestratorError::NotRunning(id),
			other => OrchestratorError::Supervisor(other),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exhaustion_keeps_its_own_code() {
		let err: OrchestratorError = PortError::Exhausted {
			first: 20060,
			last: 20099,
		}
		.into();
		assert_eq!(err.code(), "ports_exhausted");
	}

	#[test]
	fn supervisor_conflicts_become_already_running() {
		let id = PoolId::new();
		let err: OrchestratorError = SupervisorError::AlreadyStarting(id.clone()).into();
		assert!(matches!(err, OrchestratorError::AlreadyRunning(ref p) if *p == id));

		let err: OrchestratorError = SupervisorError::SpawnFailed {
			pool_id: id,
			message: "No such file or directory".to_string(),
		}
		.into();
		assert_eq!(err.code(), "process_failed");
	}

	#[test]
	fn invalid_identifier_code() {
		let err: OrchestratorError = SynthesisError::InvalidIdentifier("a]b".to_string()).into();
		assert_eq!(err.code(), "invalid_identifier");
	}
}
