// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pool orchestration engine.
//!
//! [`PoolOrchestrator`] is the single writer of pool and account state. It
//! leases ports from a [`PortAllocator`], hands serve commands to the
//! [`ProcessSupervisor`], persists through a
//! [`StateStore`](pooled_server_store::StateStore) and publishes every change
//! on the [`EventBus`].

pub mod error;
pub mod events;
pub mod locks;
pub mod orchestrator;
pub mod ports;
pub mod supervisor;
pub mod usage;

pub use error::{OrchestratorError, PortError, SupervisorError};
pub use events::{EventBus, Subscription, DEFAULT_EVENT_CAPACITY};
pub use locks::PoolLocks;
pub use orchestrator::{
	AccountUsage, CreateAccount, CreatePool, CredentialInput, OrchestratorDeps, OrchestratorSettings,
	OrchestratorStatus, PersistenceHealth, PoolOrchestrator, PoolStats, StartedPool, UpdatePool,
};
pub use ports::{PortAllocator, PortLease};
pub use supervisor::{ExitNotice, ExitReport, ProcessInfo, ProcessSupervisor, STDERR_TAIL_LINES};
pub use usage::UsageRefreshJob;
