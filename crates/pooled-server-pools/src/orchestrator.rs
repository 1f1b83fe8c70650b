// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pool lifecycle orchestration.
//!
//! Every mutation goes through [`PoolOrchestrator`]: it validates against the
//! in-memory document, performs side effects (config file, ports, processes),
//! persists, and only then publishes an event. Operations touching one pool
//! are serialized by a per-pool lock; different pools proceed concurrently.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use pooled_backend::{
	account_remote_name, account_section, synthesize, AccountCredential, BackendConfigFile,
	BackendExecutable, ServeRequest,
};
use pooled_core::{
	Account, AccountId, AccountStatus, AggregationStrategy, AuthMethod, Chunking, CredentialRef,
	LifecycleState, MountRecord, Pool, PoolEvent, PoolId, PoolsDocument, ProviderType, ServeProtocol,
	UsageSnapshot,
};
use pooled_server_store::{StateStore, StoreError};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::error::{OrchestratorError, SupervisorError};
use crate::events::{EventBus, Subscription};
use crate::locks::PoolLocks;
use crate::ports::{PortAllocator, PortLease};
use crate::supervisor::{ExitNotice, ProcessInfo, ProcessSupervisor};

/// Extra time allowed for the supervisor to answer beyond the stop grace period.
const STOP_REPLY_SLACK: Duration = Duration::from_secs(5);

const MAX_NAME_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
	/// Host placed in endpoint URLs handed to clients.
	pub public_host: String,
	pub stop_timeout: Duration,
	pub shutdown_timeout: Duration,
}

impl Default for OrchestratorSettings {
	fn default() -> Self {
		Self {
			public_host: "127.0.0.1".to_string(),
			stop_timeout: Duration::from_secs(10),
			shutdown_timeout: Duration::from_secs(30),
		}
	}
}

pub struct OrchestratorDeps {
	pub store: Arc<dyn StateStore>,
	pub executable: Arc<dyn BackendExecutable>,
	pub backend_config: BackendConfigFile,
	pub ports: PortAllocator,
	pub events: EventBus,
	pub settings: OrchestratorSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreatePool {
	pub name: String,
	pub description: Option<String>,
	pub account_ids: Vec<AccountId>,
	pub strategy: Option<AggregationStrategy>,
	pub chunking: Option<Chunking>,
	pub serve_protocol: Option<ServeProtocol>,
}

/// Name and description may change at any time; the rest only while stopped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdatePool {
	pub name: Option<String>,
	pub description: Option<String>,
	pub strategy: Option<AggregationStrategy>,
	pub chunking: Option<Chunking>,
	pub serve_protocol: Option<ServeProtocol>,
}

/// Credential material supplied by the client. Either value may be a JSON
/// object or a string containing one.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CredentialInput {
	OauthToken { token: serde_json::Value },
	ServiceAccount { key: serde_json::Value },
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccount {
	pub name: String,
	#[serde(rename = "type")]
	pub provider: ProviderType,
	pub credential: CredentialInput,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedPool {
	pub pool: Pool,
	pub mount: MountRecord,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUsage {
	pub id: AccountId,
	pub name: String,
	pub usage: Option<UsageSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
	pub pool_id: PoolId,
	pub account_count: usize,
	pub accounts: Vec<AccountUsage>,
	pub total_space: u64,
	pub used_space: u64,
	pub free_space: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceHealth {
	pub location: String,
	/// In-memory state is ahead of what is on disk.
	pub degraded: bool,
	pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorStatus {
	pub backend_version: Option<String>,
	pub backend_error: Option<String>,
	pub pools: usize,
	pub running_pools: usize,
	pub accounts: usize,
	pub mounts: usize,
	pub first_port: u16,
	pub last_port: u16,
	pub leased_ports: Vec<PortLease>,
	pub processes: Vec<ProcessInfo>,
	pub subscribers: usize,
	pub persistence: PersistenceHealth,
}

struct Inner {
	document: Mutex<PoolsDocument>,
	store: Arc<dyn StateStore>,
	executable: Arc<dyn BackendExecutable>,
	backend_config: BackendConfigFile,
	ports: PortAllocator,
	supervisor: ProcessSupervisor,
	events: EventBus,
	locks: PoolLocks,
	health: Mutex<PersistenceHealth>,
	settings: OrchestratorSettings,
}

#[derive(Clone)]
pub struct PoolOrchestrator {
	inner: Arc<Inner>,
}

impl PoolOrchestrator {
	/// Load persisted state, reset anything left running by a previous
	/// process, persist the result and start watching for backend exits.
	pub async fn open(deps: OrchestratorDeps) -> Result<Self, OrchestratorError> {
		let mut document = deps.store.load().await?;
		let reset = reconcile(&mut document);
		if reset > 0 {
			info!(reset, "reset pools left running by a previous process");
		}
		deps.store.save(&document).await?;
		deps.ports.release_all().await;

		let (supervisor, exit_rx) = ProcessSupervisor::new(deps.events.clone());
		let health = PersistenceHealth {
			location: deps.store.describe(),
			degraded: false,
			last_error: None,
		};

		info!(
			pools = document.pools.len(),
			accounts = document.accounts.len(),
			store = %health.location,
			"pool orchestrator ready"
		);

		let inner = Arc::new(Inner {
			document: Mutex::new(document),
			store: deps.store,
			executable: deps.executable,
			backend_config: deps.backend_config,
			ports: deps.ports,
			supervisor,
			events: deps.events,
			locks: PoolLocks::new(),
			health: Mutex::new(health),
			settings: deps.settings,
		});

		tokio::spawn(watch_exits(Arc::downgrade(&inner), exit_rx));
		Ok(Self { inner })
	}

	pub fn events(&self) -> &EventBus {
		&self.inner.events
	}

	pub fn settings(&self) -> &OrchestratorSettings {
		&self.inner.settings
	}

	/// Event stream beginning with a full snapshot.
	pub async fn subscribe(&self) -> Subscription {
		let rx = self.inner.events.subscribe_raw();
		let snapshot = self.inner.document.lock().await.clone();
		Subscription::new(snapshot, rx)
	}

	pub async fn snapshot(&self) -> PoolsDocument {
		self.inner.document.lock().await.clone()
	}

	// Pools

	pub async fn list_pools(&self) -> Vec<Pool> {
		self.read(|doc| doc.pools.clone()).await
	}

	pub async fn get_pool(&self, id: &PoolId) -> Result<Pool, OrchestratorError> {
		self.read(|doc| doc.pool(id).cloned())
			.await
			.ok_or_else(|| OrchestratorError::PoolNotFound(id.clone()))
	}

	#[instrument(skip(self, request))]
	pub async fn create_pool(&self, request: CreatePool) -> Result<Pool, OrchestratorError> {
		let name = required_name(&request.name, "pool")?;
		if let Some(chunking) = &request.chunking {
			validate_chunking(chunking)?;
		}
		let mut seen = HashSet::new();
		for id in &request.account_ids {
			if !seen.insert(id) {
				return Err(OrchestratorError::Validation(format!(
					"account {id} is listed more than once"
				)));
			}
		}

		let mut pool = Pool::new(name);
		pool.description = request.description.and_then(non_blank);
		pool.account_ids = request.account_ids;
		pool.strategy = request.strategy.unwrap_or_default();
		pool.chunking = request.chunking.unwrap_or_default();
		pool.serve_protocol = request.serve_protocol.unwrap_or_default();

		let pool = self
			.commit(move |doc| {
				if let Some(missing) = pool.account_ids.iter().find(|id| doc.account(id).is_none()) {
					return Err(OrchestratorError::AccountNotFound(missing.clone()));
				}
				doc.pools.push(pool.clone());
				Ok(pool)
			})
			.await?;

		info!(pool_id = %pool.id, name = %pool.name, "pool created");
		self.publish(PoolEvent::PoolCreated { pool: pool.clone() });
		Ok(pool)
	}

	#[instrument(skip(self, request), fields(pool_id = %id))]
	pub async fn update_pool(&self, id: &PoolId, request: UpdatePool) -> Result<Pool, OrchestratorError> {
		let _guard = self.inner.locks.lock(id).await;

		let name = request
			.name
			.as_deref()
			.map(|n| required_name(n, "pool"))
			.transpose()?;
		if let Some(chunking) = &request.chunking {
			validate_chunking(chunking)?;
		}

		let pool = self
			.commit(|doc| {
				let pool = doc
					.pool_mut(id)
					.ok_or_else(|| OrchestratorError::PoolNotFound(id.clone()))?;

				let changes_runtime = request.strategy.is_some_and(|s| s != pool.strategy)
					|| request.chunking.is_some_and(|c| c != pool.chunking)
					|| request.serve_protocol.is_some_and(|p| p != pool.serve_protocol);
				if changes_runtime && pool.state != LifecycleState::Stopped {
					return Err(OrchestratorError::PoolRunning(id.clone()));
				}

				if let Some(name) = name {
					pool.name = name;
				}
				if let Some(description) = request.description {
					pool.description = non_blank(description);
				}
				if let Some(strategy) = request.strategy {
					pool.strategy = strategy;
				}
				if let Some(chunking) = request.chunking {
					pool.chunking = chunking;
				}
				if let Some(protocol) = request.serve_protocol {
					pool.serve_protocol = protocol;
				}
				pool.touch();
				Ok(pool.clone())
			})
			.await?;

		self.publish(PoolEvent::PoolUpdated { pool: pool.clone() });
		Ok(pool)
	}

	#[instrument(skip(self), fields(pool_id = %id))]
	pub async fn delete_pool(&self, id: &PoolId) -> Result<(), OrchestratorError> {
		let guard = self.inner.locks.lock(id).await;

		let state = self
			.read(|doc| doc.pool(id).map(|p| p.state))
			.await
			.ok_or_else(|| OrchestratorError::PoolNotFound(id.clone()))?;
		if state != LifecycleState::Stopped || self.inner.supervisor.state(id).await.is_some() {
			return Err(OrchestratorError::PoolRunning(id.clone()));
		}

		self.inner.backend_config.remove_pool(id).await?;
		self.commit(|doc| {
			doc.pools.retain(|p| &p.id != id);
			doc.remove_mount(id);
			Ok(())
		})
		.await?;

		drop(guard);
		self.inner.locks.forget(id).await;

		info!("pool deleted");
		self.publish(PoolEvent::PoolDeleted { pool_id: id.clone() });
		Ok(())
	}

	/// Membership changes on a running pool apply at its next start.
	#[instrument(skip(self), fields(pool_id = %pool_id, account_id = %account_id))]
	pub async fn add_account_to_pool(
		&self,
		pool_id: &PoolId,
		account_id: &AccountId,
	) -> Result<Pool, OrchestratorError> {
		let _guard = self.inner.locks.lock(pool_id).await;

		let pool = self
			.commit(|doc| {
				if doc.pool(pool_id).is_none() {
					return Err(OrchestratorError::PoolNotFound(pool_id.clone()));
				}
				if doc.account(account_id).is_none() {
					return Err(OrchestratorError::AccountNotFound(account_id.clone()));
				}
				let pool = doc
					.pool_mut(pool_id)
					.ok_or_else(|| OrchestratorError::PoolNotFound(pool_id.clone()))?;
				if pool.has_account(account_id) {
					return Err(OrchestratorError::AccountAlreadyInPool {
						pool_id: pool_id.clone(),
						account_id: account_id.clone(),
					});
				}
				pool.account_ids.push(account_id.clone());
				pool.touch();
				Ok(pool.clone())
			})
			.await?;

		if pool.state == LifecycleState::Running {
			info!("pool is running; membership change applies on next start");
		}
		self.publish(PoolEvent::PoolAccountAdded {
			pool_id: pool_id.clone(),
			account_id: account_id.clone(),
		});
		Ok(pool)
	}

	/// Removing an account that is not a member is a no-op.
	#[instrument(skip(self), fields(pool_id = %pool_id, account_id = %account_id))]
	pub async fn remove_account_from_pool(
		&self,
		pool_id: &PoolId,
		account_id: &AccountId,
	) -> Result<Pool, OrchestratorError> {
		let _guard = self.inner.locks.lock(pool_id).await;

		let (pool, present) = self
			.read(|doc| doc.pool(pool_id).map(|p| (p.clone(), p.has_account(account_id))))
			.await
			.ok_or_else(|| OrchestratorError::PoolNotFound(pool_id.clone()))?;
		if !present {
			return Ok(pool);
		}

		let pool = self
			.commit(|doc| {
				let pool = doc
					.pool_mut(pool_id)
					.ok_or_else(|| OrchestratorError::PoolNotFound(pool_id.clone()))?;
				pool.account_ids.retain(|a| a != account_id);
				pool.touch();
				Ok(pool.clone())
			})
			.await?;

		self.publish(PoolEvent::PoolAccountRemoved {
			pool_id: pool_id.clone(),
			account_id: account_id.clone(),
		});
		Ok(pool)
	}

	// Lifecycle

	/// Runs on its own task so a caller dropped mid-start cannot leave a
	/// spawned backend without a persisted record.
	#[instrument(skip(self), fields(pool_id = %id))]
	pub async fn start_pool(&self, id: &PoolId) -> Result<StartedPool, OrchestratorError> {
		let this = self.clone();
		let pool_id = id.clone();
		tokio::spawn(async move { this.start_locked(&pool_id).await }.in_current_span())
			.await
			.map_err(|e| OrchestratorError::StartInterrupted {
				pool_id: id.clone(),
				message: e.to_string(),
			})?
	}

	async fn start_locked(&self, id: &PoolId) -> Result<StartedPool, OrchestratorError> {
		let _guard = self.inner.locks.lock(id).await;

		let (pool, accounts) = self
			.read(|doc| doc.pool(id).map(|p| (p.clone(), doc.members_of(p))))
			.await
			.ok_or_else(|| OrchestratorError::PoolNotFound(id.clone()))?;

		if pool.state != LifecycleState::Stopped || self.inner.supervisor.state(id).await.is_some() {
			return Err(OrchestratorError::AlreadyRunning(id.clone()));
		}
		if pool.account_ids.is_empty() {
			return Err(OrchestratorError::NoAccountsInPool(id.clone()));
		}

		let descriptor = synthesize(&pool, &accounts)?;
		self.inner.backend_config.write_descriptor(&descriptor).await?;

		let lease = self.inner.ports.allocate(id).await?;
		let port = lease.port;
		let request = ServeRequest {
			pool_id: id.clone(),
			protocol: pool.serve_protocol,
			remote: descriptor.serve_remote().to_string(),
			port,
		};
		let command = self.inner.executable.serve_command(&request);

		if let Err(e) = self.inner.supervisor.start(id, port, command).await {
			self.inner.ports.release(port).await;
			self.publish(PoolEvent::PoolError {
				pool_id: id.clone(),
				message: e.to_string(),
			});
			return Err(e.into());
		}

		let now = Utc::now();
		let mount = MountRecord {
			pool_id: id.clone(),
			protocol: pool.serve_protocol,
			port,
			url: format!(
				"{}://{}:{}",
				pool.serve_protocol, self.inner.settings.public_host, port
			),
			started_at: now,
		};
		let serve_remote = descriptor.serve_remote().to_string();

		let committed = self
			.commit(|doc| {
				let pool = doc
					.pool_mut(id)
					.ok_or_else(|| OrchestratorError::PoolNotFound(id.clone()))?;
				pool.state = LifecycleState::Running;
				pool.assigned_port = Some(port);
				pool.remote_name = Some(serve_remote);
				pool.started_at = Some(now);
				pool.touch();
				let pool = pool.clone();
				doc.put_mount(mount.clone());
				Ok(pool)
			})
			.await;

		match committed {
			Ok(pool) => {
				info!(port, url = %mount.url, "pool started");
				self.publish(PoolEvent::PoolStarted {
					pool: pool.clone(),
					mount: mount.clone(),
				});
				Ok(StartedPool { pool, mount })
			}
			Err(e) => {
				error!(error = %e, "could not record start, rolling back");
				if let Err(kill_err) = self.inner.supervisor.kill(id).await {
					warn!(error = %kill_err, "rollback kill failed");
				}
				self.inner.ports.release(port).await;
				Err(e)
			}
		}
	}

	#[instrument(skip(self), fields(pool_id = %id))]
	pub async fn stop_pool(&self, id: &PoolId) -> Result<Pool, OrchestratorError> {
		let _guard = self.inner.locks.lock(id).await;

		let pool = self
			.read(|doc| doc.pool(id).cloned())
			.await
			.ok_or_else(|| OrchestratorError::PoolNotFound(id.clone()))?;
		if pool.state != LifecycleState::Running {
			return Err(OrchestratorError::NotRunning(id.clone()));
		}

		let grace = self.inner.settings.stop_timeout;
		match tokio::time::timeout(grace + STOP_REPLY_SLACK, self.inner.supervisor.stop(id, grace)).await {
			Ok(Ok(report)) if report.forced => warn!("backend did not exit in time and was killed"),
			Ok(Ok(_)) => {}
			Ok(Err(SupervisorError::NotRunning(_))) => info!("backend had already exited"),
			Ok(Err(e)) => return Err(e.into()),
			Err(_) => {
				error!("supervisor did not confirm the stop");
				return Err(OrchestratorError::StopTimedOut(id.clone()));
			}
		}

		self.release_ports_of(id).await;
		let stopped = self
			.commit_forced(|doc| {
				doc.remove_mount(id);
				doc.pool_mut(id).map(|p| {
					p.mark_stopped();
					p.touch();
					p.clone()
				})
			})
			.await;

		info!("pool stopped");
		self.publish(PoolEvent::PoolStopped { pool_id: id.clone() });
		Ok(stopped.unwrap_or_else(|| {
			let mut pool = pool;
			pool.mark_stopped();
			pool
		}))
	}

	/// Stop every running pool concurrently, killing whatever is left when
	/// the shutdown timeout expires.
	pub async fn shutdown(&self) {
		let running: Vec<PoolId> = self
			.read(|doc| {
				doc.pools
					.iter()
					.filter(|p| p.state == LifecycleState::Running)
					.map(|p| p.id.clone())
					.collect()
			})
			.await;
		info!(count = running.len(), "stopping running pools");

		let stops = running.iter().map(|id| async move {
			if let Err(e) = self.stop_pool(id).await {
				warn!(pool_id = %id, error = %e, "failed to stop pool during shutdown");
			}
		});

		if tokio::time::timeout(self.inner.settings.shutdown_timeout, join_all(stops))
			.await
			.is_err()
		{
			warn!("shutdown timed out, killing remaining backends");
			for process in self.inner.supervisor.running().await {
				let id = process.pool_id;
				match tokio::time::timeout(STOP_REPLY_SLACK, self.inner.supervisor.kill(&id)).await {
					Ok(Ok(_)) | Ok(Err(SupervisorError::NotRunning(_))) => {}
					Ok(Err(e)) => error!(pool_id = %id, error = %e, "failed to kill backend during shutdown"),
					Err(_) => error!(pool_id = %id, "supervisor did not confirm the kill"),
				}
			}
			self.record_exited_pools().await;
		}
	}

	/// Mark every pool still recorded as running but without a backend as
	/// stopped, so the last persisted document matches reality.
	async fn record_exited_pools(&self) {
		let recorded: Vec<PoolId> = self
			.read(|doc| {
				doc.pools
					.iter()
					.filter(|p| p.state != LifecycleState::Stopped)
					.map(|p| p.id.clone())
					.collect()
			})
			.await;

		let mut exited = Vec::new();
		for id in recorded {
			if self.inner.supervisor.state(&id).await.is_none() {
				self.release_ports_of(&id).await;
				exited.push(id);
			}
		}
		if exited.is_empty() {
			return;
		}

		self.commit_forced(|doc| {
			for id in &exited {
				doc.remove_mount(id);
				if let Some(pool) = doc.pool_mut(id) {
					pool.mark_stopped();
					pool.touch();
				}
			}
		})
		.await;
		for id in exited {
			warn!(pool_id = %id, "pool recorded as stopped after forced shutdown");
			self.publish(PoolEvent::PoolStopped { pool_id: id });
		}
	}

	async fn handle_exit(&self, notice: ExitNotice) {
		let id = notice.pool_id.clone();
		let _guard = self.inner.locks.lock(&id).await;

		if self.inner.supervisor.state(&id).await.is_some() {
			debug!(pool_id = %id, "stale exit notice, a newer backend is running");
			return;
		}

		if let Some(lease) = self.inner.ports.lease_for(&id).await {
			if lease.port == notice.port {
				self.inner.ports.release(lease.port).await;
			}
		}

		let tracked = {
			let mut doc = self.inner.document.lock().await;
			match doc.pool_mut(&id) {
				Some(pool)
					if pool.state == LifecycleState::Running
						&& pool.assigned_port == Some(notice.port) =>
				{
					pool.state = LifecycleState::Crashed;
					true
				}
				_ => false,
			}
		};
		if !tracked {
			debug!(pool_id = %id, "exit notice for a pool that is no longer running");
			return;
		}

		warn!(pool_id = %id, exit_code = ?notice.exit_code, "pool backend crashed");
		self.publish(PoolEvent::PoolCrashed {
			pool_id: id.clone(),
			exit_code: notice.exit_code,
			output: notice.output,
		});

		self.commit_forced(|doc| {
			doc.remove_mount(&id);
			if let Some(pool) = doc.pool_mut(&id) {
				pool.mark_stopped();
				pool.touch();
			}
		})
		.await;
		self.publish(PoolEvent::PoolStopped { pool_id: id });
	}

	// Accounts

	pub async fn list_accounts(&self) -> Vec<Account> {
		self.read(|doc| doc.accounts.clone()).await
	}

	pub async fn get_account(&self, id: &AccountId) -> Result<Account, OrchestratorError> {
		self.read(|doc| doc.account(id).cloned())
			.await
			.ok_or_else(|| OrchestratorError::AccountNotFound(id.clone()))
	}

	/// Register an account from a supplied credential.
	#[instrument(skip(self, request), fields(provider = %request.provider))]
	pub async fn create_account(&self, request: CreateAccount) -> Result<Account, OrchestratorError> {
		let name = required_name(&request.name, "account")?;
		let id = AccountId::new();
		let auth_method = match &request.credential {
			CredentialInput::OauthToken { .. } => AuthMethod::OAuth,
			CredentialInput::ServiceAccount { .. } => AuthMethod::ServiceAccount,
		};
		if auth_method == AuthMethod::ServiceAccount && request.provider != ProviderType::Google {
			return Err(OrchestratorError::Validation(format!(
				"service accounts are not supported for {} accounts",
				request.provider
			)));
		}
		let remote_name = account_remote_name(request.provider, auth_method, &id);
		let config = &self.inner.backend_config;

		let (credential, credential_ref, key) = match request.credential {
			CredentialInput::OauthToken { token } => (
				AccountCredential::OAuthToken(credential_json(token, "token")?),
				CredentialRef::Section {
					name: remote_name.clone(),
				},
				None,
			),
			CredentialInput::ServiceAccount { key } => {
				let key = credential_json(key, "key")?;
				let path = config.key_file_path(&remote_name)?;
				(
					AccountCredential::ServiceAccountFile(path.clone()),
					CredentialRef::ServiceAccountFile { path },
					Some(key),
				)
			}
		};

		let mut account = Account {
			id,
			name,
			provider: request.provider,
			credential_ref,
			remote_name,
			auth_method,
			usage: None,
			status: AccountStatus::Active,
			added_at: Utc::now(),
			last_refreshed: None,
		};
		let section = account_section(&account, &credential)?;

		let key_path = match &key {
			Some(key) => Some(config.write_key_file(&account.remote_name, key).await?),
			None => None,
		};
		if let Err(e) = config.upsert_section(section).await {
			self.discard_credentials(&account.remote_name, key_path.as_ref(), false)
				.await;
			return Err(e.into());
		}

		let (usage, status) = self.probe_usage(&account.remote_name).await;
		account.usage = Some(usage);
		account.status = status;
		account.last_refreshed = Some(Utc::now());

		let stored = account.clone();
		if let Err(e) = self
			.commit(move |doc| {
				doc.accounts.push(stored);
				Ok(())
			})
			.await
		{
			self.discard_credentials(&account.remote_name, key_path.as_ref(), true)
				.await;
			return Err(e);
		}

		info!(account_id = %account.id, remote = %account.remote_name, "account added");
		self.publish(PoolEvent::AccountAdded {
			account: account.clone(),
		});
		Ok(account)
	}

	/// Delete an account and drop it from every pool that lists it.
	#[instrument(skip(self), fields(account_id = %id))]
	pub async fn delete_account(&self, id: &AccountId) -> Result<(), OrchestratorError> {
		let affected: Vec<PoolId> = self
			.read(|doc| {
				doc.account(id).map(|_| {
					doc.pools
						.iter()
						.filter(|p| p.has_account(id))
						.map(|p| p.id.clone())
						.collect()
				})
			})
			.await
			.ok_or_else(|| OrchestratorError::AccountNotFound(id.clone()))?;

		let _guards = self.inner.locks.lock_many(&affected).await;

		let (account, removed_from) = self
			.commit(|doc| {
				let position = doc
					.accounts
					.iter()
					.position(|a| &a.id == id)
					.ok_or_else(|| OrchestratorError::AccountNotFound(id.clone()))?;
				let account = doc.accounts.remove(position);

				let mut removed_from = Vec::new();
				for pool in doc.pools.iter_mut().filter(|p| p.has_account(id)) {
					pool.account_ids.retain(|a| a != id);
					pool.touch();
					removed_from.push(pool.id.clone());
				}
				Ok((account, removed_from))
			})
			.await?;

		let key_path = match &account.credential_ref {
			CredentialRef::ServiceAccountFile { path } => Some(path.clone()),
			CredentialRef::Section { .. } => None,
		};
		self.discard_credentials(&account.remote_name, key_path.as_ref(), true)
			.await;

		for pool_id in removed_from {
			self.publish(PoolEvent::PoolAccountRemoved {
				pool_id,
				account_id: id.clone(),
			});
		}
		info!("account deleted");
		self.publish(PoolEvent::AccountDeleted {
			account_id: id.clone(),
		});
		Ok(())
	}

	#[instrument(skip(self), fields(account_id = %id))]
	pub async fn refresh_account_usage(&self, id: &AccountId) -> Result<Account, OrchestratorError> {
		let remote = self
			.read(|doc| doc.account(id).map(|a| a.remote_name.clone()))
			.await
			.ok_or_else(|| OrchestratorError::AccountNotFound(id.clone()))?;

		let (usage, status) = self.probe_usage(&remote).await;
		let account = self
			.commit(|doc| {
				let account = doc
					.account_mut(id)
					.ok_or_else(|| OrchestratorError::AccountNotFound(id.clone()))?;
				account.usage = Some(usage);
				account.status = status;
				account.last_refreshed = Some(Utc::now());
				Ok(account.clone())
			})
			.await?;

		self.publish(PoolEvent::AccountRefreshed {
			account: account.clone(),
		});
		Ok(account)
	}

	/// Probe every account concurrently and publish `stats_updated`.
	#[instrument(skip(self))]
	pub async fn refresh_all_usage(&self) -> Result<Vec<Account>, OrchestratorError> {
		let targets: Vec<(AccountId, String)> = self
			.read(|doc| {
				doc.accounts
					.iter()
					.map(|a| (a.id.clone(), a.remote_name.clone()))
					.collect()
			})
			.await;

		let probes = join_all(targets.iter().map(|(id, remote)| async move {
			(id.clone(), self.probe_usage(remote).await)
		}))
		.await;

		let now = Utc::now();
		let accounts = self
			.commit(move |doc| {
				for (id, (usage, status)) in probes {
					if let Some(account) = doc.account_mut(&id) {
						account.usage = Some(usage);
						account.status = status;
						account.last_refreshed = Some(now);
					}
				}
				Ok(doc.accounts.clone())
			})
			.await?;

		debug!(accounts = accounts.len(), "refreshed account usage");
		self.publish(PoolEvent::StatsUpdated {
			accounts: accounts.clone(),
		});
		Ok(accounts)
	}

	// Queries

	pub async fn pool_stats(&self, id: &PoolId) -> Result<PoolStats, OrchestratorError> {
		let members = self
			.read(|doc| doc.pool(id).map(|p| doc.members_of(p)))
			.await
			.ok_or_else(|| OrchestratorError::PoolNotFound(id.clone()))?;

		let mut stats = PoolStats {
			pool_id: id.clone(),
			account_count: members.len(),
			accounts: Vec::with_capacity(members.len()),
			total_space: 0,
			used_space: 0,
			free_space: 0,
		};
		for account in members {
			if let Some(usage) = &account.usage {
				stats.total_space = stats.total_space.saturating_add(usage.total.unwrap_or(0));
				stats.used_space = stats.used_space.saturating_add(usage.used.unwrap_or(0));
				stats.free_space = stats
					.free_space
					.saturating_add(usage.effective_free().unwrap_or(0));
			}
			stats.accounts.push(AccountUsage {
				id: account.id,
				name: account.name,
				usage: account.usage,
			});
		}
		Ok(stats)
	}

	pub async fn status(&self) -> OrchestratorStatus {
		let (backend_version, backend_error) = match self.inner.executable.version().await {
			Ok(version) => (Some(version), None),
			Err(e) => (None, Some(e.to_string())),
		};
		let (pools, running_pools, accounts, mounts) = self
			.read(|doc| {
				(
					doc.pools.len(),
					doc.pools
						.iter()
						.filter(|p| p.state == LifecycleState::Running)
						.count(),
					doc.accounts.len(),
					doc.mounts.len(),
				)
			})
			.await;

		OrchestratorStatus {
			backend_version,
			backend_error,
			pools,
			running_pools,
			accounts,
			mounts,
			first_port: self.inner.ports.first(),
			last_port: self.inner.ports.last(),
			leased_ports: self.inner.ports.leases().await,
			processes: self.inner.supervisor.running().await,
			subscribers: self.inner.events.subscriber_count(),
			persistence: self.inner.health.lock().await.clone(),
		}
	}

	// Internals

	fn publish(&self, event: PoolEvent) {
		self.inner.events.publish(event);
	}

	async fn read<T>(&self, f: impl FnOnce(&PoolsDocument) -> T) -> T {
		let doc = self.inner.document.lock().await;
		f(&doc)
	}

	/// Apply `mutate` to a copy of the document, persist it, then swap it in.
	/// Nothing changes in memory if validation or persistence fails.
	async fn commit<T, F>(&self, mutate: F) -> Result<T, OrchestratorError>
	where
		F: FnOnce(&mut PoolsDocument) -> Result<T, OrchestratorError>,
	{
		let mut doc = self.inner.document.lock().await;
		let mut next = doc.clone();
		let out = mutate(&mut next)?;
		self.persist(&next).await?;
		*doc = next;
		Ok(out)
	}

	/// Apply `mutate` in memory regardless of persistence. Used for
	/// transitions that already happened, such as a process exiting.
	async fn commit_forced<T, F>(&self, mutate: F) -> T
	where
		F: FnOnce(&mut PoolsDocument) -> T,
	{
		let mut doc = self.inner.document.lock().await;
		let out = mutate(&mut doc);
		if self.persist(&doc).await.is_err() {
			self.inner.health.lock().await.degraded = true;
		}
		out
	}

	async fn persist(&self, doc: &PoolsDocument) -> Result<(), StoreError> {
		let result = self.inner.store.save(doc).await;
		let mut health = self.inner.health.lock().await;
		match &result {
			Ok(()) => {
				if health.degraded {
					info!("persistence recovered");
				}
				health.degraded = false;
				health.last_error = None;
			}
			Err(e) => {
				error!(error = %e, "failed to persist state");
				health.last_error = Some(e.to_string());
			}
		}
		result
	}

	async fn release_ports_of(&self, id: &PoolId) {
		while let Some(lease) = self.inner.ports.lease_for(id).await {
			self.inner.ports.release(lease.port).await;
		}
	}

	async fn probe_usage(&self, remote_name: &str) -> (UsageSnapshot, AccountStatus) {
		match self.inner.executable.about(remote_name).await {
			Ok(usage) => (usage, AccountStatus::Active),
			Err(e) => {
				warn!(remote = remote_name, error = %e, "usage probe failed");
				(UsageSnapshot::failed(e.to_string()), AccountStatus::Error)
			}
		}
	}

	async fn discard_credentials(&self, remote_name: &str, key_path: Option<&PathBuf>, section: bool) {
		let config = &self.inner.backend_config;
		if section {
			if let Err(e) = config.remove_section(remote_name).await {
				warn!(remote = remote_name, error = %e, "failed to remove account section");
			}
		}
		if let Some(path) = key_path {
			if let Err(e) = config.remove_key_file(path).await {
				warn!(path = %path.display(), error = %e, "failed to remove service account key");
			}
		}
	}
}

async fn watch_exits(inner: Weak<Inner>, mut exits: mpsc::UnboundedReceiver<ExitNotice>) {
	while let Some(notice) = exits.recv().await {
		let Some(inner) = inner.upgrade() else {
			break;
		};
		PoolOrchestrator { inner }.handle_exit(notice).await;
	}
}

/// Force every pool to `stopped`, clear mounts and drop dangling members.
/// Returns how many pools were not stopped.
fn reconcile(doc: &mut PoolsDocument) -> usize {
	let known: HashSet<AccountId> = doc.accounts.iter().map(|a| a.id.clone()).collect();
	let mut reset = 0;
	for pool in &mut doc.pools {
		if pool.state != LifecycleState::Stopped {
			reset += 1;
		}
		if pool.state != LifecycleState::Stopped || pool.assigned_port.is_some() {
			pool.mark_stopped();
		}
		let before = pool.account_ids.len();
		pool.account_ids.retain(|id| known.contains(id));
		if pool.account_ids.len() != before {
			warn!(pool_id = %pool.id, dropped = before - pool.account_ids.len(), "dropped unknown pool members");
		}
	}
	doc.mounts.clear();
	reset
}

fn required_name(name: &str, what: &str) -> Result<String, OrchestratorError> {
	let name = name.trim();
	if name.is_empty() {
		return Err(OrchestratorError::Validation(format!("{what} name is required")));
	}
	if name.chars().count() > MAX_NAME_LEN {
		return Err(OrchestratorError::Validation(format!(
			"{what} name is longer than {MAX_NAME_LEN} characters"
		)));
	}
	Ok(name.to_string())
}

fn non_blank(s: String) -> Option<String> {
	let trimmed = s.trim();
	(!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn validate_chunking(chunking: &Chunking) -> Result<(), OrchestratorError> {
	match chunking {
		Chunking::Enabled { chunk_size_bytes: 0 } => Err(OrchestratorError::Validation(
			"chunk size must be greater than zero".to_string(),
		)),
		_ => Ok(()),
	}
}

fn credential_json(value: serde_json::Value, field: &str) -> Result<serde_json::Value, OrchestratorError> {
	let value = match value {
		serde_json::Value::String(text) => serde_json::from_str(&text).map_err(|e| {
			OrchestratorError::Validation(format!("{field} is not valid JSON: {e}"))
		})?,
		other => other,
	};
	if value.is_object() {
		Ok(value)
	} else {
		Err(OrchestratorError::Validation(format!("{field} must be a JSON object")))
	}
}
