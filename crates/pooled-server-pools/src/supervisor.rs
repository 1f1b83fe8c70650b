// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Backend process supervision.
//!
//! The supervisor owns every child process, keyed by pool id. Each child gets
//! a monitor task that waits for either its exit or a stop request. An exit
//! nobody asked for is reported on the [`ExitNotice`] channel; the supervisor
//! itself never restarts anything.

use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use pooled_core::{LifecycleState, PoolEvent, PoolId};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::SupervisorError;
use crate::events::EventBus;

/// Stderr lines retained for crash reports.
pub const STDERR_TAIL_LINES: usize = 50;

const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Sent to the orchestrator when a backend exits without being asked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitNotice {
	pub pool_id: PoolId,
	pub port: u16,
	pub exit_code: Option<i32>,
	pub output: Vec<String>,
}

/// Outcome of a requested stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
	/// The process ignored the termination request and was killed.
	pub forced: bool,
	pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
	pub pool_id: PoolId,
	pub state: LifecycleState,
	pub pid: Option<u32>,
	pub port: u16,
}

struct StopRequest {
	grace: Duration,
	reply: oneshot::Sender<ExitReport>,
}

struct Entry {
	state: LifecycleState,
	pid: Option<u32>,
	port: u16,
	stop_tx: Option<oneshot::Sender<StopRequest>>,
	/// Cuts a pending stop's grace period short.
	force_tx: Option<oneshot::Sender<()>>,
	/// Callers of `kill` waiting on a stop someone else requested.
	waiters: Vec<oneshot::Sender<ExitReport>>,
}

type Registry = Arc<Mutex<HashMap<PoolId, Entry>>>;
type OutputTail = Arc<Mutex<VecDeque<String>>>;

pub struct ProcessSupervisor {
	registry: Registry,
	events: EventBus,
	exits: mpsc::UnboundedSender<ExitNotice>,
}

impl ProcessSupervisor {
	pub fn new(events: EventBus) -> (Self, mpsc::UnboundedReceiver<ExitNotice>) {
		let (exits, exit_rx) = mpsc::unbounded_channel();
		let supervisor = Self {
			registry: Arc::new(Mutex::new(HashMap::new())),
			events,
			exits,
		};
		(supervisor, exit_rx)
	}

	/// Spawn `command` as the backend for `pool_id`. Returns the child pid.
	///
	/// The registry lock is held from the conflict check until the monitor
	/// task owns the child, with no await in between, so a caller dropped
	/// mid-start never leaves an entry without a monitor.
	#[instrument(skip(self, pool_id, command), fields(pool_id = %pool_id))]
	pub async fn start(
		&self,
		pool_id: &PoolId,
		port: u16,
		mut command: Command,
	) -> Result<Option<u32>, SupervisorError> {
		let mut registry = self.registry.lock().await;
		if let Some(entry) = registry.get(pool_id) {
			return Err(match entry.state {
				LifecycleState::Starting => SupervisorError::AlreadyStarting(pool_id.clone()),
				LifecycleState::Stopping => SupervisorError::AlreadyStopping(pool_id.clone()),
				_ => SupervisorError::AlreadyRunning(pool_id.clone()),
			});
		}

		command
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);

		let mut child = match command.spawn() {
			Ok(child) => child,
			Err(e) => {
				warn!(error = %e, "failed to spawn backend");
				return Err(SupervisorError::SpawnFailed {
					pool_id: pool_id.clone(),
					message: e.to_string(),
				});
			}
		};

		let pid = child.id();
		let tail: OutputTail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
		let mut readers = Vec::with_capacity(2);
		if let Some(stdout) = child.stdout.take() {
			readers.push(self.spawn_reader(pool_id.clone(), stdout, None));
		}
		if let Some(stderr) = child.stderr.take() {
			readers.push(self.spawn_reader(pool_id.clone(), stderr, Some(Arc::clone(&tail))));
		}

		let (stop_tx, stop_rx) = oneshot::channel();
		let (force_tx, force_rx) = oneshot::channel();
		registry.insert(
			pool_id.clone(),
			Entry {
				state: LifecycleState::Running,
				pid,
				port,
				stop_tx: Some(stop_tx),
				force_tx: Some(force_tx),
				waiters: Vec::new(),
			},
		);

		tokio::spawn(monitor(
			pool_id.clone(),
			port,
			child,
			stop_rx,
			force_rx,
			readers,
			tail,
			Arc::clone(&self.registry),
			self.exits.clone(),
		));
		drop(registry);

		info!(pid, port, "backend started");
		Ok(pid)
	}

	/// Ask the backend to terminate, forcing a kill after `grace`.
	#[instrument(skip(self, pool_id), fields(pool_id = %pool_id))]
	pub async fn stop(&self, pool_id: &PoolId, grace: Duration) -> Result<ExitReport, SupervisorError> {
		let (reply_tx, reply_rx) = oneshot::channel();
		{
			let mut registry = self.registry.lock().await;
			let entry = registry
				.get_mut(pool_id)
				.ok_or_else(|| SupervisorError::NotRunning(pool_id.clone()))?;
			match entry.state {
				LifecycleState::Running => {}
				LifecycleState::Stopping => return Err(SupervisorError::AlreadyStopping(pool_id.clone())),
				_ => return Err(SupervisorError::NotRunning(pool_id.clone())),
			}
			let stop_tx = entry
				.stop_tx
				.take()
				.ok_or_else(|| SupervisorError::NotRunning(pool_id.clone()))?;
			entry.state = LifecycleState::Stopping;
			if stop_tx
				.send(StopRequest {
					grace,
					reply: reply_tx,
				})
				.is_err()
			{
				registry.remove(pool_id);
				return Err(SupervisorError::NotRunning(pool_id.clone()));
			}
		}

		let report = reply_rx
			.await
			.map_err(|_| SupervisorError::MonitorLost(pool_id.clone()))?;
		info!(forced = report.forced, exit_code = ?report.exit_code, "backend stopped");
		Ok(report)
	}

	/// Stop with no grace period. A stop already in progress is escalated
	/// and the caller waits for its outcome.
	#[instrument(skip(self, pool_id), fields(pool_id = %pool_id))]
	pub async fn kill(&self, pool_id: &PoolId) -> Result<ExitReport, SupervisorError> {
		let waiter = {
			let mut registry = self.registry.lock().await;
			let entry = registry
				.get_mut(pool_id)
				.ok_or_else(|| SupervisorError::NotRunning(pool_id.clone()))?;
			if entry.state == LifecycleState::Stopping {
				if let Some(force_tx) = entry.force_tx.take() {
					let _ = force_tx.send(());
				}
				let (tx, rx) = oneshot::channel();
				entry.waiters.push(tx);
				Some(rx)
			} else {
				None
			}
		};

		match waiter {
			Some(rx) => {
				let report = rx
					.await
					.map_err(|_| SupervisorError::MonitorLost(pool_id.clone()))?;
				info!(exit_code = ?report.exit_code, "pending stop escalated to kill");
				Ok(report)
			}
			None => self.stop(pool_id, Duration::ZERO).await,
		}
	}

	/// `None` when no process exists for the pool.
	pub async fn state(&self, pool_id: &PoolId) -> Option<LifecycleState> {
		self.registry.lock().await.get(pool_id).map(|e| e.state)
	}

	pub async fn pid(&self, pool_id: &PoolId) -> Option<u32> {
		self.registry.lock().await.get(pool_id).and_then(|e| e.pid)
	}

	pub async fn running(&self) -> Vec<ProcessInfo> {
		let mut processes: Vec<ProcessInfo> = self
			.registry
			.lock()
			.await
			.iter()
			.map(|(pool_id, entry)| ProcessInfo {
				pool_id: pool_id.clone(),
				state: entry.state,
				pid: entry.pid,
				port: entry.port,
			})
			.collect();
		processes.sort_by_key(|p| p.port);
		processes
	}

	fn spawn_reader<R>(&self, pool_id: PoolId, stream: R, tail: Option<OutputTail>) -> JoinHandle<()>
	where
		R: AsyncRead + Unpin + Send + 'static,
	{
		let events = self.events.clone();
		tokio::spawn(async move {
			let mut lines = BufReader::new(stream).lines();
			while let Ok(Some(line)) = lines.next_line().await {
				match &tail {
					Some(tail) => {
						{
							let mut tail = tail.lock().await;
							if tail.len() == STDERR_TAIL_LINES {
								tail.pop_front();
							}
							tail.push_back(line.clone());
						}
						events.publish(PoolEvent::PoolError {
							pool_id: pool_id.clone(),
							message: line,
						});
					}
					None => events.publish(PoolEvent::PoolLog {
						pool_id: pool_id.clone(),
						message: line,
					}),
				}
			}
		})
	}
}

#[allow(clippy::too_many_arguments)]
async fn monitor(
	pool_id: PoolId,
	port: u16,
	mut child: Child,
	mut stop_rx: oneshot::Receiver<StopRequest>,
	mut force_rx: oneshot::Receiver<()>,
	readers: Vec<JoinHandle<()>>,
	tail: OutputTail,
	registry: Registry,
	exits: mpsc::UnboundedSender<ExitNotice>,
) {
	tokio::select! {
		status = child.wait() => {
			let exit_code = status.ok().and_then(|s| s.code());
			drain(readers).await;

			let report = ExitReport { forced: false, exit_code };
			if retire(&registry, &pool_id, report).await == Some(LifecycleState::Stopping) {
				// A stop request raced with the exit; answer it instead of
				// reporting a crash.
				if let Ok(request) = stop_rx.try_recv() {
					let _ = request.reply.send(report);
				}
				return;
			}

			let output: Vec<String> = tail.lock().await.iter().cloned().collect();
			warn!(pool_id = %pool_id, port, exit_code = ?exit_code, "backend exited unexpectedly");
			let _ = exits.send(ExitNotice {
				pool_id,
				port,
				exit_code,
				output,
			});
		}
		request = &mut stop_rx => {
			match request {
				Ok(request) => {
					let report = terminate(&pool_id, &mut child, request.grace, &mut force_rx).await;
					drain(readers).await;
					retire(&registry, &pool_id, report).await;
					let _ = request.reply.send(report);
				}
				Err(_) => {
					// Supervisor dropped.
					let _ = child.kill().await;
					registry.lock().await.remove(&pool_id);
				}
			}
		}
	}
}

/// Remove the entry and answer every `kill` caller waiting on it.
async fn retire(registry: &Registry, pool_id: &PoolId, report: ExitReport) -> Option<LifecycleState> {
	let entry = registry.lock().await.remove(pool_id)?;
	for waiter in entry.waiters {
		let _ = waiter.send(report);
	}
	Some(entry.state)
}

async fn terminate(
	pool_id: &PoolId,
	child: &mut Child,
	grace: Duration,
	force: &mut oneshot::Receiver<()>,
) -> ExitReport {
	if !grace.is_zero() {
		if let Some(pid) = child.id() {
			if request_termination(pid) {
				tokio::select! {
					exited = tokio::time::timeout(grace, child.wait()) => match exited {
						Ok(Ok(status)) => {
							return ExitReport {
								forced: false,
								exit_code: status.code(),
							}
						}
						Ok(Err(e)) => warn!(pool_id = %pool_id, error = %e, "wait failed after termination request"),
						Err(_) => warn!(pool_id = %pool_id, grace_secs = grace.as_secs(), "backend ignored termination request"),
					},
					_ = force => warn!(pool_id = %pool_id, "stop escalated before the grace period ended"),
				}
			}
		}
	}

	if let Err(e) = child.kill().await {
		debug!(pool_id = %pool_id, error = %e, "kill failed, process likely gone");
	}
	let exit_code = child.try_wait().ok().flatten().and_then(|s| s.code());
	ExitReport {
		forced: true,
		exit_code,
	}
}

async fn drain(readers: Vec<JoinHandle<()>>) {
	let _ = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, futures::future::join_all(readers)).await;
}

#[cfg(unix)]
fn request_termination(pid: u32) -> bool {
	let Ok(pid) = libc::pid_t::try_from(pid) else {
		return false;
	};
	// SAFETY: kill(2) has no memory-safety preconditions.
	unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn request_termination(_pid: u32) -> bool {
	false
}
