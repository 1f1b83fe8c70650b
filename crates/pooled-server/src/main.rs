// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pooled storage server binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pooled_backend::{BackendConfigFile, RcloneExecutable, ServeOptions};
use pooled_server::{api::AppState, create_router, version};
use pooled_server_config::{LogFormat, ServerConfig};
use pooled_server_pools::{
	EventBus, OrchestratorDeps, OrchestratorSettings, PoolOrchestrator, PortAllocator,
	UsageRefreshJob,
};
use pooled_server_store::JsonFileStore;
use tower_http::{
	cors::{Any, CorsLayer},
	trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pooled storage server - aggregates cloud drives into served pools.
#[derive(Parser, Debug)]
#[command(name = "pooled-server", about = "Pooled storage orchestration server", version)]
struct Args {
	/// Path to a TOML config file (defaults to /etc/pooled/server.toml)
	#[arg(long, env = "POOLED_SERVER_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => pooled_server_config::load_config_with_file(path)?,
		None => pooled_server_config::load_config()?,
	};

	init_tracing(&config);

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		data_dir = %config.paths.data_dir.display(),
		ports = %format!("{}-{}", config.ports.base, config.ports.last()),
		"starting pooled-server"
	);

	tokio::fs::create_dir_all(&config.paths.data_dir)
		.await
		.with_context(|| format!("creating data dir {}", config.paths.data_dir.display()))?;

	let orchestrator = open_orchestrator(&config).await?;

	let usage_job = config.jobs.usage_refresh_enabled.then(|| {
		UsageRefreshJob::new(
			orchestrator.clone(),
			Duration::from_secs(config.jobs.usage_refresh_interval_secs),
		)
	});
	if let Some(job) = &usage_job {
		job.start().await;
	}

	let app = create_router(AppState::new(orchestrator.clone()))
		.layer(TraceLayer::new_for_http())
		.layer(
			CorsLayer::new()
				.allow_origin(Any)
				.allow_methods(Any)
				.allow_headers(Any),
		);

	let addr = config.socket_addr();
	let listener = tokio::net::TcpListener::bind(&addr)
		.await
		.with_context(|| format!("binding {addr}"))?;
	tracing::info!("listening on {}", addr);

	tokio::select! {
		result = axum::serve(listener, app) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "Server error");
			}
		}
		_ = shutdown_signal() => {
			tracing::info!("Received shutdown signal");
		}
	}

	if let Some(job) = &usage_job {
		job.shutdown().await;
	}
	orchestrator.shutdown().await;

	tracing::info!("Server shutdown complete");
	Ok(())
}

fn init_tracing(config: &ServerConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| config.logging.level.clone().into());
	let registry = tracing_subscriber::registry().with(filter);
	match config.logging.format {
		LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
		LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
	}
}

async fn open_orchestrator(config: &ServerConfig) -> anyhow::Result<PoolOrchestrator> {
	let backend = &config.backend;
	let executable = RcloneExecutable::new(&backend.binary, &backend.config_path).with_options(
		ServeOptions {
			vfs_cache_mode: backend.vfs_cache_mode.clone(),
			vfs_cache_max_age: backend.vfs_cache_max_age.clone(),
			buffer_size: backend.buffer_size.clone(),
			log_level: backend.log_level.clone(),
		},
	);

	let orchestrator = PoolOrchestrator::open(OrchestratorDeps {
		store: Arc::new(JsonFileStore::new(config.paths.state_file())),
		executable: Arc::new(executable),
		backend_config: BackendConfigFile::new(&backend.config_path),
		ports: PortAllocator::new(config.ports.base, config.ports.range),
		events: EventBus::default(),
		settings: OrchestratorSettings {
			public_host: config.http.public_host.clone(),
			stop_timeout: config.supervisor.stop_timeout(),
			shutdown_timeout: config.supervisor.shutdown_timeout(),
		},
	})
	.await
	.context("opening pool orchestrator")?;

	Ok(orchestrator)
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!(error = %e, "failed to listen for ctrl-c");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(e) => {
				tracing::error!(error = %e, "failed to listen for SIGTERM");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {}
		_ = terminate => {}
	}
}
