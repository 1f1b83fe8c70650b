// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pooled storage server.
//!
//! Exposes the pool orchestrator as a JSON API under `/api` and streams its
//! events over a WebSocket at `/api/events`.

pub mod api;
pub mod error;
pub mod routes;
pub mod version;
pub mod websocket;

pub use api::{create_router, AppState};
pub use error::ServerError;
pub use pooled_server_config::ServerConfig;
