// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Domain model shared by every pooled storage crate.
//!
//! A [`Pool`] aggregates several [`Account`]s behind one served endpoint. The
//! persisted form of all records is a single [`PoolsDocument`], and every
//! observable change is described by a [`PoolEvent`].

pub mod document;
pub mod error;
pub mod event;
pub mod ids;
pub mod model;

pub use document::{MountRecord, PoolsDocument};
pub use error::IdError;
pub use event::PoolEvent;
pub use ids::{AccountId, PoolId};
pub use model::{
	Account, AccountStatus, AggregationStrategy, AuthMethod, Chunking, CredentialRef,
	LifecycleState, Pool, PoolStatus, ProviderType, ServeProtocol, UsageSnapshot,
};
