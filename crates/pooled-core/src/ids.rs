// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Typed identifiers for pools and accounts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IdError;

/// Length of the id fragment embedded in backend configuration identifiers.
pub const FRAGMENT_LEN: usize = 8;

macro_rules! define_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);

		impl $name {
			pub fn new() -> Self {
				Self(Uuid::new_v4().to_string())
			}

			/// Wrap an existing string without validation.
			/// Records loaded from disk go through here.
			pub fn from_string(s: String) -> Self {
				Self(s)
			}

			pub fn parse(s: &str) -> Result<Self, IdError> {
				let uuid = Uuid::parse_str(s)?;
				Ok(Self(uuid.to_string()))
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}

			/// First eight characters of the id with separators removed.
			///
			/// Only this fragment ever reaches backend configuration text, so
			/// it is restricted to ASCII alphanumerics; anything else is
			/// dropped and the result may be shorter than [`FRAGMENT_LEN`].
			pub fn fragment(&self) -> String {
				self.0
					.chars()
					.filter(|c| c.is_ascii_alphanumeric())
					.take(FRAGMENT_LEN)
					.collect::<String>()
					.to_ascii_lowercase()
			}
		}

		impl Default for $name {
			fn default() -> Self {
				Self::new()
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl FromStr for $name {
			type Err = IdError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::parse(s)
			}
		}
	};
}

define_id!(
	/// Identifier of a storage pool.
	PoolId
);

define_id!(
	/// Identifier of a cloud-storage account.
	AccountId
);
