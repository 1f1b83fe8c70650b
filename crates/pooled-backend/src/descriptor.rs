// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pool and account descriptors for the backend executable.
//!
//! [`synthesize`] is pure: it validates every identifier that will end up in
//! configuration text and returns a [`BackendDescriptor`]. Turning that into
//! text is a separate, deterministic step via [`BackendDescriptor::render`].

use std::path::PathBuf;

use pooled_core::{
	Account, AccountId, AggregationStrategy, AuthMethod, Chunking, Pool, PoolId, ProviderType,
};
use thiserror::Error;

use crate::ini::{ConfigDocument, IniError, Section};

pub const MAX_IDENTIFIER_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SynthesisError {
	#[error("pool has no member accounts")]
	EmptyPool,

	#[error("unknown account: {0}")]
	UnknownAccount(AccountId),

	#[error("invalid identifier: {0:?}")]
	InvalidIdentifier(String),

	#[error("chunk size must be greater than zero")]
	InvalidChunkSize,

	#[error("{auth:?} credentials are not supported for {provider} accounts")]
	UnsupportedCredential {
		provider: ProviderType,
		auth: AuthMethod,
	},

	#[error("credential could not be encoded: {0}")]
	Credential(String),

	#[error(transparent)]
	Ini(#[from] IniError),
}

/// Identifiers are restricted to `[A-Za-z0-9_]{1,64}`.
pub fn validate_identifier(identifier: &str) -> Result<(), SynthesisError> {
	let ok = !identifier.is_empty()
		&& identifier.len() <= MAX_IDENTIFIER_LEN
		&& identifier
			.bytes()
			.all(|b| b.is_ascii_alphanumeric() || b == b'_');
	if ok {
		Ok(())
	} else {
		Err(SynthesisError::InvalidIdentifier(identifier.to_string()))
	}
}

/// Render a byte count with the largest binary suffix that divides it exactly.
pub fn format_size(bytes: u64) -> String {
	const UNITS: [(u64, &str); 5] = [
		(1 << 50, "P"),
		(1 << 40, "T"),
		(1 << 30, "G"),
		(1 << 20, "M"),
		(1 << 10, "K"),
	];
	if bytes > 0 {
		for (size, suffix) in UNITS {
			if bytes % size == 0 {
				return format!("{}{suffix}", bytes / size);
			}
		}
	}
	format!("{bytes}B")
}

/// Action, create and search policies handed to the union backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicySet {
	pub action: &'static str,
	pub create: &'static str,
	pub search: &'static str,
}

impl PolicySet {
	pub fn for_strategy(strategy: AggregationStrategy) -> Self {
		let (action, create, search) = match strategy {
			AggregationStrategy::Spread => ("epall", "eplus", "ff"),
			AggregationStrategy::MostFreeSpace => ("epall", "epmfs", "ff"),
			AggregationStrategy::FirstAvailable => ("epall", "epff", "ff"),
			AggregationStrategy::Mirror => ("all", "all", "ff"),
		};
		Self {
			action,
			create,
			search,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkerSpec {
	pub name: String,
	pub chunk_size: String,
}

/// Validated configuration for serving one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
	pub pool_id: PoolId,
	pub union_name: String,
	/// `<remote>:` references in membership order.
	pub upstreams: Vec<String>,
	pub policies: PolicySet,
	pub chunker: Option<ChunkerSpec>,
}

pub fn union_section_name(pool_id: &PoolId) -> String {
	format!("pool_{}", pool_id.fragment())
}

pub fn chunker_section_name(pool_id: &PoolId) -> String {
	format!("{}_chunker", union_section_name(pool_id))
}

/// Build the descriptor for `pool` using `accounts` as the lookup set.
pub fn synthesize(pool: &Pool, accounts: &[Account]) -> Result<BackendDescriptor, SynthesisError> {
	if pool.account_ids.is_empty() {
		return Err(SynthesisError::EmptyPool);
	}

	let mut upstreams = Vec::with_capacity(pool.account_ids.len());
	for id in &pool.account_ids {
		let account = accounts
			.iter()
			.find(|a| &a.id == id)
			.ok_or_else(|| SynthesisError::UnknownAccount(id.clone()))?;
		validate_identifier(&account.remote_name)?;
		upstreams.push(format!("{}:", account.remote_name));
	}

	let union_name = union_section_name(&pool.id);
	validate_identifier(&union_name)?;

	let chunker = match pool.chunking {
		Chunking::Disabled => None,
		Chunking::Enabled { chunk_size_bytes: 0 } => return Err(SynthesisError::InvalidChunkSize),
		Chunking::Enabled { chunk_size_bytes } => {
			let name = chunker_section_name(&pool.id);
			validate_identifier(&name)?;
			Some(ChunkerSpec {
				name,
				chunk_size: format_size(chunk_size_bytes),
			})
		}
	};

	Ok(BackendDescriptor {
		pool_id: pool.id.clone(),
		union_name,
		upstreams,
		policies: PolicySet::for_strategy(pool.strategy),
		chunker,
	})
}

impl BackendDescriptor {
	/// Section the serve command points at.
	pub fn serve_remote(&self) -> &str {
		match &self.chunker {
			Some(chunker) => &chunker.name,
			None => &self.union_name,
		}
	}

	pub fn sections(&self) -> Vec<Section> {
		let mut sections = vec![Section::new(&self.union_name)
			.with("type", "union")
			.with("upstreams", self.upstreams.join(" "))
			.with("action_policy", self.policies.action)
			.with("create_policy", self.policies.create)
			.with("search_policy", self.policies.search)];

		if let Some(chunker) = &self.chunker {
			sections.push(
				Section::new(&chunker.name)
					.with("type", "chunker")
					.with("remote", format!("{}:", self.union_name))
					.with("chunk_size", &chunker.chunk_size)
					.with("hash_type", "md5"),
			);
		}
		sections
	}

	pub fn to_document(&self) -> Result<ConfigDocument, SynthesisError> {
		let mut doc = ConfigDocument::new();
		for section in self.sections() {
			doc.upsert_section(section)?;
		}
		Ok(doc)
	}

	pub fn render(&self) -> Result<String, SynthesisError> {
		Ok(self.to_document()?.render())
	}
}

/// Credential material supplied when an account is registered.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountCredential {
	/// OAuth token JSON as produced by the provider's authorize flow.
	OAuthToken(serde_json::Value),
	/// Path of a service account key already written to disk.
	ServiceAccountFile(PathBuf),
}

impl AccountCredential {
	pub fn auth_method(&self) -> AuthMethod {
		match self {
			AccountCredential::OAuthToken(_) => AuthMethod::OAuth,
			AccountCredential::ServiceAccountFile(_) => AuthMethod::ServiceAccount,
		}
	}
}

/// Backend identifier for a new account: `<type>_<fragment>` or `<type>_sa_<fragment>`.
pub fn account_remote_name(provider: ProviderType, auth: AuthMethod, id: &AccountId) -> String {
	match auth {
		AuthMethod::OAuth => format!("{}_{}", provider.as_str(), id.fragment()),
		AuthMethod::ServiceAccount => format!("{}_sa_{}", provider.as_str(), id.fragment()),
	}
}

/// Remote section for an account.
pub fn account_section(
	account: &Account,
	credential: &AccountCredential,
) -> Result<Section, SynthesisError> {
	validate_identifier(&account.remote_name)?;

	let section = Section::new(&account.remote_name).with("type", account.provider.backend_type());
	let section = match (account.provider, credential) {
		(ProviderType::Google, AccountCredential::OAuthToken(token)) => section
			.with("scope", "drive")
			.with("token", encode_token(token)?)
			.with("team_drive", ""),
		(ProviderType::Microsoft, AccountCredential::OAuthToken(token)) => section
			.with("token", encode_token(token)?)
			.with("drive_type", "personal"),
		(ProviderType::Google, AccountCredential::ServiceAccountFile(path)) => section
			.with("scope", "drive")
			.with("service_account_file", path.display().to_string())
			.with("team_drive", ""),
		(provider, credential) => {
			return Err(SynthesisError::UnsupportedCredential {
				provider,
				auth: credential.auth_method(),
			})
		}
	};
	Ok(section)
}

fn encode_token(token: &serde_json::Value) -> Result<String, SynthesisError> {
	serde_json::to_string(token).map_err(|e| SynthesisError::Credential(e.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use pooled_core::CredentialRef;
	use proptest::prelude::*;

	fn account(remote_name: &str) -> Account {
		Account {
			id: AccountId::new(),
			name: remote_name.to_string(),
			provider: ProviderType::Google,
			credential_ref: CredentialRef::Section {
				name: remote_name.to_string(),
			},
			remote_name: remote_name.to_string(),
			auth_method: AuthMethod::OAuth,
			usage: None,
			status: Default::default(),
			added_at: Utc::now(),
			last_refreshed: None,
		}
	}

	fn pool_with(accounts: &[Account]) -> Pool {
		let mut pool = Pool::new("Media");
		pool.id = PoolId::from_string("abcd1234-0000-4000-8000-000000000000".to_string());
		pool.account_ids = accounts.iter().map(|a| a.id.clone()).collect();
		pool
	}

	#[test]
	fn spread_pool_renders_union_section() {
		let a = account("google_11111111");
		let b = account("microsoft_22222222");
		let mut pool = pool_with(&[a.clone(), b.clone()]);
		pool.strategy = AggregationStrategy::Spread;

		let descriptor = synthesize(&pool, &[b, a]).unwrap();
		assert_eq!(descriptor.serve_remote(), "pool_abcd1234");
		assert_eq!(
			descriptor.render().unwrap(),
			"[pool_abcd1234]\n\
			 type = union\n\
			 upstreams = google_11111111: microsoft_22222222:\n\
			 action_policy = epall\n\
			 create_policy = eplus\n\
			 search_policy = ff\n"
		);
	}

	#[test]
	fn chunking_wraps_union() {
		let a = account("google_11111111");
		let mut pool = pool_with(&[a.clone()]);
		pool.chunking = Chunking::Enabled {
			chunk_size_bytes: 2 * 1024 * 1024 * 1024,
		};

		let descriptor = synthesize(&pool, &[a]).unwrap();
		assert_eq!(descriptor.serve_remote(), "pool_abcd1234_chunker");
		let doc = descriptor.to_document().unwrap();
		let chunker = doc.section("pool_abcd1234_chunker").unwrap();
		assert_eq!(chunker.get("remote"), Some("pool_abcd1234:"));
		assert_eq!(chunker.get("chunk_size"), Some("2G"));
		assert_eq!(chunker.get("hash_type"), Some("md5"));
	}

	#[test]
	fn empty_pool_is_rejected() {
		let pool = pool_with(&[]);
		assert_eq!(synthesize(&pool, &[]), Err(SynthesisError::EmptyPool));
	}

	#[test]
	fn unknown_member_is_rejected() {
		let a = account("google_11111111");
		let pool = pool_with(&[a.clone()]);
		assert_eq!(
			synthesize(&pool, &[]),
			Err(SynthesisError::UnknownAccount(a.id))
		);
	}

	#[test]
	fn injected_remote_name_is_rejected() {
		let a = account("google_1]\n[evil");
		let pool = pool_with(&[a.clone()]);
		assert!(matches!(
			synthesize(&pool, &[a]),
			Err(SynthesisError::InvalidIdentifier(_))
		));
	}

	#[test]
	fn zero_chunk_size_is_rejected() {
		let a = account("google_11111111");
		let mut pool = pool_with(&[a.clone()]);
		pool.chunking = Chunking::Enabled { chunk_size_bytes: 0 };
		assert_eq!(synthesize(&pool, &[a]), Err(SynthesisError::InvalidChunkSize));
	}

	#[test]
	fn strategy_policies() {
		let mirror = PolicySet::for_strategy(AggregationStrategy::Mirror);
		assert_eq!((mirror.action, mirror.create, mirror.search), ("all", "all", "ff"));
		let mfs = PolicySet::for_strategy(AggregationStrategy::MostFreeSpace);
		assert_eq!(mfs.create, "epmfs");
		let ff = PolicySet::for_strategy(AggregationStrategy::FirstAvailable);
		assert_eq!(ff.create, "epff");
	}

	#[test]
	fn sizes_use_binary_suffixes() {
		assert_eq!(format_size(64 * 1024 * 1024), "64M");
		assert_eq!(format_size(1536), "1536B");
		assert_eq!(format_size(1 << 40), "1T");
		assert_eq!(format_size(0), "0B");
	}

	#[test]
	fn google_oauth_account_section() {
		let a = account("google_11111111");
		let token = serde_json::json!({"access_token": "x", "expiry": "2025-01-01T00:00:00Z"});
		let section = account_section(&a, &AccountCredential::OAuthToken(token)).unwrap();
		assert_eq!(section.get("type"), Some("drive"));
		assert_eq!(section.get("scope"), Some("drive"));
		assert!(section.get("token").unwrap().starts_with('{'));
	}

	#[test]
	fn microsoft_service_account_is_unsupported() {
		let mut a = account("microsoft_sa_11111111");
		a.provider = ProviderType::Microsoft;
		let err = account_section(&a, &AccountCredential::ServiceAccountFile("/config/x.json".into()))
			.unwrap_err();
		assert!(matches!(err, SynthesisError::UnsupportedCredential { .. }));
	}

	#[test]
	fn remote_names_embed_fragment() {
		let id = AccountId::from_string("ABCDEF12-3456-4000-8000-000000000000".to_string());
		assert_eq!(
			account_remote_name(ProviderType::Google, AuthMethod::OAuth, &id),
			"google_abcdef12"
		);
		assert_eq!(
			account_remote_name(ProviderType::Microsoft, AuthMethod::ServiceAccount, &id),
			"microsoft_sa_abcdef12"
		);
	}

	proptest! {
		#[test]
		fn identifier_allow_list(s in "\\PC{0,80}") {
			let expected = !s.is_empty()
				&& s.len() <= MAX_IDENTIFIER_LEN
				&& s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
			prop_assert_eq!(validate_identifier(&s).is_ok(), expected);
		}

		#[test]
		fn synthesis_is_deterministic(names in proptest::collection::vec("[a-z]{1,8}_[0-9a-f]{8}", 1..5)) {
			let accounts: Vec<Account> = names.iter().map(|n| account(n)).collect();
			let pool = pool_with(&accounts);
			let first = synthesize(&pool, &accounts).unwrap().render().unwrap();
			let second = synthesize(&pool, &accounts).unwrap().render().unwrap();
			prop_assert_eq!(first, second);
		}
	}
}
