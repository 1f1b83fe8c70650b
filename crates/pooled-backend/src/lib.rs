// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Everything that touches the external aggregation executable.
//!
//! - [`descriptor`] turns a pool and its member accounts into a validated
//!   [`BackendDescriptor`].
//! - [`ini`] is the named-section model used to render and edit the
//!   executable's configuration file.
//! - [`config_file`] owns that file on disk.
//! - [`executable`] builds serve commands and runs usage probes.

pub mod config_file;
pub mod descriptor;
pub mod executable;
pub mod ini;

pub use config_file::{BackendConfigFile, ConfigFileError};
pub use descriptor::{
	account_section, format_size, synthesize, validate_identifier, AccountCredential,
	account_remote_name, chunker_section_name, union_section_name, BackendDescriptor, ChunkerSpec,
	PolicySet, SynthesisError, MAX_IDENTIFIER_LEN,
};
pub use executable::{BackendError, BackendExecutable, RcloneExecutable, ServeOptions, ServeRequest};
pub use ini::{ConfigDocument, IniError, Section};
