// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod backend;
mod http;
mod jobs;
mod logging;
mod paths;
mod ports;
mod supervisor;

pub use backend::{BackendConfig, BackendConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use jobs::{JobsConfig, JobsConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use paths::{PathsConfig, PathsConfigLayer, STATE_FILE_NAME};
pub use ports::{PortsConfig, PortsConfigLayer};
pub use supervisor::{SupervisorConfig, SupervisorConfigLayer};
