// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the service crate.

use std::path::PathBuf;

use minutes_archive_core::config::ConfigError;
use thiserror::Error;

/// Errors while loading the arena definitions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArenaFileError {
    /// The file could not be read.
    #[error("failed to read arenas file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid arena list.
    #[error("failed to parse arenas file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An arena entry failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An arena list lives outside the configured tenant.
    #[error("arena '{arena}' points to host '{host}', expected '{expected}'")]
    WrongTenant {
        arena: String,
        host: String,
        expected: String,
    },
}
