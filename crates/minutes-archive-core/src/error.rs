// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the archive flow engine.
//!
//! The engine distinguishes four kinds of failure:
//!
//! | Kind | Type | Reaches the caller? |
//! |------|------|---------------------|
//! | Validation | [`Error`] | Yes, synchronously, never persisted |
//! | Stage execution | [`StageError`] | No, captured into the job slot and retried later |
//! | Partial batch | [`StageError::PartialBatch`] | No, same as stage execution |
//! | Exhausted retry | none | No, a filter condition reported through observability |

use serde_json::Value;
use thiserror::Error;

use crate::flow::JobName;

/// Result type using the engine [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the caller of an engine operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed input to a contract.
    #[error("validation error on '{field}': {message}")]
    Validation {
        /// The field or argument that failed validation.
        field: String,
        /// What was wrong with it.
        message: String,
    },

    /// A meeting handed to the orchestrator has no identifier.
    #[error("meeting is missing its identifier")]
    MissingMeetingId,

    /// The meeting's flow status has no slot for the requested job.
    #[error("job '{job}' is not defined in the archive flow status of meeting '{meeting_id}'")]
    MissingJobSlot {
        /// Meeting that was being processed.
        meeting_id: String,
        /// The job that has no slot.
        job: JobName,
    },

    /// The stage registered for a job reports a different job name.
    #[error("stage for '{stage}' was registered as job '{job}'")]
    StageMismatch {
        /// Job the orchestrator was asked to run.
        job: JobName,
        /// Job the stage implementation declares.
        stage: JobName,
    },

    /// Configuration loading or validation failed.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Tiered cache operation failed.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// A remote call made outside any stage failed (list resolution, candidate listing).
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

impl Error {
    /// Shorthand for a [`Error::Validation`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors from the tiered cache.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The key contains characters outside `[a-zA-Z0-9._ -]` or is too long.
    #[error("invalid cache key '{key}': {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The cache root could not be used.
    #[error("invalid cache root '{root}': {reason}")]
    InvalidRoot {
        /// The rejected root.
        root: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// `set` was called without a value.
    #[error("value for key '{0}' is missing")]
    MissingValue(String),

    /// Reading or writing the durable file failed.
    #[error("cache I/O error for key '{key}': {source}")]
    Io {
        /// Key being accessed (or `*` for whole-root operations).
        key: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The durable JSON could not be parsed or the value could not be encoded.
    #[error("cache JSON error for key '{key}': {source}")]
    Json {
        /// Key being accessed.
        key: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors returned by external collaborators (list source, archive, renderer, statistics).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum RemoteError {
    /// The remote system answered with a non-success status.
    #[error("remote responded with status {status}")]
    Status {
        /// HTTP-style status code.
        status: u16,
        /// Structured response body, if any.
        body: Value,
    },

    /// The request never produced a response (connection, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// A response arrived but did not have the expected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Failures raised while a stage runs against a valid meeting.
///
/// These are captured into the job slot and drive the retry scheduler;
/// the orchestrator never re-raises them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StageError {
    /// A collaborator call failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A prerequisite stage has not produced a usable result.
    #[error("job '{job}' has not been run or did not return a valid result: {reason}")]
    MissingPrerequisite {
        /// The prerequisite job.
        job: JobName,
        /// What was missing or malformed.
        reason: String,
    },

    /// Meeting data or generated data is unusable (non-retryable in practice).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Some originally requested items are still not updated after reconciliation.
    #[error("failed to update {} item(s): {}", unresolved.len(), unresolved.join(", "))]
    PartialBatch {
        /// Item ids that remain unresolved.
        unresolved: Vec<String>,
    },

    /// Reading or writing a blob cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl StageError {
    /// Diagnostic payload stored in `lastError`.
    ///
    /// Structured remote detail is preferred; everything else falls back to the message.
    pub fn diagnostic(&self) -> Value {
        match self {
            StageError::Remote(RemoteError::Status { status, body }) if !body.is_null() => {
                serde_json::json!({ "status": status, "body": body })
            }
            StageError::PartialBatch { unresolved } => serde_json::json!({
                "message": self.to_string(),
                "unresolvedItems": unresolved,
            }),
            other => Value::String(other.to_string()),
        }
    }
}
