// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The seven pipeline stages.
//!
//! A stage reads an immutable meeting snapshot (including the results of the
//! stages before it) and returns a [`StageOutput`] delta. The orchestrator
//! applies the delta and persists the next snapshot; stages never write the
//! meeting themselves.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::batch::BatchTransport;
use crate::cache::CacheRegistry;
use crate::collaborators::{ArchiveService, DocumentRenderer, ListSource, StatisticsSink};
use crate::config::{ArenaConfig, CacheLayout};
use crate::error::{Error, Result, StageError};
use crate::flow::JobName;
use crate::model::Meeting;

mod archive;
mod attachments;
mod case;
mod cleanup;
mod items;
mod pdf;
mod statistic;

pub use archive::{ArchiveMeeting, ArchiveResult};
pub use attachments::{AttachmentRecord, AttachmentsResult, GetMeetingAttachments, ItemAttachments};
pub use case::{CaseResult, SyncMeetingArchiveCase};
pub use cleanup::{CleanUpMeeting, CleanupResult};
pub use items::{ItemsArchivedInfo, ItemsArchivedResult, SetMeetingItemsToArchived};
pub use pdf::{CreatePdf, PdfResult};
pub use statistic::{CreateStatistic, ENGINE_NAME};

/// What a successful stage adds to its job slot.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub result: Value,
    pub info: Option<Value>,
}

impl StageOutput {
    /// Serialize a typed stage result.
    pub fn new<T: Serialize>(result: &T) -> std::result::Result<Self, StageError> {
        let result = serde_json::to_value(result)
            .map_err(|e| StageError::InvalidData(format!("stage result is not serializable: {e}")))?;
        Ok(Self { result, info: None })
    }

    pub fn with_info(mut self, info: Value) -> Self {
        self.info = Some(info);
        self
    }
}

/// A failed stage run, with working memory to keep for the next attempt.
#[derive(Debug)]
pub struct StageFailure {
    pub error: StageError,
    pub info: Option<Value>,
}

impl From<StageError> for StageFailure {
    fn from(error: StageError) -> Self {
        Self { error, info: None }
    }
}

impl From<crate::error::RemoteError> for StageFailure {
    fn from(error: crate::error::RemoteError) -> Self {
        StageError::from(error).into()
    }
}

impl From<crate::error::CacheError> for StageFailure {
    fn from(error: crate::error::CacheError) -> Self {
        StageError::from(error).into()
    }
}

/// One pipeline stage.
#[async_trait]
pub trait Stage: Send + Sync {
    /// The job slot this stage fills.
    fn job(&self) -> JobName;

    async fn run(
        &self,
        meeting: &Meeting,
        arena: &ArenaConfig,
    ) -> std::result::Result<StageOutput, StageFailure>;
}

/// Shared dependencies of the built-in stages.
#[derive(Clone)]
pub struct StageContext {
    pub list_source: Arc<dyn ListSource>,
    pub batch: Arc<dyn BatchTransport>,
    pub archive: Arc<dyn ArchiveService>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub statistics: Arc<dyn StatisticsSink>,
    pub caches: CacheRegistry,
    pub layout: CacheLayout,
}

/// Stages in pipeline order, one per job.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// The built-in stages.
    pub fn new(ctx: StageContext) -> Self {
        Self {
            stages: vec![
                Box::new(GetMeetingAttachments::new(
                    ctx.list_source.clone(),
                    ctx.caches.clone(),
                    ctx.layout.clone(),
                )),
                Box::new(SyncMeetingArchiveCase::new(ctx.archive.clone())),
                Box::new(CreatePdf::new(
                    ctx.renderer.clone(),
                    ctx.caches.clone(),
                    ctx.layout.clone(),
                )),
                Box::new(ArchiveMeeting::new(ctx.archive.clone(), ctx.caches.clone())),
                Box::new(SetMeetingItemsToArchived::new(ctx.batch.clone())),
                Box::new(CreateStatistic::new(ctx.statistics.clone())),
                Box::new(CleanUpMeeting::new(ctx.caches.clone())),
            ],
        }
    }

    /// Custom stages. There must be exactly one per job, in pipeline order.
    pub fn from_stages(stages: Vec<Box<dyn Stage>>) -> Result<Self> {
        let jobs: Vec<JobName> = stages.iter().map(|stage| stage.job()).collect();
        if jobs != JobName::ALL {
            return Err(Error::validation(
                "pipeline",
                format!("expected stages {:?}, got {:?}", JobName::ALL, jobs),
            ));
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> impl Iterator<Item = &dyn Stage> {
        self.stages.iter().map(|stage| stage.as_ref())
    }

    pub fn stage(&self, job: JobName) -> Option<&dyn Stage> {
        self.stages().find(|stage| stage.job() == job)
    }
}

/// Typed access to a prerequisite job result.
pub(crate) fn prerequisite<T: serde::de::DeserializeOwned>(
    meeting: &Meeting,
    job: JobName,
) -> std::result::Result<T, StageError> {
    meeting.archive_flow_status.required_result(job)
}

/// Root path string stored in results, reopened through the registry later.
pub(crate) fn root_string(path: &std::path::Path) -> String {
    path.display().to_string()
}
