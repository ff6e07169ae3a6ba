// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `cleanUpMeeting`: drop cached blobs of an archived meeting.
//!
//! Moving the meeting to the finished store is done by the orchestrator once
//! this stage succeeds.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AttachmentsResult, PdfResult, Stage, StageFailure, StageOutput, prerequisite};
use crate::cache::CacheRegistry;
use crate::config::ArenaConfig;
use crate::flow::JobName;
use crate::model::Meeting;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    pub cleaned_up: bool,
}

pub struct CleanUpMeeting {
    caches: CacheRegistry,
}

impl CleanUpMeeting {
    pub fn new(caches: CacheRegistry) -> Self {
        Self { caches }
    }
}

#[async_trait]
impl Stage for CleanUpMeeting {
    fn job(&self) -> JobName {
        JobName::CleanUpMeeting
    }

    async fn run(&self, meeting: &Meeting, _arena: &ArenaConfig) -> Result<StageOutput, StageFailure> {
        let attachments: AttachmentsResult = prerequisite(meeting, JobName::GetMeetingAttachments)?;
        let pdf: PdfResult = prerequisite(meeting, JobName::CreatePdf)?;

        let pdf_cache = self.caches.open(&pdf.pdf_cache_dir)?;
        pdf_cache.delete(&pdf.cache_key).await?;

        let attachment_cache = self.caches.open(&attachments.attachment_cache_dir)?;
        for record in attachments.all() {
            attachment_cache.delete(&record.cache_key).await?;
        }
        attachment_cache.clear().await?;
        info!(attachments = attachments.all().count(), "Cached blobs removed");

        Ok(StageOutput::new(&CleanupResult { cleaned_up: true })?)
    }
}
