// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `createPdf`: render the meeting document and cache it.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AttachmentsResult, CaseResult, Stage, StageFailure, StageOutput, prerequisite, root_string};
use crate::cache::CacheRegistry;
use crate::collaborators::{DocumentRenderer, RenderItem, RenderRequest};
use crate::config::{ArenaConfig, CacheLayout};
use crate::error::StageError;
use crate::flow::JobName;
use crate::model::Meeting;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfResult {
    pub pdf_cache_dir: String,
    pub cache_key: String,
}

pub struct CreatePdf {
    renderer: Arc<dyn DocumentRenderer>,
    caches: CacheRegistry,
    layout: CacheLayout,
}

impl CreatePdf {
    pub fn new(renderer: Arc<dyn DocumentRenderer>, caches: CacheRegistry, layout: CacheLayout) -> Self {
        Self {
            renderer,
            caches,
            layout,
        }
    }
}

/// Renderer input for a meeting.
pub(crate) fn render_request(
    meeting: &Meeting,
    arena: &ArenaConfig,
    attachments: &AttachmentsResult,
    case: &CaseResult,
) -> RenderRequest {
    RenderRequest {
        meeting_date: meeting.meeting_date.to_string(),
        sector: arena.pdf.sector.clone(),
        meeting_case_number: case.case_number.clone(),
        paragraph: arena.archive.document_paragraph.clone().unwrap_or_default(),
        meeting_title: arena.name.clone(),
        meeting_items: meeting
            .items
            .iter()
            .map(|item| RenderItem {
                title: item.title.clone(),
                description: item.description.clone(),
                item_status: item.item_status.clone(),
                item_type: item.item_type.clone(),
                decision: item.decision.clone(),
                item_responsible_name: item.item_responsible_name.clone(),
                attachments: attachments.names_for(&item.id),
            })
            .collect(),
    }
}

#[async_trait]
impl Stage for CreatePdf {
    fn job(&self) -> JobName {
        JobName::CreatePdf
    }

    async fn run(&self, meeting: &Meeting, arena: &ArenaConfig) -> Result<StageOutput, StageFailure> {
        let attachments: AttachmentsResult = prerequisite(meeting, JobName::GetMeetingAttachments)?;
        let case: CaseResult = prerequisite(meeting, JobName::SyncMeetingArchiveCase)?;

        let request = render_request(meeting, arena, &attachments, &case);
        let bytes = self.renderer.render(&request).await?;
        if bytes.is_empty() {
            return Err(StageError::InvalidData("renderer returned an empty document".to_string()).into());
        }

        let root = self.layout.pdf_root();
        let cache = self.caches.open(&root)?;
        let cache_key = meeting.meeting_id.clone();
        cache.set_as(&cache_key, &STANDARD.encode(&bytes)).await?;
        info!(bytes = bytes.len(), "Meeting document rendered");

        Ok(StageOutput::new(&PdfResult {
            pdf_cache_dir: root_string(&root),
            cache_key,
        })?)
    }
}
