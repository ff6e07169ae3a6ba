// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `syncMeetingArchiveCase`: find or create the yearly archive case of an arena.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Stage, StageFailure, StageOutput};
use crate::collaborators::{ArchiveService, CaseRequest};
use crate::config::{ArenaConfig, TitleContext};
use crate::flow::JobName;
use crate::model::Meeting;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    pub recno: i64,
    pub case_number: String,
    pub case_external_id: String,
    pub case_created: bool,
}

pub struct SyncMeetingArchiveCase {
    archive: Arc<dyn ArchiveService>,
}

impl SyncMeetingArchiveCase {
    pub fn new(archive: Arc<dyn ArchiveService>) -> Self {
        Self { archive }
    }
}

#[async_trait]
impl Stage for SyncMeetingArchiveCase {
    fn job(&self) -> JobName {
        JobName::SyncMeetingArchiveCase
    }

    async fn run(&self, meeting: &Meeting, arena: &ArenaConfig) -> Result<StageOutput, StageFailure> {
        let year = meeting.meeting_date.year();
        let external_id = format!("{}-{}", arena.archive.case_external_id_prefix, year);
        let ctx = TitleContext {
            arena: &arena.name,
            meeting_id: &meeting.meeting_id,
            meeting_date: meeting.meeting_date,
        };
        let title = arena
            .archive
            .case_title
            .render(&ctx, || format!("Møtereferater - {} - {}", arena.name, year));

        let request = CaseRequest {
            external_id: external_id.clone(),
            title,
            responsible: arena.archive.responsible.clone(),
            access_code: arena.archive.case_access_code.clone(),
            access_group: arena.archive.case_access_group.clone(),
            paragraph: arena.archive.case_paragraph.clone(),
        };
        let case = self.archive.find_or_create_case(&request).await?;
        info!(
            case_external_id = %external_id,
            case_number = %case.case_number,
            created = case.created,
            "Archive case ready"
        );

        Ok(StageOutput::new(&CaseResult {
            recno: case.recno,
            case_number: case.case_number,
            case_external_id: external_id,
            case_created: case.created,
        })?)
    }
}
