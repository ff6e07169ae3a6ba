// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `archiveMeeting`: file the rendered document and attachments in the archive case.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::attachments::AttachmentBlob;
use super::{AttachmentsResult, CaseResult, PdfResult, Stage, StageFailure, StageOutput, prerequisite};
use crate::cache::CacheRegistry;
use crate::collaborators::{ArchiveService, DocumentFile, DocumentRequest};
use crate::config::{ArenaConfig, TitleContext, pretty_date};
use crate::error::StageError;
use crate::flow::JobName;
use crate::model::Meeting;

/// Shortest acceptable document title.
const MIN_TITLE_LEN: usize = 5;

const LATE_ARCHIVING_SUFFIX: &str = " - Etterarkivering";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveResult {
    pub recno: i64,
    pub document_number: String,
    /// Title without the late-archiving suffix, used for lookups.
    pub search_title: String,
    /// The case already held a filed document with this title.
    #[serde(rename = "isEtterarkivering")]
    pub late_archiving: bool,
}

pub struct ArchiveMeeting {
    archive: Arc<dyn ArchiveService>,
    caches: CacheRegistry,
}

impl ArchiveMeeting {
    pub fn new(archive: Arc<dyn ArchiveService>, caches: CacheRegistry) -> Self {
        Self { archive, caches }
    }
}

/// Document title from the arena's title strategy.
pub(crate) fn document_title(meeting: &Meeting, arena: &ArenaConfig) -> Result<String, StageError> {
    let ctx = TitleContext {
        arena: &arena.name,
        meeting_id: &meeting.meeting_id,
        meeting_date: meeting.meeting_date,
    };
    let title = arena.archive.document_title.render(&ctx, || {
        format!("Møtereferat - {} - {}", arena.name, pretty_date(meeting.meeting_date))
    });
    if title.chars().count() < MIN_TITLE_LEN {
        return Err(StageError::InvalidData(format!(
            "generated document title \"{title}\" is shorter than {MIN_TITLE_LEN} characters"
        )));
    }
    Ok(title)
}

#[async_trait]
impl Stage for ArchiveMeeting {
    fn job(&self) -> JobName {
        JobName::ArchiveMeeting
    }

    async fn run(&self, meeting: &Meeting, arena: &ArenaConfig) -> Result<StageOutput, StageFailure> {
        let title = document_title(meeting, arena)?;
        let attachments: AttachmentsResult = prerequisite(meeting, JobName::GetMeetingAttachments)?;
        let case: CaseResult = prerequisite(meeting, JobName::SyncMeetingArchiveCase)?;
        let pdf: PdfResult = prerequisite(meeting, JobName::CreatePdf)?;

        let mut late_archiving = false;
        if !case.case_created {
            let filed = self
                .archive
                .count_filed_documents(&title, &case.case_number)
                .await?;
            if filed > 0 {
                info!(filed, case_number = %case.case_number, "Meeting already archived in case, marking as late archiving");
                late_archiving = true;
            }
        }

        let pdf_cache = self.caches.open(&pdf.pdf_cache_dir)?;
        let pdf_base64: String = pdf_cache
            .get_as(&pdf.cache_key)
            .await?
            .ok_or_else(|| StageError::MissingPrerequisite {
                job: JobName::CreatePdf,
                reason: "rendered document is missing from the cache".to_string(),
            })?;

        let attachment_cache = self.caches.open(&attachments.attachment_cache_dir)?;
        let mut files = vec![DocumentFile {
            title: title.clone(),
            extension: "pdf".to_string(),
            base64: pdf_base64,
        }];
        for record in attachments.all() {
            let blob: AttachmentBlob = attachment_cache
                .get_as(&record.cache_key)
                .await?
                .ok_or_else(|| StageError::MissingPrerequisite {
                    job: JobName::GetMeetingAttachments,
                    reason: format!("attachment {} is missing from the cache", record.name),
                })?;
            files.push(DocumentFile {
                title: record.name.clone(),
                extension: record.extension.clone(),
                base64: blob.base64,
            });
        }

        let archive_title = if late_archiving {
            format!("{title}{LATE_ARCHIVING_SUFFIX}")
        } else {
            title.clone()
        };
        let request = DocumentRequest {
            case_number: case.case_number.clone(),
            title: archive_title,
            document_date: meeting.meeting_date.to_string(),
            responsible: arena.archive.responsible.clone(),
            access_code: arena.archive.document_access_code.clone(),
            access_group: arena.archive.document_access_group.clone(),
            paragraph: arena.archive.document_paragraph.clone(),
            files,
        };
        let document = self.archive.file_document(&request).await?;
        info!(
            document_number = %document.document_number,
            attachments = request.files.len() - 1,
            "Meeting document filed"
        );

        // Blobs can be large; the durable copies stay until cleanup
        attachment_cache.clear_memory();
        pdf_cache.clear_memory();

        Ok(StageOutput::new(&ArchiveResult {
            recno: document.recno,
            document_number: document.document_number,
            search_title: title,
            late_archiving,
        })?)
    }
}
