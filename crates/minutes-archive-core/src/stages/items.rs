// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `setMeetingItemsToArchived`: write the document number back to every item.
//!
//! Confirmed items accumulate in the slot's `info` across attempts, so a
//! retry only re-submits the items that are still unresolved.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::{ArchiveResult, Stage, StageFailure, StageOutput, prerequisite};
use crate::batch::{self, BatchRequest, BatchTransport, FailedItem, FinishedItem};
use crate::config::{ArenaConfig, pretty_date};
use crate::error::StageError;
use crate::flow::JobName;
use crate::model::{Meeting, PublishFlag};
use crate::schema::columns;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsArchivedResult {
    pub finished_items: Vec<FinishedItem>,
}

/// Accounting carried between attempts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemsArchivedInfo {
    pub batch_requests: Vec<Vec<BatchRequest>>,
    pub finished_items: Vec<FinishedItem>,
    pub failed_items: Vec<FailedItem>,
}

pub struct SetMeetingItemsToArchived {
    transport: Arc<dyn BatchTransport>,
}

impl SetMeetingItemsToArchived {
    pub fn new(transport: Arc<dyn BatchTransport>) -> Self {
        Self { transport }
    }
}

fn previous_info(meeting: &Meeting) -> Result<ItemsArchivedInfo, StageError> {
    let info = meeting
        .archive_flow_status
        .job(JobName::SetMeetingItemsToArchived)
        .and_then(|slot| slot.info.clone());
    match info {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| StageError::InvalidData(format!("stored batch accounting is unreadable: {e}"))),
        None => Ok(ItemsArchivedInfo::default()),
    }
}

fn to_value(info: &ItemsArchivedInfo) -> Option<Value> {
    serde_json::to_value(info).ok()
}

#[async_trait]
impl Stage for SetMeetingItemsToArchived {
    fn job(&self) -> JobName {
        JobName::SetMeetingItemsToArchived
    }

    async fn run(&self, meeting: &Meeting, _arena: &ArenaConfig) -> Result<StageOutput, StageFailure> {
        let archived: ArchiveResult = prerequisite(meeting, JobName::ArchiveMeeting)?;
        let archived_at = meeting
            .archive_flow_status
            .job(JobName::ArchiveMeeting)
            .and_then(|slot| slot.finished_timestamp)
            .ok_or_else(|| StageError::MissingPrerequisite {
                job: JobName::ArchiveMeeting,
                reason: "job has no finished timestamp".to_string(),
            })?;

        let mut info = previous_info(meeting)?;
        let requested = meeting.item_ids();
        let pending = batch::unresolved(&requested, &info.finished_items);

        if pending.is_empty() {
            info!("All items already updated");
            let result = ItemsArchivedResult {
                finished_items: info.finished_items,
            };
            return Ok(StageOutput::new(&result)?);
        }

        let mut fields = Map::new();
        fields.insert(
            columns::ARCHIVE_STATUS.to_string(),
            Value::from(format!("Arkivert - {}", pretty_date(archived_at.date_naive()))),
        );
        fields.insert(
            columns::DOCUMENT_NUMBER.to_string(),
            Value::from(archived.document_number.clone()),
        );
        fields.insert(
            columns::RE_ARCHIVE.to_string(),
            Value::from(PublishFlag::No.as_str()),
        );

        info!(pending = pending.len(), total = requested.len(), "Updating items in source list");
        let outcome = batch::reconcile(self.transport.as_ref(), &meeting.list_info, &pending, &fields)
            .await
            .map_err(|e| StageError::InvalidData(e.to_string()))?;

        batch::merge_finished(&mut info.finished_items, outcome.finished_items);
        info.batch_requests = outcome.batch_requests;
        info.failed_items = outcome.failed_items;

        let unresolved = batch::unresolved(&requested, &info.finished_items);
        if !unresolved.is_empty() {
            warn!(unresolved = unresolved.len(), "Some items were not updated");
            return Err(StageFailure {
                error: StageError::PartialBatch { unresolved },
                info: to_value(&info),
            });
        }

        let result = ItemsArchivedResult {
            finished_items: info.finished_items.clone(),
        };
        let output = StageOutput::new(&result)?;
        Ok(match to_value(&info) {
            Some(value) => output.with_info(value),
            None => output,
        })
    }
}
