// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `createStatistic`: report the archived meeting to the statistics sink.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ArchiveResult, Stage, StageFailure, StageOutput, prerequisite};
use crate::collaborators::{StatisticRecord, StatisticsSink};
use crate::config::ArenaConfig;
use crate::error::StageError;
use crate::flow::JobName;
use crate::model::Meeting;

/// `<crate> - <version>`
pub const ENGINE_NAME: &str = concat!(env!("CARGO_PKG_NAME"), " - ", env!("CARGO_PKG_VERSION"));

pub struct CreateStatistic {
    sink: Arc<dyn StatisticsSink>,
}

impl CreateStatistic {
    pub fn new(sink: Arc<dyn StatisticsSink>) -> Self {
        Self { sink }
    }
}

pub(crate) fn statistic_record(meeting: &Meeting, arena: &ArenaConfig, archived: &ArchiveResult) -> StatisticRecord {
    StatisticRecord {
        system: "SMART-møtereferat".to_string(),
        engine: ENGINE_NAME.to_string(),
        company: arena.pdf.sector.clone(),
        description: "Arkivering av SMART-møtereferat.".to_string(),
        project_id: "67".to_string(),
        kind: "mote-arkivering".to_string(),
        external_id: meeting.meeting_id.clone(),
        meeting_arena: arena.name.clone(),
        meeting_date: meeting.meeting_date.to_string(),
        document_number: archived.document_number.clone(),
        is_etterarkivering: archived.late_archiving,
    }
}

#[async_trait]
impl Stage for CreateStatistic {
    fn job(&self) -> JobName {
        JobName::CreateStatistic
    }

    async fn run(&self, meeting: &Meeting, arena: &ArenaConfig) -> Result<StageOutput, StageFailure> {
        let archived: ArchiveResult = prerequisite(meeting, JobName::ArchiveMeeting)?;
        let receipt = self
            .sink
            .emit(&statistic_record(meeting, arena, &archived))
            .await?;
        if !receipt.acknowledged {
            return Err(StageError::InvalidData("statistic was not acknowledged".to_string()).into());
        }
        Ok(StageOutput::new(&receipt)?)
    }
}
