// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Archive flow state machine.
//!
//! Every meeting carries an [`ArchiveFlowStatus`] with one [`JobStatus`] slot
//! per pipeline stage. Slots move from not-finished to finished exactly once;
//! a failed attempt leaves the slot not-finished with `lastError` set.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StageError;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobName {
    GetMeetingAttachments,
    SyncMeetingArchiveCase,
    CreatePdf,
    ArchiveMeeting,
    SetMeetingItemsToArchived,
    CreateStatistic,
    CleanUpMeeting,
}

impl JobName {
    /// All jobs in pipeline order.
    pub const ALL: [JobName; 7] = [
        JobName::GetMeetingAttachments,
        JobName::SyncMeetingArchiveCase,
        JobName::CreatePdf,
        JobName::ArchiveMeeting,
        JobName::SetMeetingItemsToArchived,
        JobName::CreateStatistic,
        JobName::CleanUpMeeting,
    ];

    /// The persisted job name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::GetMeetingAttachments => "getMeetingAttachments",
            JobName::SyncMeetingArchiveCase => "syncMeetingArchiveCase",
            JobName::CreatePdf => "createPdf",
            JobName::ArchiveMeeting => "archiveMeeting",
            JobName::SetMeetingItemsToArchived => "setMeetingItemsToArchived",
            JobName::CreateStatistic => "createStatistic",
            JobName::CleanUpMeeting => "cleanUpMeeting",
        }
    }

    /// Whether this is the stage that completes the flow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobName::CleanUpMeeting)
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pipeline stage's record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub finished: bool,
    #[serde(default)]
    pub finished_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    /// Working memory for safe resumption, e.g. accumulated batch accounting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

/// The persisted state-machine body of a meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveFlowStatus {
    pub finished: bool,
    #[serde(default)]
    pub finished_timestamp: Option<DateTime<Utc>>,
    pub failed: bool,
    pub runs: u32,
    pub next_run: DateTime<Utc>,
    pub jobs: BTreeMap<JobName, JobStatus>,
}

impl ArchiveFlowStatus {
    /// A fresh flow with one empty slot per job, eligible immediately.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            finished: false,
            finished_timestamp: None,
            failed: false,
            runs: 0,
            next_run: now,
            jobs: JobName::ALL
                .iter()
                .map(|job| (*job, JobStatus::default()))
                .collect(),
        }
    }

    /// Start a new attempt. Only `failed` is reset; finished slots stay finished.
    pub fn begin_attempt(&mut self) {
        self.failed = false;
    }

    pub fn job(&self, job: JobName) -> Option<&JobStatus> {
        self.jobs.get(&job)
    }

    pub fn job_mut(&mut self, job: JobName) -> Option<&mut JobStatus> {
        self.jobs.get_mut(&job)
    }

    /// Whether the slot exists and is finished.
    pub fn is_job_finished(&self, job: JobName) -> bool {
        self.jobs.get(&job).is_some_and(|slot| slot.finished)
    }

    /// Record a successful stage run. Returns `false` if the slot is missing.
    pub fn record_success(
        &mut self,
        job: JobName,
        result: Value,
        info: Option<Value>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(slot) = self.jobs.get_mut(&job) else {
            return false;
        };
        slot.finished = true;
        slot.finished_timestamp = Some(now);
        slot.result = Some(result);
        slot.last_error = None;
        if info.is_some() {
            slot.info = info;
        }
        true
    }

    /// Record a failed stage run. Scheduling the retry is the caller's job.
    ///
    /// Returns `false` if the slot is missing.
    pub fn record_failure(&mut self, job: JobName, diagnostic: Value, info: Option<Value>) -> bool {
        let Some(slot) = self.jobs.get_mut(&job) else {
            return false;
        };
        slot.finished = false;
        slot.last_error = Some(diagnostic);
        if info.is_some() {
            slot.info = info;
        }
        self.failed = true;
        true
    }

    /// Mark the whole flow as finished.
    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.finished = true;
        self.failed = false;
        self.finished_timestamp = Some(now);
    }

    /// First job in pipeline order that has not finished.
    pub fn blocking_job(&self) -> Option<JobName> {
        if self.finished {
            return None;
        }
        JobName::ALL
            .into_iter()
            .find(|job| !self.is_job_finished(*job))
    }

    /// Last captured diagnostic of the blocking job.
    pub fn blocking_error(&self) -> Option<&Value> {
        self.blocking_job()
            .and_then(|job| self.jobs.get(&job))
            .and_then(|slot| slot.last_error.as_ref())
    }

    /// Deserialize the result of a finished prerequisite job.
    ///
    /// Fails with [`StageError::MissingPrerequisite`] when the job has not
    /// finished or its result does not have the expected shape.
    pub fn required_result<T: DeserializeOwned>(&self, job: JobName) -> Result<T, StageError> {
        let slot = self
            .jobs
            .get(&job)
            .ok_or_else(|| StageError::MissingPrerequisite {
                job,
                reason: "job slot is missing".to_string(),
            })?;
        if !slot.finished {
            return Err(StageError::MissingPrerequisite {
                job,
                reason: "job has not finished".to_string(),
            });
        }
        let result = slot
            .result
            .clone()
            .ok_or_else(|| StageError::MissingPrerequisite {
                job,
                reason: "job has no result".to_string(),
            })?;
        serde_json::from_value(result).map_err(|e| StageError::MissingPrerequisite {
            job,
            reason: e.to_string(),
        })
    }
}
