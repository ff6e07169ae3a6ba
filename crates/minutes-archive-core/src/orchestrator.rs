// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Job orchestration.
//!
//! [`Orchestrator::run_job`] runs one stage against a meeting and applies the
//! outcome to the meeting's flow status:
//!
//! - skip when the flow is finished, the flow already failed in this attempt,
//!   or the job slot is finished (no state is touched);
//! - on success, store the result and persist the meeting;
//! - on failure, capture the diagnostic, mark the flow failed, advance the
//!   retry schedule and persist the meeting before returning.
//!
//! Stage failures never propagate to the caller. Only validation and cache
//! errors do.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::cache::CacheHandle;
use crate::collaborators::Clock;
use crate::config::ArenaConfig;
use crate::error::{Error, Result};
use crate::flow::JobName;
use crate::model::Meeting;
use crate::retry::BackoffTable;
use crate::stages::{Pipeline, Stage};

/// Why a job was not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    FlowFinished,
    FlowFailed,
    JobFinished,
}

/// Outcome of one [`Orchestrator::run_job`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Skipped(SkipReason),
    Succeeded,
    /// The stage failed; the diagnostic was stored in `lastError`.
    Failed(Value),
}

/// Drives meetings through the pipeline and persists every attempt.
#[derive(Clone)]
pub struct Orchestrator {
    queue: CacheHandle,
    finished: CacheHandle,
    backoff: BackoffTable,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(
        queue: CacheHandle,
        finished: CacheHandle,
        backoff: BackoffTable,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            finished,
            backoff,
            clock,
        }
    }

    pub fn backoff(&self) -> &BackoffTable {
        &self.backoff
    }

    fn validate(&self, meeting: &Meeting, arena: &ArenaConfig, job: JobName, stage: &dyn Stage) -> Result<()> {
        if meeting.meeting_id.trim().is_empty() {
            return Err(Error::MissingMeetingId);
        }
        if meeting.archive_flow_status.job(job).is_none() {
            return Err(Error::MissingJobSlot {
                meeting_id: meeting.meeting_id.clone(),
                job,
            });
        }
        if stage.job() != job {
            return Err(Error::StageMismatch {
                job,
                stage: stage.job(),
            });
        }
        if meeting.arena != arena.name {
            return Err(Error::validation(
                "arena",
                format!(
                    "meeting '{}' belongs to arena '{}', not '{}'",
                    meeting.meeting_id, meeting.arena, arena.name
                ),
            ));
        }
        Ok(())
    }

    /// Run one job of the pipeline against `meeting`.
    #[instrument(skip(self, meeting, arena, stage), fields(meeting_id = %meeting.meeting_id, job = %job))]
    pub async fn run_job(
        &self,
        meeting: &mut Meeting,
        arena: &ArenaConfig,
        job: JobName,
        stage: &dyn Stage,
    ) -> Result<JobOutcome> {
        self.validate(meeting, arena, job, stage)?;

        let flow = &meeting.archive_flow_status;
        let skip = if flow.finished {
            Some(SkipReason::FlowFinished)
        } else if flow.failed {
            Some(SkipReason::FlowFailed)
        } else if flow.is_job_finished(job) {
            Some(SkipReason::JobFinished)
        } else {
            None
        };
        if let Some(reason) = skip {
            debug!(?reason, "Skipping job");
            return Ok(JobOutcome::Skipped(reason));
        }

        info!("Starting job");
        let outcome = stage.run(meeting, arena).await;
        let now = self.clock.now();

        match outcome {
            Ok(output) => {
                meeting
                    .archive_flow_status
                    .record_success(job, output.result, output.info, now);
                info!("Job completed");

                if job.is_terminal() {
                    self.finalize(meeting).await?;
                } else {
                    self.queue.set_as(&meeting.meeting_id, &*meeting).await?;
                }
                Ok(JobOutcome::Succeeded)
            }
            Err(failure) => {
                let diagnostic = failure.error.diagnostic();
                let flow = &mut meeting.archive_flow_status;
                flow.record_failure(job, diagnostic.clone(), failure.info);
                self.backoff.schedule_failure(flow, now);
                error!(
                    error = %failure.error,
                    runs = flow.runs,
                    next_run = %flow.next_run,
                    "Job failed"
                );

                self.queue.set_as(&meeting.meeting_id, &*meeting).await?;
                Ok(JobOutcome::Failed(diagnostic))
            }
        }
    }

    /// Mark the flow finished and move the meeting to the finished store.
    async fn finalize(&self, meeting: &mut Meeting) -> Result<()> {
        meeting.archive_flow_status.finish(self.clock.now());
        self.finished.set_as(&meeting.meeting_id, &*meeting).await?;
        self.queue.delete(&meeting.meeting_id).await?;
        info!("Meeting archived, moved to finished store");
        Ok(())
    }

    /// Start a new attempt and run every stage in order.
    ///
    /// Returns the job that failed in this attempt, if any.
    #[instrument(skip(self, meeting, arena, pipeline), fields(meeting_id = %meeting.meeting_id, runs = meeting.archive_flow_status.runs))]
    pub async fn run_meeting(
        &self,
        meeting: &mut Meeting,
        arena: &ArenaConfig,
        pipeline: &Pipeline,
    ) -> Result<Option<JobName>> {
        meeting.archive_flow_status.begin_attempt();
        for stage in pipeline.stages() {
            let job = stage.job();
            if let JobOutcome::Failed(_) = self.run_job(meeting, arena, job, stage).await? {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }
}
