// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-arena processing runs.
//!
//! [`ArchiveEngine::run`] walks the configured arenas one after another. For
//! each arena it resolves the source list, builds the work queue, filters it
//! through the retry scheduler and drives every eligible meeting through the
//! pipeline. An arena-level failure is recorded in that arena's report and
//! does not stop the others.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::batch::BatchTransport;
use crate::cache::{CacheHandle, CacheRegistry};
use crate::collaborators::{ArchiveService, Clock, DocumentRenderer, ListSource, StatisticsSink};
use crate::config::{ArenaConfig, EngineConfig};
use crate::error::Result;
use crate::flow::{ArchiveFlowStatus, JobName};
use crate::model::{ListInfo, Meeting};
use crate::orchestrator::Orchestrator;
use crate::queue::build_queue;
use crate::retention::{self, PruneReport};
use crate::retry::Eligibility;
use crate::schema::{parse_items, validate_schema};
use crate::stages::{Pipeline, StageContext};

/// The external systems an engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub list_source: Arc<dyn ListSource>,
    pub batch: Arc<dyn BatchTransport>,
    pub archive: Arc<dyn ArchiveService>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub statistics: Arc<dyn StatisticsSink>,
}

/// State of one meeting after a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingReport {
    pub meeting_id: String,
    pub eligible: bool,
    pub blocking_job: Option<JobName>,
    pub last_error: Option<Value>,
    pub runs: u32,
    pub next_run: DateTime<Utc>,
    pub finished: bool,
    /// Validation or cache error that stopped this meeting.
    pub error: Option<String>,
}

impl MeetingReport {
    fn from_meeting(meeting: &Meeting, eligible: bool) -> Self {
        let flow = &meeting.archive_flow_status;
        Self {
            meeting_id: meeting.meeting_id.clone(),
            eligible,
            blocking_job: flow.blocking_job(),
            last_error: flow.blocking_error().cloned(),
            runs: flow.runs,
            next_run: flow.next_run,
            finished: flow.finished,
            error: None,
        }
    }
}

/// Outcome of one arena in a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArenaReport {
    pub arena: String,
    pub enabled: bool,
    /// Raw candidate rows returned by the source list.
    pub candidates: usize,
    /// Meetings in the queue (cached and new).
    pub discovered: usize,
    /// Meetings held back by the retry scheduler.
    pub filtered: usize,
    /// Meetings that ran out of automatic retries.
    pub exhausted: Vec<String>,
    pub eligible: usize,
    pub handled: usize,
    pub finished: usize,
    pub failed: usize,
    pub meetings: Vec<MeetingReport>,
    pub error: Option<String>,
}

/// The archive flow engine.
pub struct ArchiveEngine {
    config: EngineConfig,
    list_source: Arc<dyn ListSource>,
    queue: CacheHandle,
    finished: CacheHandle,
    list_info: CacheHandle,
    pipeline: Pipeline,
    orchestrator: Orchestrator,
    clock: Arc<dyn Clock>,
}

impl ArchiveEngine {
    /// Build an engine with the built-in stages.
    pub fn new(
        config: EngineConfig,
        collaborators: Collaborators,
        caches: CacheRegistry,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let layout = config.layout();
        let pipeline = Pipeline::new(StageContext {
            list_source: collaborators.list_source.clone(),
            batch: collaborators.batch,
            archive: collaborators.archive,
            renderer: collaborators.renderer,
            statistics: collaborators.statistics,
            caches: caches.clone(),
            layout,
        });
        Self::with_pipeline(config, collaborators.list_source, pipeline, caches, clock)
    }

    /// Build an engine around a custom pipeline.
    pub fn with_pipeline(
        config: EngineConfig,
        list_source: Arc<dyn ListSource>,
        pipeline: Pipeline,
        caches: CacheRegistry,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        validate_schema()?;
        let layout = config.layout();
        let queue = caches.open(layout.queue_root())?;
        let finished = caches.open(layout.finished_root())?;
        let list_info = caches.open(layout.list_info_root())?;
        let orchestrator = Orchestrator::new(
            queue.clone(),
            finished.clone(),
            config.backoff.clone(),
            clock.clone(),
        );
        Ok(Self {
            config,
            list_source,
            queue,
            finished,
            list_info,
            pipeline,
            orchestrator,
            clock,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Process every arena in order.
    pub async fn run(&self, arenas: &[ArenaConfig]) -> Vec<ArenaReport> {
        let mut reports = Vec::with_capacity(arenas.len());
        for arena in arenas {
            reports.push(self.run_arena(arena).await);
        }
        reports
    }

    /// Process one arena. Errors end up in the report.
    #[instrument(skip(self, arena), fields(arena = %arena.name))]
    pub async fn run_arena(&self, arena: &ArenaConfig) -> ArenaReport {
        let mut report = ArenaReport {
            arena: arena.name.clone(),
            enabled: arena.enabled,
            ..Default::default()
        };
        if !arena.enabled {
            info!("Arena disabled, skipping");
            return report;
        }

        if let Err(e) = self.process_arena(arena, &mut report).await {
            error!(error = %e, "Arena run failed");
            report.error = Some(e.to_string());
        }

        info!(
            candidates = report.candidates,
            discovered = report.discovered,
            filtered = report.filtered,
            exhausted = report.exhausted.len(),
            eligible = report.eligible,
            handled = report.handled,
            finished = report.finished,
            failed = report.failed,
            "Arena run completed"
        );
        report
    }

    async fn process_arena(&self, arena: &ArenaConfig, report: &mut ArenaReport) -> Result<()> {
        let list_info = self.list_info_for(arena).await?;
        let now = self.clock.now();

        let raw = self
            .list_source
            .list_ready_candidates(&list_info, now - self.config.ready_after)
            .await?;
        report.candidates = raw.len();
        let items = parse_items(&raw)?;

        let queue = build_queue(arena, &list_info, &self.queue, items, now).await?;
        report.discovered = queue.len();

        let mut eligible = Vec::new();
        for meeting in queue {
            match self.orchestrator.backoff().eligibility(&meeting.archive_flow_status, now) {
                Eligibility::Eligible => eligible.push(meeting),
                Eligibility::Exhausted { runs } => {
                    let meeting_report = MeetingReport::from_meeting(&meeting, false);
                    warn!(
                        meeting_id = %meeting.meeting_id,
                        runs,
                        blocking_job = ?meeting_report.blocking_job,
                        last_error = ?meeting_report.last_error,
                        "Meeting exhausted automatic retries, needs manual attention"
                    );
                    report.filtered += 1;
                    report.exhausted.push(meeting.meeting_id.clone());
                    report.meetings.push(meeting_report);
                }
                Eligibility::Waiting { next_run } => {
                    info!(meeting_id = %meeting.meeting_id, next_run = %next_run, "Meeting not due yet");
                    report.filtered += 1;
                    report.meetings.push(MeetingReport::from_meeting(&meeting, false));
                }
                Eligibility::Finished => {
                    report.filtered += 1;
                    report.meetings.push(MeetingReport::from_meeting(&meeting, false));
                }
            }
        }
        report.eligible = eligible.len();

        for mut meeting in eligible {
            let outcome = self
                .orchestrator
                .run_meeting(&mut meeting, arena, &self.pipeline)
                .await;
            let mut meeting_report = MeetingReport::from_meeting(&meeting, true);
            match outcome {
                Ok(_) => {
                    report.handled += 1;
                    if meeting.archive_flow_status.finished {
                        report.finished += 1;
                    } else if meeting.archive_flow_status.failed {
                        report.failed += 1;
                    }
                }
                Err(e) => {
                    error!(meeting_id = %meeting.meeting_id, error = %e, "Meeting could not be processed");
                    report.failed += 1;
                    meeting_report.error = Some(e.to_string());
                }
            }
            report.meetings.push(meeting_report);
        }
        Ok(())
    }

    /// List metadata from the cache, refreshed when missing or incomplete.
    async fn list_info_for(&self, arena: &ArenaConfig) -> Result<ListInfo> {
        let key = arena.list.cache_key();
        if let Some(value) = self.list_info.get(&key).await? {
            match serde_json::from_value::<ListInfo>(value) {
                Ok(info) if info.is_complete() => return Ok(info),
                _ => info!(key = %key, "Cached list info is incomplete, refreshing"),
            }
        }
        let info = self.list_source.resolve_list(&arena.list).await?;
        self.list_info.set_as(&key, &info).await?;
        Ok(info)
    }

    /// Delete finished records older than the retention window.
    pub async fn prune_finished(&self) -> Result<PruneReport> {
        Ok(retention::prune_finished(&self.finished, self.config.retention, self.clock.now()).await?)
    }

    /// Persisted flow status of a meeting, from the queue or the finished store.
    pub async fn flow_snapshot(&self, meeting_id: &str) -> Result<Option<ArchiveFlowStatus>> {
        for cache in [&self.queue, &self.finished] {
            if let Some(meeting) = cache.get_as::<Meeting>(meeting_id).await? {
                return Ok(Some(meeting.archive_flow_status));
            }
        }
        Ok(None)
    }
}
