// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-of-run logging of arena reports.

use minutes_archive_core::{ArenaReport, MeetingReport};
use tracing::{error, info, warn};

/// Whether a meeting needs manual attention.
pub fn is_exhausted(report: &ArenaReport, meeting: &MeetingReport) -> bool {
    report.exhausted.contains(&meeting.meeting_id)
}

/// Meetings left unfinished after the run, in report order.
pub fn unfinished(report: &ArenaReport) -> impl Iterator<Item = &MeetingReport> {
    report.meetings.iter().filter(|meeting| !meeting.finished)
}

/// Log one arena report. Returns `false` when the arena itself failed.
pub fn log_report(report: &ArenaReport) -> bool {
    if let Some(err) = &report.error {
        error!(arena = %report.arena, error = %err, "Arena run failed");
        return false;
    }
    info!(
        arena = %report.arena,
        enabled = report.enabled,
        discovered = report.discovered,
        eligible = report.eligible,
        finished = report.finished,
        failed = report.failed,
        exhausted = report.exhausted.len(),
        "Arena run complete"
    );

    for meeting in unfinished(report) {
        let last_error = meeting.last_error.as_ref().map(ToString::to_string);
        if is_exhausted(report, meeting) {
            warn!(
                arena = %report.arena,
                meeting_id = %meeting.meeting_id,
                blocking_job = ?meeting.blocking_job,
                last_error = ?last_error,
                runs = meeting.runs,
                "Meeting exhausted automatic retries, needs manual attention"
            );
        } else {
            warn!(
                arena = %report.arena,
                meeting_id = %meeting.meeting_id,
                blocking_job = ?meeting.blocking_job,
                last_error = ?last_error,
                error = ?meeting.error,
                runs = meeting.runs,
                next_run = %meeting.next_run,
                "Meeting did not finish"
            );
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use minutes_archive_core::JobName;
    use serde_json::json;

    fn meeting(id: &str, finished: bool, blocking_job: Option<JobName>) -> MeetingReport {
        MeetingReport {
            meeting_id: id.to_string(),
            eligible: true,
            blocking_job,
            last_error: blocking_job.map(|_| json!({"status": 500, "body": {"message": "down"}})),
            runs: 1,
            next_run: Utc::now(),
            finished,
            error: None,
        }
    }

    #[test]
    fn test_stage_failures_and_exhausted_are_unfinished() {
        let report = ArenaReport {
            arena: "Ledergruppe".to_string(),
            enabled: true,
            exhausted: vec!["m-3".to_string()],
            meetings: vec![
                meeting("m-1", true, None),
                meeting("m-2", false, Some(JobName::CreatePdf)),
                meeting("m-3", false, Some(JobName::ArchiveMeeting)),
            ],
            ..Default::default()
        };

        let ids: Vec<&str> = unfinished(&report).map(|m| m.meeting_id.as_str()).collect();
        assert_eq!(ids, vec!["m-2", "m-3"]);
        assert!(!is_exhausted(&report, &report.meetings[1]));
        assert!(is_exhausted(&report, &report.meetings[2]));
        assert!(log_report(&report));
    }

    #[test]
    fn test_failed_arena() {
        let report = ArenaReport {
            arena: "Styret".to_string(),
            error: Some("list not found".to_string()),
            ..Default::default()
        };
        assert!(!log_report(&report));
    }
}
