// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pruning of finished meeting records.
//!
//! The finished store keeps a copy of every archived meeting for export and
//! troubleshooting. Records whose flow finished longer ago than the retention
//! window are deleted. Entries that cannot be read are counted and left alone.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::CacheHandle;
use crate::error::CacheError;

/// How long finished records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::days(30),
        }
    }
}

/// Counters from one pruning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub examined: usize,
    pub pruned: usize,
    pub errors: usize,
}

fn finished_at(value: &Value) -> Option<DateTime<Utc>> {
    let flow = value.get("archiveFlowStatus")?;
    if !flow.get("finished")?.as_bool()? {
        return None;
    }
    let raw = flow.get("finishedTimestamp")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Delete finished records older than `max_age` relative to `now`.
pub async fn prune_finished(
    cache: &CacheHandle,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<PruneReport, CacheError> {
    let cutoff = now - max_age;
    let mut report = PruneReport::default();

    for key in cache.keys().await? {
        report.examined += 1;

        let value = match cache.get(&key).await {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read finished record");
                report.errors += 1;
                continue;
            }
        };

        let Some(finished) = finished_at(&value) else {
            warn!(key = %key, "Finished record has no finish timestamp");
            report.errors += 1;
            continue;
        };

        if finished < cutoff {
            match cache.delete(&key).await {
                Ok(()) => {
                    debug!(key = %key, finished = %finished, "Pruned finished record");
                    report.pruned += 1;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to prune finished record");
                    report.errors += 1;
                }
            }
        }
    }

    // Pruned entries are not needed in memory either
    cache.clear_memory();

    if report.pruned > 0 || report.errors > 0 {
        info!(
            examined = report.examined,
            pruned = report.pruned,
            errors = report.errors,
            "Retention pass completed"
        );
    } else {
        debug!(examined = report.examined, "Retention pass completed, nothing to prune");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheRegistry;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(finished: bool, ts: Option<&str>) -> Value {
        json!({
            "meetingId": "m",
            "archiveFlowStatus": {
                "finished": finished,
                "finishedTimestamp": ts,
            }
        })
    }

    #[tokio::test]
    async fn test_prune_finished() {
        let dir = TempDir::new().unwrap();
        let cache = CacheRegistry::new().open(dir.path().join("finished")).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();

        cache.set("old", record(true, Some("2025-04-01T00:00:00Z"))).await.unwrap();
        cache.set("recent", record(true, Some("2025-05-20T00:00:00Z"))).await.unwrap();
        cache.set("broken", record(true, None)).await.unwrap();
        std::fs::write(dir.path().join("finished").join("garbage.json"), "{not json").unwrap();

        let report = prune_finished(&cache, Duration::days(30), now).await.unwrap();
        assert_eq!(
            report,
            PruneReport {
                examined: 4,
                pruned: 1,
                errors: 2
            }
        );
        assert!(!cache.has("old").await.unwrap());
        assert!(cache.has("recent").await.unwrap());
        assert!(cache.has("broken").await.unwrap());
        assert!(cache.has("garbage").await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_missing_root() {
        let dir = TempDir::new().unwrap();
        let cache = CacheRegistry::new().open(dir.path().join("nothing")).unwrap();
        let report = prune_finished(&cache, Duration::days(1), Utc::now()).await.unwrap();
        assert_eq!(report, PruneReport::default());
    }

    #[test]
    fn test_default_policy() {
        assert_eq!(RetentionPolicy::default().max_age, Duration::days(30));
    }
}
