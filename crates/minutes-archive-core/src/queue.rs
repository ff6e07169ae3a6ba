// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Queue construction.
//!
//! Candidate items are grouped into meetings by meeting date. A meeting that
//! is already in the queue cache is authoritative: its item set stays frozen
//! until its flow completes, and new items for the same date are dropped for
//! this extraction.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use tracing::{debug, info, warn};

use crate::cache::{CacheHandle, sanitize_key_component, validate_key};
use crate::config::ArenaConfig;
use crate::error::{Error, Result};
use crate::flow::ArchiveFlowStatus;
use crate::model::{ListInfo, Meeting, MeetingItem};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Calendar date a raw meeting timestamp belongs to.
///
/// Evening meetings are stored as local midnight, which lands at 22:00 or
/// 23:00 UTC on the previous day, so those hours roll over to the next day.
/// A plain `yyyy-mm-dd` value is taken as is.
pub fn meeting_date_key(raw: &str) -> Result<NaiveDate> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        let utc = timestamp.with_timezone(&Utc);
        let date = utc.date_naive();
        return if matches!(utc.hour(), 22 | 23) {
            date.checked_add_signed(Duration::days(1))
                .ok_or_else(|| Error::validation("meetingDate", format!("date out of range: {raw}")))
        } else {
            Ok(date)
        };
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| Error::validation("meetingDate", format!("invalid date format: {raw}")))
}

/// Prefix shared by every meeting id of one list.
pub fn meeting_id_prefix(list_info: &ListInfo) -> String {
    format!(
        "{}-{}-",
        sanitize_key_component(&list_info.site_name),
        sanitize_key_component(&list_info.list_name)
    )
}

/// `<site>-<list>-<yyyy-mm-dd>`. Depends only on the list and the date.
pub fn meeting_id(list_info: &ListInfo, date: NaiveDate) -> Result<String> {
    let id = format!("{}{}", meeting_id_prefix(list_info), date.format(DATE_FORMAT));
    validate_key(&id)?;
    Ok(id)
}

/// Whether `key` is a meeting id of the list with this prefix.
fn is_meeting_key(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix).is_some_and(|rest| {
        NaiveDate::parse_from_str(rest, DATE_FORMAT)
            .is_ok_and(|date| date.format(DATE_FORMAT).to_string() == rest)
    })
}

/// Build the ordered work queue for one list.
///
/// Cached (in-progress) meetings come first, newly discovered meetings after.
/// Nothing is persisted here; the orchestrator writes meetings as jobs settle.
pub async fn build_queue(
    arena: &ArenaConfig,
    list_info: &ListInfo,
    cache: &CacheHandle,
    items: Vec<MeetingItem>,
    now: DateTime<Utc>,
) -> Result<Vec<Meeting>> {
    if !list_info.is_complete() {
        return Err(Error::validation(
            "listInfo",
            format!("list info for '{}' is incomplete", arena.name),
        ));
    }

    let mut cached: Vec<Meeting> = Vec::new();
    let mut fresh: Vec<Meeting> = Vec::new();
    let mut cached_ids: HashSet<String> = HashSet::new();

    for item in items {
        let date = meeting_date_key(&item.meeting_date)?;
        let id = meeting_id(list_info, date)?;

        if cached_ids.contains(&id) {
            continue;
        }
        if let Some(meeting) = fresh.iter_mut().find(|m| m.meeting_id == id) {
            meeting.items.push(item);
            continue;
        }
        if let Some(meeting) = cache.get_as::<Meeting>(&id).await? {
            info!(meeting_id = %id, arena = %arena.name, "Found queued meeting, using cached item set");
            cached_ids.insert(id);
            cached.push(meeting);
            continue;
        }

        debug!(meeting_id = %id, arena = %arena.name, "New meeting discovered");
        fresh.push(Meeting {
            meeting_id: id,
            meeting_date: date,
            arena: arena.name.clone(),
            queued_date: now,
            list_info: list_info.clone(),
            items: vec![item],
            archive_flow_status: ArchiveFlowStatus::new(now),
        });
    }

    // Meetings still in progress whose items no longer show up as candidates
    let prefix = meeting_id_prefix(list_info);
    for key in cache.keys().await? {
        if !is_meeting_key(&key, &prefix) || cached_ids.contains(&key) {
            continue;
        }
        match cache.get_as::<Meeting>(&key).await? {
            Some(meeting) => {
                info!(meeting_id = %key, arena = %arena.name, "Adding in-progress meeting from queue");
                cached_ids.insert(key);
                cached.push(meeting);
            }
            None => warn!(meeting_id = %key, "Queued meeting disappeared while building queue"),
        }
    }

    cached.extend(fresh);
    Ok(cached)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_info() -> ListInfo {
        ListInfo {
            site_id: "site-guid".into(),
            site_name: "SMART Motes".into(),
            list_id: "list-guid".into(),
            list_name: "Sakliste".into(),
            list_display_name: "Sakliste".into(),
            list_url: "https://contoso.sharepoint.com/sites/SMART%20Motes/Lists/Sakliste".into(),
        }
    }

    #[test]
    fn test_meeting_date_key_rolls_late_utc_hours() {
        let d = |s| meeting_date_key(s).unwrap().to_string();
        assert_eq!(d("2025-01-14T23:00:00Z"), "2025-01-15");
        assert_eq!(d("2025-01-14T22:00:00Z"), "2025-01-15");
        assert_eq!(d("2025-01-14T21:59:59Z"), "2025-01-14");
        assert_eq!(d("2025-01-15T00:30:00Z"), "2025-01-15");
        assert_eq!(d("2024-12-31T23:00:00Z"), "2025-01-01");
        assert_eq!(d("2025-01-15"), "2025-01-15");
        assert!(meeting_date_key("15.01.2025").is_err());
    }

    #[test]
    fn test_meeting_id_is_pure() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        assert_eq!(
            meeting_id(&list_info(), date).unwrap(),
            "SMART Motes-Sakliste-2025-01-15"
        );
        assert_eq!(meeting_id(&list_info(), date).unwrap(), meeting_id(&list_info(), date).unwrap());
    }

    #[test]
    fn test_is_meeting_key() {
        let prefix = meeting_id_prefix(&list_info());
        assert!(is_meeting_key("SMART Motes-Sakliste-2025-01-15", &prefix));
        assert!(!is_meeting_key("SMART Motes-Sakliste-Arkiv-2025-01-15", &prefix));
        assert!(!is_meeting_key("SMART Motes-Sakliste-2025-1-5", &prefix));
        assert!(!is_meeting_key("Other-Sakliste-2025-01-15", &prefix));
    }
}
