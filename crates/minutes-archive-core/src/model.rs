// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Meetings, meeting items and source-list metadata.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::flow::ArchiveFlowStatus;

/// Document number of an item that has not been archived yet.
pub const NOT_ARCHIVED: &str = "Ikke arkivert";

/// `Ja`/`Nei` flag columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishFlag {
    #[serde(rename = "Ja")]
    Yes,
    #[serde(rename = "Nei")]
    No,
}

impl PublishFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishFlag::Yes => "Ja",
            PublishFlag::No => "Nei",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Ja" => Some(PublishFlag::Yes),
            "Nei" => Some(PublishFlag::No),
            _ => None,
        }
    }
}

/// One case/topic row of a meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub item_status: String,
    pub sorting: f64,
    pub item_type: String,
    pub decision: String,
    pub publish_item: PublishFlag,
    pub publish_attachment: PublishFlag,
    /// Raw meeting timestamp as stored in the source list.
    pub meeting_date: String,
    pub item_responsible_name: String,
    pub item_responsible_lookup_id: Option<String>,
    pub document_number: String,
    pub archive_status: String,
    pub re_archive: PublishFlag,
    pub minutes_id: Option<String>,
    pub element_version: String,
    pub has_attachments: bool,
}

impl MeetingItem {
    pub fn is_archived(&self) -> bool {
        self.document_number != NOT_ARCHIVED
    }
}

/// Resolved identity of a source list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInfo {
    pub site_id: String,
    pub site_name: String,
    pub list_id: String,
    pub list_name: String,
    pub list_display_name: String,
    pub list_url: String,
}

impl ListInfo {
    /// Whether every field is filled in. Incomplete cached entries are refreshed.
    pub fn is_complete(&self) -> bool {
        [
            &self.site_id,
            &self.site_name,
            &self.list_id,
            &self.list_name,
            &self.list_display_name,
            &self.list_url,
        ]
        .iter()
        .all(|field| !field.is_empty())
    }
}

/// A source-list row before schema validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// The unit of work: every item of one source list sharing a meeting date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    /// `<site>-<list>-<yyyy-mm-dd>`
    pub meeting_id: String,
    pub meeting_date: NaiveDate,
    /// Name of the arena configuration this meeting belongs to.
    pub arena: String,
    pub queued_date: DateTime<Utc>,
    pub list_info: ListInfo,
    pub items: Vec<MeetingItem>,
    pub archive_flow_status: ArchiveFlowStatus,
}

impl Meeting {
    pub fn item_ids(&self) -> Vec<String> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }
}
