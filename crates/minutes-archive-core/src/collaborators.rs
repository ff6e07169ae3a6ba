// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Interfaces of the external systems the engine drives.
//!
//! Implementations live outside this crate (HTTP adapters) or in
//! [`crate::mock`] for tests. They are used behind `Arc<dyn Trait>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ListLocator, Responsible};
use crate::error::RemoteError;
use crate::model::{ListInfo, RawItem};

/// Result type for collaborator calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// A file attached to a list item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    /// Location the content can be downloaded from.
    pub uri: String,
    pub name: String,
}

/// The source list holding meeting items.
#[async_trait]
pub trait ListSource: Send + Sync {
    /// Resolve a list URL to its identity.
    async fn resolve_list(&self, locator: &ListLocator) -> RemoteResult<ListInfo>;

    /// Items not yet archived, marked for publishing and older than `ready_before`.
    async fn list_ready_candidates(
        &self,
        list: &ListInfo,
        ready_before: DateTime<Utc>,
    ) -> RemoteResult<Vec<RawItem>>;

    /// Attachments of one item, in their listing order.
    async fn list_attachments(&self, list: &ListInfo, item_id: &str) -> RemoteResult<Vec<AttachmentRef>>;

    /// Download one attachment.
    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> RemoteResult<Vec<u8>>;
}

/// Case lookup/creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRequest {
    pub external_id: String,
    pub title: String,
    pub responsible: Responsible,
    pub access_code: Option<String>,
    pub access_group: Option<String>,
    pub paragraph: Option<String>,
}

/// An open archive case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRecord {
    pub recno: i64,
    pub case_number: String,
    /// Whether the case was created by this call.
    pub created: bool,
}

/// A file to include in an archived document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFile {
    pub title: String,
    /// File extension without the dot, e.g. `pdf`.
    pub extension: String,
    pub base64: String,
}

/// Document filing request.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRequest {
    pub case_number: String,
    pub title: String,
    pub document_date: String,
    pub responsible: Responsible,
    pub access_code: Option<String>,
    pub access_group: String,
    pub paragraph: Option<String>,
    /// The main document followed by the attachments.
    pub files: Vec<DocumentFile>,
}

/// A filed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiledDocument {
    pub recno: i64,
    pub document_number: String,
}

/// The document archive.
#[async_trait]
pub trait ArchiveService: Send + Sync {
    /// Find an open case with this external id or create one.
    async fn find_or_create_case(&self, request: &CaseRequest) -> RemoteResult<CaseRecord>;

    /// Number of filed documents with this title in the case.
    async fn count_filed_documents(&self, title: &str, case_number: &str) -> RemoteResult<usize>;

    async fn file_document(&self, request: &DocumentRequest) -> RemoteResult<FiledDocument>;
}

/// One item rendered into the meeting document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderItem {
    pub title: String,
    pub description: String,
    pub item_status: String,
    pub item_type: String,
    pub decision: String,
    pub item_responsible_name: String,
    pub attachments: Vec<String>,
}

/// Everything the renderer needs for one meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub meeting_date: String,
    pub sector: String,
    pub meeting_case_number: String,
    pub paragraph: String,
    pub meeting_title: String,
    pub meeting_items: Vec<RenderItem>,
}

/// Renders meeting documents.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Returns the rendered document bytes.
    async fn render(&self, request: &RenderRequest) -> RemoteResult<Vec<u8>>;
}

/// One statistics record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticRecord {
    pub system: String,
    pub engine: String,
    pub company: String,
    pub description: String,
    pub project_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub external_id: String,
    pub meeting_arena: String,
    pub meeting_date: String,
    pub document_number: String,
    pub is_etterarkivering: bool,
}

/// Acknowledgement from the statistics sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticReceipt {
    pub acknowledged: bool,
    pub inserted_id: String,
}

#[async_trait]
pub trait StatisticsSink: Send + Sync {
    async fn emit(&self, record: &StatisticRecord) -> RemoteResult<StatisticReceipt>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

