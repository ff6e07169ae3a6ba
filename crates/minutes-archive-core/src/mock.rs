// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory collaborators for testing.
//!
//! Every mock records the calls it receives and can be told to fail the
//! next `n` calls with a structured remote error.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tokio::sync::Mutex;

use crate::batch::{BatchRequest, BatchResponseItem, BatchTransport};
use crate::collaborators::{
    ArchiveService, AttachmentRef, CaseRecord, CaseRequest, Clock, DocumentRenderer,
    DocumentRequest, FiledDocument, ListSource, RemoteResult, RenderRequest, StatisticReceipt,
    StatisticRecord, StatisticsSink,
};
use crate::config::ListLocator;
use crate::engine::Collaborators;
use crate::error::RemoteError;
use crate::model::{ListInfo, RawItem};

/// Fails a configurable number of upcoming calls.
#[derive(Debug, Default)]
pub struct FailureSwitch {
    remaining: AtomicUsize,
}

impl FailureSwitch {
    /// Fail the next `n` calls.
    pub fn fail_next(&self, n: usize) {
        self.remaining.store(n, Ordering::SeqCst);
    }

    fn check(&self, what: &str) -> RemoteResult<()> {
        let tripped = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(RemoteError::Status {
                status: 500,
                body: json!({ "message": format!("{what} failed") }),
            });
        }
        Ok(())
    }
}

/// Controllable clock.
#[derive(Debug)]
pub struct FixedClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Mock source list.
#[derive(Debug, Default)]
pub struct MockListSource {
    candidates: Mutex<Vec<RawItem>>,
    attachments: Mutex<HashMap<String, Vec<(AttachmentRef, Vec<u8>)>>>,
    resolve_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    pub resolve_failures: FailureSwitch,
    pub candidate_failures: FailureSwitch,
    pub attachment_failures: FailureSwitch,
}

impl MockListSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_candidates(&self, items: Vec<RawItem>) {
        *self.candidates.lock().await = items;
    }

    /// Register an attachment for an item.
    pub async fn add_attachment(&self, item_id: &str, name: &str, content: &[u8]) {
        let mut attachments = self.attachments.lock().await;
        let list = attachments.entry(item_id.to_string()).or_default();
        list.push((
            AttachmentRef {
                uri: format!("mock://items/{item_id}/attachments/{name}"),
                name: name.to_string(),
            },
            content.to_vec(),
        ));
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// List info the mock resolves every locator to.
    pub fn list_info_for(locator: &ListLocator) -> ListInfo {
        ListInfo {
            site_id: format!("site-{}", locator.encoded_site_name),
            site_name: locator.site_name.clone(),
            list_id: format!("list-{}", locator.encoded_list_name),
            list_name: locator.list_name.clone(),
            list_display_name: locator.list_name.clone(),
            list_url: locator.url.clone(),
        }
    }
}

#[async_trait]
impl ListSource for MockListSource {
    async fn resolve_list(&self, locator: &ListLocator) -> RemoteResult<ListInfo> {
        self.resolve_failures.check("resolve_list")?;
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::list_info_for(locator))
    }

    async fn list_ready_candidates(
        &self,
        _list: &ListInfo,
        _ready_before: DateTime<Utc>,
    ) -> RemoteResult<Vec<RawItem>> {
        self.candidate_failures.check("list_ready_candidates")?;
        Ok(self.candidates.lock().await.clone())
    }

    async fn list_attachments(&self, _list: &ListInfo, item_id: &str) -> RemoteResult<Vec<AttachmentRef>> {
        self.attachment_failures.check("list_attachments")?;
        Ok(self
            .attachments
            .lock()
            .await
            .get(item_id)
            .map(|list| list.iter().map(|(r, _)| r.clone()).collect())
            .unwrap_or_default())
    }

    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> RemoteResult<Vec<u8>> {
        self.attachment_failures.check("fetch_attachment")?;
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.attachments
            .lock()
            .await
            .values()
            .flatten()
            .find(|(r, _)| r.uri == attachment.uri)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| RemoteError::Status {
                status: 404,
                body: json!({ "message": "attachment not found" }),
            })
    }
}

/// Mock batch endpoint.
///
/// Items answer 204 unless a status is set for their reference id.
#[derive(Debug, Default)]
pub struct MockBatchTransport {
    statuses: Mutex<HashMap<String, u16>>,
    submitted: Mutex<Vec<Vec<BatchRequest>>>,
    pub rejections: FailureSwitch,
}

impl MockBatchTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `status` for the item with this reference id.
    pub async fn set_status(&self, reference_id: &str, status: u16) {
        self.statuses
            .lock()
            .await
            .insert(reference_id.to_string(), status);
    }

    pub async fn clear_statuses(&self) {
        self.statuses.lock().await.clear();
    }

    /// Batches received so far.
    pub async fn submitted(&self) -> Vec<Vec<BatchRequest>> {
        self.submitted.lock().await.clone()
    }
}

#[async_trait]
impl BatchTransport for MockBatchTransport {
    async fn submit(&self, requests: &[BatchRequest]) -> RemoteResult<Vec<BatchResponseItem>> {
        self.submitted.lock().await.push(requests.to_vec());
        self.rejections.check("batch")?;
        let statuses = self.statuses.lock().await;
        Ok(requests
            .iter()
            .map(|request| {
                let status = statuses.get(&request.reference_id).copied().unwrap_or(204);
                let body = if (200..300).contains(&status) {
                    json!({ "id": request.reference_id })
                } else {
                    json!({ "error": { "code": "itemUpdateFailed", "message": "mock failure" } })
                };
                BatchResponseItem {
                    id: request.id.clone(),
                    status,
                    body,
                }
            })
            .collect())
    }
}

/// Mock document archive.
#[derive(Debug, Default)]
pub struct MockArchive {
    cases: Mutex<Vec<(String, CaseRecord)>>,
    documents: Mutex<Vec<DocumentRequest>>,
    next_recno: AtomicUsize,
    pub case_failures: FailureSwitch,
    pub document_failures: FailureSwitch,
}

impl MockArchive {
    pub fn new() -> Self {
        Self {
            next_recno: AtomicUsize::new(1000),
            ..Default::default()
        }
    }

    fn recno(&self) -> i64 {
        i64::try_from(self.next_recno.fetch_add(1, Ordering::SeqCst)).unwrap_or(i64::MAX)
    }

    /// Pretend an open case with this external id already exists.
    pub async fn add_open_case(&self, external_id: &str, case_number: &str) {
        let record = CaseRecord {
            recno: self.recno(),
            case_number: case_number.to_string(),
            created: false,
        };
        self.cases.lock().await.push((external_id.to_string(), record));
    }

    /// Pretend a document was already filed in a case.
    pub async fn add_filed_document(&self, case_number: &str, title: &str) {
        self.documents.lock().await.push(DocumentRequest {
            case_number: case_number.to_string(),
            title: title.to_string(),
            document_date: String::new(),
            responsible: crate::config::Responsible::EnterpriseRecno(0),
            access_code: None,
            access_group: String::new(),
            paragraph: None,
            files: Vec::new(),
        });
    }

    /// Documents filed so far (including pre-seeded ones).
    pub async fn documents(&self) -> Vec<DocumentRequest> {
        self.documents.lock().await.clone()
    }

    pub async fn case_count(&self) -> usize {
        self.cases.lock().await.len()
    }
}

#[async_trait]
impl ArchiveService for MockArchive {
    async fn find_or_create_case(&self, request: &CaseRequest) -> RemoteResult<CaseRecord> {
        self.case_failures.check("find_or_create_case")?;
        let mut cases = self.cases.lock().await;
        if let Some((_, record)) = cases.iter().find(|(id, _)| *id == request.external_id) {
            return Ok(CaseRecord {
                created: false,
                ..record.clone()
            });
        }
        let recno = self.recno();
        let record = CaseRecord {
            recno,
            case_number: format!("25/{:05}", cases.len() + 1),
            created: true,
        };
        cases.push((request.external_id.clone(), record.clone()));
        Ok(record)
    }

    async fn count_filed_documents(&self, title: &str, case_number: &str) -> RemoteResult<usize> {
        self.case_failures.check("count_filed_documents")?;
        Ok(self
            .documents
            .lock()
            .await
            .iter()
            .filter(|doc| doc.title == title && doc.case_number == case_number)
            .count())
    }

    async fn file_document(&self, request: &DocumentRequest) -> RemoteResult<FiledDocument> {
        self.document_failures.check("file_document")?;
        let mut documents = self.documents.lock().await;
        documents.push(request.clone());
        Ok(FiledDocument {
            recno: self.recno(),
            document_number: format!("{}-{}", request.case_number, documents.len()),
        })
    }
}

/// Mock renderer producing a tiny fake PDF.
#[derive(Debug, Default)]
pub struct MockRenderer {
    requests: Mutex<Vec<RenderRequest>>,
    pub failures: FailureSwitch,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn requests(&self) -> Vec<RenderRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl DocumentRenderer for MockRenderer {
    async fn render(&self, request: &RenderRequest) -> RemoteResult<Vec<u8>> {
        self.failures.check("render")?;
        self.requests.lock().await.push(request.clone());
        Ok(format!("%PDF-1.7 {}", request.meeting_title).into_bytes())
    }
}

/// Mock statistics sink.
#[derive(Debug, Default)]
pub struct MockStatistics {
    records: Mutex<Vec<StatisticRecord>>,
    pub failures: FailureSwitch,
}

impl MockStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<StatisticRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl StatisticsSink for MockStatistics {
    async fn emit(&self, record: &StatisticRecord) -> RemoteResult<StatisticReceipt> {
        self.failures.check("emit")?;
        let mut records = self.records.lock().await;
        records.push(record.clone());
        Ok(StatisticReceipt {
            acknowledged: true,
            inserted_id: format!("stat-{}", records.len()),
        })
    }
}

/// All mocks together, with handles kept for assertions.
#[derive(Clone)]
pub struct MockCollaborators {
    pub list_source: Arc<MockListSource>,
    pub batch: Arc<MockBatchTransport>,
    pub archive: Arc<MockArchive>,
    pub renderer: Arc<MockRenderer>,
    pub statistics: Arc<MockStatistics>,
}

impl Default for MockCollaborators {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCollaborators {
    pub fn new() -> Self {
        Self {
            list_source: Arc::new(MockListSource::new()),
            batch: Arc::new(MockBatchTransport::new()),
            archive: Arc::new(MockArchive::new()),
            renderer: Arc::new(MockRenderer::new()),
            statistics: Arc::new(MockStatistics::new()),
        }
    }

    /// Trait-object view for the engine.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            list_source: self.list_source.clone(),
            batch: self.batch.clone(),
            archive: self.archive.clone(),
            renderer: self.renderer.clone(),
            statistics: self.statistics.clone(),
        }
    }
}
