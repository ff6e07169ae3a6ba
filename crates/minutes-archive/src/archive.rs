// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Document archive adapter.
//!
//! Every call is a `POST {api_url}/archive` with a `{service, method, parameter}`
//! envelope and a bearer token.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use minutes_archive_core::collaborators::{
    ArchiveService, CaseRecord, CaseRequest, DocumentFile, DocumentRequest, FiledDocument, RemoteResult,
};
use minutes_archive_core::config::Responsible;
use minutes_archive_core::error::RemoteError;

use crate::config::ArchiveApiSettings;
use crate::http::{int_field, send_json, str_field};

/// Case statuses that accept new documents.
pub const OPEN_CASE_STATUSES: &[&str] = &["Under behandling", "Reservert"];

/// Document status codes of journaled or archived documents.
pub const FILED_DOCUMENT_STATUS_CODES: &[&str] = &["J", "A"];

/// File formats the archive accepts.
pub const VALID_FILE_EXTENSIONS: &[&str] = &[
    "PDF", "DOC", "DOCX", "XLS", "XLSX", "PPT", "PPTX", "TXT", "RTF", "JPG", "JPEG", "PNG", "GIF",
    "TIF", "TIFF", "MSG", "EML", "HTML", "HTM", "XML", "CSV", "ODT", "ODS", "ODP", "ZIP",
];

/// Format sent for files with an extension outside [`VALID_FILE_EXTENSIONS`].
pub const UNKNOWN_FILE_FORMAT: &str = "UF";

pub const DEFAULT_DOCUMENT_ACCESS_CODE: &str = "U";
pub const DEFAULT_DOCUMENT_PARAGRAPH: &str = "";

const CASE_ARCHIVE_CODE: &str = "035";
const CASE_ARCHIVE_TYPE: &str = "FELLESKLASSE PRINSIPP";

/// Archive format of a file extension.
pub fn file_format(extension: &str) -> Option<&'static str> {
    VALID_FILE_EXTENSIONS
        .iter()
        .copied()
        .find(|valid| valid.eq_ignore_ascii_case(extension))
}

fn insert_responsible(parameter: &mut Map<String, Value>, responsible: &Responsible) {
    match responsible {
        Responsible::PersonEmail(email) => {
            parameter.insert("ResponsiblePersonEmail".into(), json!(email));
        }
        Responsible::EnterpriseRecno(recno) => {
            parameter.insert("ResponsibleEnterpriseRecno".into(), json!(recno));
        }
    }
}

fn insert_optional(parameter: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        parameter.insert(key.into(), json!(value));
    }
}

/// The main document keeps an archival version; attachments are converted
/// by the archive when they are PDF and left to its format table otherwise.
fn file_entry(file: &DocumentFile, main: bool) -> Value {
    if main {
        return json!({
            "Base64Data": file.base64,
            "Format": "PDF",
            "Status": "F",
            "Title": file.title,
            "VersionFormat": "A",
        });
    }
    let format = file_format(&file.extension).unwrap_or_else(|| {
        warn!(
            file = %file.title,
            extension = %file.extension,
            format = UNKNOWN_FILE_FORMAT,
            "Attachment extension is not accepted by the archive, using unknown format"
        );
        UNKNOWN_FILE_FORMAT
    });
    let version_format = if file.extension.eq_ignore_ascii_case("pdf") {
        json!("P")
    } else {
        Value::Null
    };
    json!({
        "Base64Data": file.base64,
        "Format": format,
        "Status": "F",
        "Title": file.title,
        "VersionFormat": version_format,
    })
}

/// `CreateCase` parameter.
pub fn create_case_parameter(request: &CaseRequest, external_id_type: &str) -> Value {
    let mut parameter = Map::new();
    parameter.insert("CaseType".into(), json!("Sak"));
    parameter.insert("Title".into(), json!(request.title));
    parameter.insert("Status".into(), json!("B"));
    parameter.insert(
        "ExternalId".into(),
        json!({ "Id": request.external_id, "Type": external_id_type }),
    );
    parameter.insert(
        "ArchiveCodes".into(),
        json!([{ "ArchiveCode": CASE_ARCHIVE_CODE, "ArchiveType": CASE_ARCHIVE_TYPE, "Sort": 1 }]),
    );
    insert_optional(&mut parameter, "AccessCode", &request.access_code);
    insert_optional(&mut parameter, "AccessGroup", &request.access_group);
    insert_optional(&mut parameter, "Paragraph", &request.paragraph);
    insert_responsible(&mut parameter, &request.responsible);
    Value::Object(parameter)
}

/// `CreateDocument` parameter. The first file is the main document.
pub fn create_document_parameter(request: &DocumentRequest) -> Value {
    let files: Vec<Value> = request
        .files
        .iter()
        .enumerate()
        .map(|(index, file)| file_entry(file, index == 0))
        .collect();

    let mut parameter = Map::new();
    parameter.insert(
        "AccessCode".into(),
        json!(
            request
                .access_code
                .as_deref()
                .unwrap_or(DEFAULT_DOCUMENT_ACCESS_CODE)
        ),
    );
    parameter.insert("AccessGroup".into(), json!(request.access_group));
    parameter.insert(
        "Paragraph".into(),
        json!(
            request
                .paragraph
                .as_deref()
                .unwrap_or(DEFAULT_DOCUMENT_PARAGRAPH)
        ),
    );
    parameter.insert("Archive".into(), json!("Saksdokument"));
    parameter.insert("CaseNumber".into(), json!(request.case_number));
    parameter.insert("Category".into(), json!("Internt notat uten oppfølging"));
    parameter.insert("DocumentDate".into(), json!(request.document_date));
    parameter.insert("Files".into(), Value::Array(files));
    parameter.insert("Status".into(), json!("J"));
    parameter.insert("Title".into(), json!(request.title));
    parameter.insert("UnofficialTitle".into(), json!(request.title));
    insert_responsible(&mut parameter, &request.responsible);
    Value::Object(parameter)
}

/// Archive API client.
#[derive(Clone)]
pub struct ArchiveClient {
    http: Client,
    settings: ArchiveApiSettings,
}

impl ArchiveClient {
    pub fn new(http: Client, settings: ArchiveApiSettings) -> Self {
        Self { http, settings }
    }

    async fn call(&self, service: &str, method: &str, parameter: Value) -> RemoteResult<Value> {
        let request = self
            .http
            .post(format!("{}/archive", self.settings.api_url))
            .bearer_auth(&self.settings.access_token)
            .json(&json!({ "service": service, "method": method, "parameter": parameter }));
        send_json(request).await
    }

    async fn call_list(&self, service: &str, method: &str, parameter: Value) -> RemoteResult<Vec<Value>> {
        match self.call(service, method, parameter).await? {
            Value::Array(entries) => Ok(entries),
            other => Err(RemoteError::UnexpectedResponse(format!(
                "{method}: expected an array, got {other}"
            ))),
        }
    }
}

#[async_trait]
impl ArchiveService for ArchiveClient {
    async fn find_or_create_case(&self, request: &CaseRequest) -> RemoteResult<CaseRecord> {
        let external_id = json!({
            "Id": request.external_id,
            "Type": self.settings.case_external_id_type,
        });
        let cases = self
            .call_list("CaseService", "GetCases", json!({ "ExternalId": external_id }))
            .await?;

        let open: Vec<&Value> = cases
            .iter()
            .filter(|case| {
                case.get("Status")
                    .and_then(Value::as_str)
                    .is_some_and(|status| OPEN_CASE_STATUSES.contains(&status))
            })
            .collect();
        if open.len() > 1 {
            warn!(
                external_id = %request.external_id,
                count = open.len(),
                "Several open cases share the external id, using the first"
            );
        }
        if let Some(case) = open.first() {
            let record = CaseRecord {
                recno: int_field(case, "Recno", "GetCases")?,
                case_number: str_field(case, "CaseNumber", "GetCases")?,
                created: false,
            };
            info!(external_id = %request.external_id, case_number = %record.case_number, "Found open case");
            return Ok(record);
        }

        let created = self
            .call(
                "CaseService",
                "CreateCase",
                create_case_parameter(request, &self.settings.case_external_id_type),
            )
            .await?;
        let record = CaseRecord {
            recno: int_field(&created, "Recno", "CreateCase")?,
            case_number: str_field(&created, "CaseNumber", "CreateCase")?,
            created: true,
        };
        info!(external_id = %request.external_id, case_number = %record.case_number, "Created case");
        Ok(record)
    }

    async fn count_filed_documents(&self, title: &str, case_number: &str) -> RemoteResult<usize> {
        let documents = self
            .call_list(
                "DocumentService",
                "GetDocuments",
                json!({ "Title": title, "CaseNumber": case_number }),
            )
            .await?;
        Ok(documents
            .iter()
            .filter(|document| {
                let filed = document
                    .get("StatusCode")
                    .and_then(Value::as_str)
                    .is_some_and(|code| FILED_DOCUMENT_STATUS_CODES.contains(&code));
                let same_case = document.get("CaseNumber").and_then(Value::as_str) == Some(case_number);
                filed && same_case
            })
            .count())
    }

    async fn file_document(&self, request: &DocumentRequest) -> RemoteResult<FiledDocument> {
        let created = self
            .call("DocumentService", "CreateDocument", create_document_parameter(request))
            .await?;
        Ok(FiledDocument {
            recno: int_field(&created, "Recno", "CreateDocument")?,
            document_number: str_field(&created, "DocumentNumber", "CreateDocument")?,
        })
    }
}
