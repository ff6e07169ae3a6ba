// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Archive adapter against a mock server.

use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use minutes_archive::archive::ArchiveClient;
use minutes_archive::config::ArchiveApiSettings;
use minutes_archive::http::build_client;
use minutes_archive_core::collaborators::{ArchiveService, CaseRequest, DocumentFile, DocumentRequest};
use minutes_archive_core::config::Responsible;
use minutes_archive_core::error::RemoteError;

fn client(server: &MockServer) -> ArchiveClient {
    ArchiveClient::new(
        build_client(Duration::from_secs(5)).unwrap(),
        ArchiveApiSettings {
            api_url: server.uri(),
            access_token: "archive-token".to_string(),
            case_external_id_type: "SMART-motereferat".to_string(),
        },
    )
}

fn case_request() -> CaseRequest {
    CaseRequest {
        external_id: "SMART-LG-2025".to_string(),
        title: "Møtereferater - Ledergruppe - 2025".to_string(),
        responsible: Responsible::PersonEmail("leder@contoso.no".to_string()),
        access_code: None,
        access_group: None,
        paragraph: None,
    }
}

fn file(title: &str, extension: &str) -> DocumentFile {
    DocumentFile {
        title: title.to_string(),
        extension: extension.to_string(),
        base64: "AAAA".to_string(),
    }
}

async fn mount_method(server: &MockServer, archive_method: &str, response: Value, expect: u64) {
    Mock::given(method("POST"))
        .and(path("/archive"))
        .and(header("Authorization", "Bearer archive-token"))
        .and(body_partial_json(json!({"method": archive_method})))
        .respond_with(ResponseTemplate::new(200).set_body_json(response))
        .expect(expect)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_open_case_is_reused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/archive"))
        .and(body_partial_json(json!({
            "service": "CaseService",
            "method": "GetCases",
            "parameter": {"ExternalId": {"Id": "SMART-LG-2025", "Type": "SMART-motereferat"}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"Recno": 10, "CaseNumber": "24/00010", "Status": "Avsluttet"},
            {"Recno": 11, "CaseNumber": "25/00011", "Status": "Under behandling"},
            {"Recno": 12, "CaseNumber": "25/00012", "Status": "Reservert"}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    mount_method(&server, "CreateCase", json!({}), 0).await;

    let case = client(&server).find_or_create_case(&case_request()).await.unwrap();
    assert_eq!(case.recno, 11);
    assert_eq!(case.case_number, "25/00011");
    assert!(!case.created);
}

#[tokio::test]
async fn test_case_is_created_when_none_is_open() {
    let server = MockServer::start().await;
    mount_method(
        &server,
        "GetCases",
        json!([{"Recno": 10, "CaseNumber": "24/00010", "Status": "Avsluttet"}]),
        1,
    )
    .await;
    mount_method(&server, "CreateCase", json!({"Recno": 13, "CaseNumber": "25/00013"}), 1).await;

    let case = client(&server).find_or_create_case(&case_request()).await.unwrap();
    assert_eq!(case.case_number, "25/00013");
    assert!(case.created);

    let received = server.received_requests().await.unwrap();
    let create: Value = received[1].body_json().unwrap();
    assert_eq!(create["parameter"]["CaseType"], "Sak");
    assert_eq!(create["parameter"]["Status"], "B");
    assert_eq!(create["parameter"]["ResponsiblePersonEmail"], "leder@contoso.no");
    assert_eq!(
        create["parameter"]["ExternalId"],
        json!({"Id": "SMART-LG-2025", "Type": "SMART-motereferat"})
    );
}

#[tokio::test]
async fn test_case_lookup_must_return_array() {
    let server = MockServer::start().await;
    mount_method(&server, "GetCases", json!({"Message": "nope"}), 1).await;

    let err = client(&server).find_or_create_case(&case_request()).await.unwrap_err();
    assert!(matches!(err, RemoteError::UnexpectedResponse(_)));
}

#[tokio::test]
async fn test_count_filed_documents() {
    let server = MockServer::start().await;
    mount_method(
        &server,
        "GetDocuments",
        json!([
            {"DocumentNumber": "25/00011-1", "StatusCode": "J", "CaseNumber": "25/00011"},
            {"DocumentNumber": "25/00011-2", "StatusCode": "A", "CaseNumber": "25/00011"},
            {"DocumentNumber": "25/00011-3", "StatusCode": "R", "CaseNumber": "25/00011"},
            {"DocumentNumber": "25/00099-1", "StatusCode": "J", "CaseNumber": "25/00099"}
        ]),
        1,
    )
    .await;

    let count = client(&server)
        .count_filed_documents("Møtereferat - Ledergruppe - 15.01.2025", "25/00011")
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_file_document_payload() {
    let server = MockServer::start().await;
    mount_method(
        &server,
        "CreateDocument",
        json!({"Recno": 500, "DocumentNumber": "25/00011-4"}),
        1,
    )
    .await;

    let request = DocumentRequest {
        case_number: "25/00011".to_string(),
        title: "Møtereferat - Ledergruppe - 15.01.2025 - Etterarkivering".to_string(),
        document_date: "2025-01-15".to_string(),
        responsible: Responsible::EnterpriseRecno(200016),
        access_code: None,
        access_group: "Alle".to_string(),
        paragraph: None,
        files: vec![
            file("Møtereferat - Ledergruppe - 15.01.2025", "pdf"),
            file("vedlegg.PDF", "PDF"),
            file("budsjett.xlsx", "xlsx"),
            file("skisse.sketch", "sketch"),
        ],
    };
    let document = client(&server).file_document(&request).await.unwrap();
    assert_eq!(document.recno, 500);
    assert_eq!(document.document_number, "25/00011-4");

    let received = server.received_requests().await.unwrap();
    let sent: Value = received[0].body_json().unwrap();
    assert_eq!(sent["service"], "DocumentService");
    let parameter = &sent["parameter"];
    assert_eq!(parameter["AccessCode"], "U");
    assert_eq!(parameter["AccessGroup"], "Alle");
    assert_eq!(parameter["Paragraph"], "");
    assert_eq!(parameter["Archive"], "Saksdokument");
    assert_eq!(parameter["Status"], "J");
    assert_eq!(parameter["Title"], request.title);
    assert_eq!(parameter["UnofficialTitle"], request.title);
    assert_eq!(parameter["ResponsibleEnterpriseRecno"], 200016);

    let files = parameter["Files"].as_array().unwrap();
    assert_eq!(files.len(), 4);
    assert_eq!(files[0]["Format"], "PDF");
    assert_eq!(files[0]["VersionFormat"], "A");
    assert_eq!(files[1]["Format"], "PDF");
    assert_eq!(files[1]["VersionFormat"], "P");
    assert_eq!(files[2]["Format"], "XLSX");
    assert_eq!(files[2]["VersionFormat"], Value::Null);
    assert_eq!(files[3]["Format"], "UF");
    assert!(files.iter().all(|f| f["Status"] == "F"));
}

#[tokio::test]
async fn test_file_document_requires_document_number() {
    let server = MockServer::start().await;
    mount_method(&server, "CreateDocument", json!({"Recno": 500}), 1).await;

    let request = DocumentRequest {
        case_number: "25/00011".to_string(),
        title: "Møtereferat".to_string(),
        document_date: "2025-01-15".to_string(),
        responsible: Responsible::EnterpriseRecno(200016),
        access_code: Some("13".to_string()),
        access_group: "Alle".to_string(),
        paragraph: Some("Offl. § 13".to_string()),
        files: vec![file("Møtereferat", "pdf")],
    };
    let err = client(&server).file_document(&request).await.unwrap_err();
    assert!(matches!(err, RemoteError::UnexpectedResponse(_)));
}
