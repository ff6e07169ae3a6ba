// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Graph and SharePoint adapter against a mock server.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use minutes_archive::config::GraphSettings;
use minutes_archive::graph::{GraphClient, ready_filter};
use minutes_archive::http::build_client;
use minutes_archive_core::batch::{BatchMethod, BatchRequest, BatchTransport};
use minutes_archive_core::collaborators::{AttachmentRef, ListSource};
use minutes_archive_core::config::ListLocator;
use minutes_archive_core::error::RemoteError;
use minutes_archive_core::model::ListInfo;

const LIST_URL: &str = "https://contoso.sharepoint.com/sites/SMART/Lists/Sakliste";

fn client(server: &MockServer) -> GraphClient {
    GraphClient::new(
        build_client(Duration::from_secs(5)).unwrap(),
        GraphSettings {
            api_url: server.uri(),
            access_token: "graph-token".to_string(),
            sharepoint_url: server.uri(),
            sharepoint_access_token: "sp-token".to_string(),
        },
    )
}

fn list_info() -> ListInfo {
    ListInfo {
        site_id: "site-1".to_string(),
        site_name: "SMART".to_string(),
        list_id: "list-1".to_string(),
        list_name: "Sakliste".to_string(),
        list_display_name: "Sakliste".to_string(),
        list_url: LIST_URL.to_string(),
    }
}

#[tokio::test]
async fn test_resolve_list_matches_web_url() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sites/contoso.sharepoint.com:/sites/SMART:/lists"))
        .and(header("Authorization", "Bearer graph-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {
                    "id": "list-0",
                    "name": "Dokumenter",
                    "displayName": "Dokumenter",
                    "webUrl": "https://contoso.sharepoint.com/sites/SMART/Shared%20Documents",
                    "parentReference": {"siteId": "site-1"}
                },
                {
                    "id": "list-1",
                    "name": "Sakliste",
                    "displayName": "Sakliste",
                    "webUrl": "https://contoso.sharepoint.com/sites/SMART/Lists/Sakliste",
                    "parentReference": {"siteId": "site-1"}
                }
            ]
        })))
        .mount(&server)
        .await;

    let locator = ListLocator::parse("https://contoso.sharepoint.com/sites/SMART/lists/sakliste").unwrap();
    let info = client(&server).resolve_list(&locator).await.unwrap();
    assert_eq!(info.list_id, "list-1");
    assert_eq!(info.site_id, "site-1");
    assert_eq!(info.site_name, "SMART");
    assert_eq!(info.list_display_name, "Sakliste");
    assert!(info.is_complete());
}

#[tokio::test]
async fn test_resolve_list_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sites/contoso.sharepoint.com:/sites/SMART:/lists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .mount(&server)
        .await;

    let locator = ListLocator::parse(LIST_URL).unwrap();
    let err = client(&server).resolve_list(&locator).await.unwrap_err();
    assert!(matches!(err, RemoteError::UnexpectedResponse(_)));
}

#[tokio::test]
async fn test_candidates_follow_next_link() {
    let server = MockServer::start().await;
    let ready_before = Utc.with_ymd_and_hms(2025, 1, 25, 12, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/sites/site-1/lists/list-1/items"))
        .and(query_param("$filter", ready_filter(ready_before)))
        .and(query_param("$select", "id,fields"))
        .and(header("Prefer", "HonorNonIndexedQueriesWarningMayFailRandomly"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": "1", "fields": {"Title": "Budsjett"}}],
            "@odata.nextLink": format!("{}/items-page-2", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/items-page-2"))
        .and(header("Prefer", "HonorNonIndexedQueriesWarningMayFailRandomly"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": "2", "@odata.etag": "\"abc,1\"", "fields": {"Title": "Referater"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = client(&server)
        .list_ready_candidates(&list_info(), ready_before)
        .await
        .unwrap();
    let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert_eq!(items[1].fields["Title"], json!("Referater"));
}

#[tokio::test]
async fn test_error_status_keeps_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sites/site-1/lists/list-1/items"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": "TooManyRequests"}
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .list_ready_candidates(&list_info(), Utc::now())
        .await
        .unwrap_err();
    match err {
        RemoteError::Status { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body["error"]["code"], "TooManyRequests");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_list_and_fetch_attachments() {
    let server = MockServer::start().await;
    let uri = format!(
        "{}/sites/SMART/_api/Web/Lists(guid'list-1')/Items(2)/AttachmentFiles('budsjett.xlsx')",
        server.uri()
    );

    Mock::given(method("GET"))
        .and(path("/sites/SMART/_api/web/lists(guid'list-1')/items(2)/AttachmentFiles"))
        .and(header("Accept", "application/json;odata=verbose"))
        .and(header("Authorization", "Bearer sp-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "d": {"results": [{"__metadata": {"uri": uri}, "FileName": "budsjett.xlsx"}]}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"/AttachmentFiles\('budsjett\.xlsx'\)/\$value$"))
        .and(header("Authorization", "Bearer sp-token"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"xlsx-bytes".to_vec()))
        .mount(&server)
        .await;

    let graph = client(&server);
    let attachments = graph.list_attachments(&list_info(), "2").await.unwrap();
    assert_eq!(
        attachments,
        vec![AttachmentRef {
            uri: uri.clone(),
            name: "budsjett.xlsx".to_string()
        }]
    );

    let bytes = graph.fetch_attachment(&attachments[0]).await.unwrap();
    assert_eq!(bytes, b"xlsx-bytes");
}

#[tokio::test]
async fn test_attachment_outside_sharepoint_is_refused() {
    let server = MockServer::start().await;
    let attachment = AttachmentRef {
        uri: "https://elsewhere.example.com/sites/SMART/file".to_string(),
        name: "file.pdf".to_string(),
    };
    let err = client(&server).fetch_attachment(&attachment).await.unwrap_err();
    assert!(matches!(err, RemoteError::UnexpectedResponse(_)));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_non_numeric_item_id_is_refused() {
    let server = MockServer::start().await;
    let err = client(&server)
        .list_attachments(&list_info(), "2)/../x")
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::UnexpectedResponse(_)));
}

#[tokio::test]
async fn test_submit_batch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/$batch"))
        .and(header("Authorization", "Bearer graph-token"))
        .and(body_partial_json(json!({
            "requests": [{
                "id": "0",
                "method": "PATCH",
                "url": "/sites/site-1/lists/list-1/items/7/fields",
                "body": {"smart_DokumentNummer": "25/00001-3"}
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responses": [{"id": "0", "status": 200, "body": {"id": "7"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let responses = client(&server)
        .submit(&[BatchRequest {
            id: "0".to_string(),
            reference_id: "7".to_string(),
            method: BatchMethod::Patch,
            url: "/sites/site-1/lists/list-1/items/7/fields".to_string(),
            body: Some(json!({"smart_DokumentNummer": "25/00001-3"})),
            headers: None,
        }])
        .await
        .unwrap();
    assert_eq!(responses.len(), 1);
    assert!(responses[0].is_success());
    assert_eq!(responses[0].body["id"], "7");

    let received = server.received_requests().await.unwrap();
    let sent: serde_json::Value = received[0].body_json().unwrap();
    assert!(sent["requests"][0].get("referenceId").is_none());
}
