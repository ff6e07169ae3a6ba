// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Meeting document rendering through the PDF function.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use minutes_archive_core::collaborators::{DocumentRenderer, RemoteResult, RenderRequest};
use minutes_archive_core::error::RemoteError;

use crate::config::FunctionSettings;
use crate::http::send_json;

const TEMPLATE: &str = "motereferatV2";

/// Request body for the PDF function.
pub fn render_body(request: &RenderRequest) -> Value {
    let items: Vec<Value> = request
        .meeting_items
        .iter()
        .map(|item| {
            json!({
                "title": item.title,
                "descriptionText": item.description,
                "itemStatus": item.item_status,
                "itemType": item.item_type,
                "decisionText": item.decision,
                "itemResponsibleName": item.item_responsible_name,
                "attachments": item
                    .attachments
                    .iter()
                    .map(|name| json!({ "fileName": name }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    json!({
        "system": "smart",
        "template": TEMPLATE,
        "language": "nb",
        "type": "2",
        "version": "B",
        "data": {
            "meetingDate": request.meeting_date,
            "sector": request.sector,
            "meetingCaseNumber": request.meeting_case_number,
            "paragraph": request.paragraph,
            "meetingTitle": request.meeting_title,
            "meetingItems": items,
        }
    })
}

#[derive(Clone)]
pub struct PdfClient {
    http: Client,
    settings: FunctionSettings,
}

impl PdfClient {
    pub fn new(http: Client, settings: FunctionSettings) -> Self {
        Self { http, settings }
    }
}

#[async_trait]
impl DocumentRenderer for PdfClient {
    async fn render(&self, request: &RenderRequest) -> RemoteResult<Vec<u8>> {
        let response = send_json(
            self.http
                .post(&self.settings.api_url)
                .header("x-functions-key", &self.settings.api_key)
                .json(&render_body(request)),
        )
        .await?;

        let encoded = response
            .pointer("/data/base64")
            .and_then(Value::as_str)
            .filter(|encoded| !encoded.is_empty())
            .ok_or_else(|| {
                RemoteError::UnexpectedResponse("PDF response has no data.base64".to_string())
            })?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| RemoteError::UnexpectedResponse(format!("PDF payload is not base64: {e}")))?;
        debug!(bytes = bytes.len(), meeting = %request.meeting_title, "Rendered meeting document");
        Ok(bytes)
    }
}
