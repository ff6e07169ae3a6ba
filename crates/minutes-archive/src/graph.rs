// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Source list access over the Graph API and SharePoint REST.
//!
//! [`GraphClient`] implements both [`ListSource`] (list resolution, ready
//! candidates, attachments) and [`BatchTransport`] (`POST $batch`).

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use minutes_archive_core::batch::{BatchRequest, BatchResponseItem, BatchTransport};
use minutes_archive_core::collaborators::{AttachmentRef, ListSource, RemoteResult};
use minutes_archive_core::config::ListLocator;
use minutes_archive_core::error::RemoteError;
use minutes_archive_core::model::{ListInfo, NOT_ARCHIVED, PublishFlag, RawItem};
use minutes_archive_core::schema::{columns, select_columns};

use crate::config::GraphSettings;
use crate::http::{send_bytes, send_json, str_field};

/// Lets Graph filter on columns that are not indexed.
const NON_INDEXED_QUERY_PREFERENCE: &str = "HonorNonIndexedQueriesWarningMayFailRandomly";

const SHAREPOINT_VERBOSE_JSON: &str = "application/json;odata=verbose";

/// Graph and SharePoint client for one tenant.
#[derive(Clone)]
pub struct GraphClient {
    http: Client,
    settings: GraphSettings,
}

/// One page of a Graph collection.
#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    value: Vec<Value>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    responses: Vec<BatchResponseItem>,
}

/// Filter selecting items not yet archived, marked for publishing and
/// dated before `ready_before`.
pub fn ready_filter(ready_before: DateTime<Utc>) -> String {
    format!(
        "(fields/{} eq '{}' and fields/{} eq '{}' and fields/{} lt '{}')",
        columns::DOCUMENT_NUMBER,
        NOT_ARCHIVED,
        columns::PUBLISH_ITEM,
        PublishFlag::Yes.as_str(),
        columns::MEETING_DATE,
        ready_before.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

/// The Graph `$batch` body. Reference ids stay on our side.
fn batch_body(requests: &[BatchRequest]) -> Value {
    let requests: Vec<Value> = requests
        .iter()
        .map(|request| {
            let mut entry = Map::new();
            entry.insert("id".into(), Value::from(request.id.clone()));
            entry.insert("method".into(), json!(request.method));
            entry.insert("url".into(), Value::from(request.url.clone()));
            if let Some(body) = &request.body {
                entry.insert("body".into(), body.clone());
            }
            if let Some(headers) = &request.headers {
                entry.insert("headers".into(), Value::Object(headers.clone()));
            }
            Value::Object(entry)
        })
        .collect();
    json!({ "requests": requests })
}

impl GraphClient {
    pub fn new(http: Client, settings: GraphSettings) -> Self {
        Self { http, settings }
    }

    /// Follow `@odata.nextLink` until the collection is exhausted.
    async fn paged(&self, first: Url, prefer: Option<&str>) -> RemoteResult<Vec<Value>> {
        let mut values = Vec::new();
        let mut next = Some(first.to_string());
        while let Some(url) = next {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(&self.settings.access_token);
            if let Some(prefer) = prefer {
                request = request.header("Prefer", prefer);
            }
            let page: Page = serde_json::from_value(send_json(request).await?).map_err(|e| {
                RemoteError::UnexpectedResponse(format!("unexpected collection page: {e}"))
            })?;
            debug!(count = page.value.len(), more = page.next_link.is_some(), "Fetched page");
            values.extend(page.value);
            next = page.next_link;
        }
        Ok(values)
    }

    fn graph_url(&self, path: &str, params: &[(&str, String)]) -> RemoteResult<Url> {
        let base = format!("{}{}", self.settings.api_url, path);
        let url = if params.is_empty() {
            Url::parse(&base)
        } else {
            Url::parse_with_params(&base, params)
        };
        url.map_err(|e| RemoteError::Transport(format!("invalid URL {base}: {e}")))
    }

    /// Base URL of the SharePoint site a list lives in.
    fn site_rest_url(&self, list: &ListInfo) -> RemoteResult<String> {
        let locator = ListLocator::parse(&list.list_url).map_err(RemoteError::UnexpectedResponse)?;
        Ok(format!(
            "{}/sites/{}",
            self.settings.sharepoint_url, locator.encoded_site_name
        ))
    }
}

#[async_trait]
impl ListSource for GraphClient {
    async fn resolve_list(&self, locator: &ListLocator) -> RemoteResult<ListInfo> {
        let url = self.graph_url(
            &format!("/sites/{}:/sites/{}:/lists", locator.host, locator.encoded_site_name),
            &[],
        )?;
        let lists = self.paged(url, None).await?;

        let wanted = format!(
            "https://{}/sites/{}/lists/{}",
            locator.host, locator.encoded_site_name, locator.encoded_list_name
        )
        .to_lowercase();
        let list = lists
            .iter()
            .find(|list| {
                list.get("webUrl")
                    .and_then(Value::as_str)
                    .is_some_and(|web_url| web_url.to_lowercase() == wanted)
            })
            .ok_or_else(|| {
                RemoteError::UnexpectedResponse(format!(
                    "no list with webUrl {wanted} in site {}",
                    locator.site_name
                ))
            })?;

        let site_id = list
            .get("parentReference")
            .map(|parent| str_field(parent, "siteId", "list parentReference"))
            .transpose()?
            .ok_or_else(|| {
                RemoteError::UnexpectedResponse("list has no parentReference".to_string())
            })?;

        let info = ListInfo {
            site_id,
            site_name: locator.site_name.clone(),
            list_id: str_field(list, "id", "list")?,
            list_name: str_field(list, "name", "list")?,
            list_display_name: str_field(list, "displayName", "list")?,
            list_url: str_field(list, "webUrl", "list")?,
        };
        info!(site = %info.site_name, list = %info.list_display_name, "Resolved list");
        Ok(info)
    }

    async fn list_ready_candidates(
        &self,
        list: &ListInfo,
        ready_before: DateTime<Utc>,
    ) -> RemoteResult<Vec<RawItem>> {
        let url = self.graph_url(
            &format!("/sites/{}/lists/{}/items", list.site_id, list.list_id),
            &[
                ("$expand", format!("fields($select={})", select_columns())),
                ("$filter", ready_filter(ready_before)),
                ("$select", "id,fields".to_string()),
            ],
        )?;
        let values = self.paged(url, Some(NON_INDEXED_QUERY_PREFERENCE)).await?;
        let items = values
            .into_iter()
            .map(|value| {
                serde_json::from_value::<RawItem>(value)
                    .map_err(|e| RemoteError::UnexpectedResponse(format!("unexpected list item: {e}")))
            })
            .collect::<RemoteResult<Vec<_>>>()?;
        info!(list = %list.list_display_name, count = items.len(), "Fetched ready items");
        Ok(items)
    }

    async fn list_attachments(&self, list: &ListInfo, item_id: &str) -> RemoteResult<Vec<AttachmentRef>> {
        if item_id.is_empty() || !item_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(RemoteError::UnexpectedResponse(format!(
                "item id must be numeric, got '{item_id}'"
            )));
        }
        let url = format!(
            "{}/_api/web/lists(guid'{}')/items({})/AttachmentFiles",
            self.site_rest_url(list)?,
            list.list_id,
            item_id
        );
        let request = self
            .http
            .get(&url)
            .bearer_auth(&self.settings.sharepoint_access_token)
            .header("Accept", SHAREPOINT_VERBOSE_JSON);
        let response = send_json(request).await?;

        let results = response
            .pointer("/d/results")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                RemoteError::UnexpectedResponse(format!("attachment listing has no d.results: {response}"))
            })?;
        results
            .iter()
            .map(|entry| {
                let uri = entry
                    .pointer("/__metadata/uri")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        RemoteError::UnexpectedResponse(format!("attachment has no __metadata.uri: {entry}"))
                    })?;
                Ok(AttachmentRef {
                    uri: uri.to_string(),
                    name: str_field(entry, "FileName", "attachment")?,
                })
            })
            .collect()
    }

    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> RemoteResult<Vec<u8>> {
        let prefix = format!("{}/sites/", self.settings.sharepoint_url).to_lowercase();
        if !attachment.uri.to_lowercase().starts_with(&prefix) {
            return Err(RemoteError::UnexpectedResponse(format!(
                "attachment uri {} is outside {}",
                attachment.uri, self.settings.sharepoint_url
            )));
        }
        let request = self
            .http
            .get(format!("{}/$value", attachment.uri))
            .bearer_auth(&self.settings.sharepoint_access_token);
        send_bytes(request).await
    }
}

#[async_trait]
impl BatchTransport for GraphClient {
    async fn submit(&self, requests: &[BatchRequest]) -> RemoteResult<Vec<BatchResponseItem>> {
        let request = self
            .http
            .post(format!("{}/$batch", self.settings.api_url))
            .bearer_auth(&self.settings.access_token)
            .json(&batch_body(requests));
        let response: BatchResponse = serde_json::from_value(send_json(request).await?)
            .map_err(|e| RemoteError::UnexpectedResponse(format!("unexpected batch response: {e}")))?;
        Ok(response.responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use minutes_archive_core::batch::BatchMethod;

    #[test]
    fn test_ready_filter() {
        let before = Utc.with_ymd_and_hms(2025, 1, 8, 6, 0, 0).unwrap();
        assert_eq!(
            ready_filter(before),
            "(fields/smart_DokumentNummer eq 'Ikke arkivert' and fields/smart_PublisereReferat eq 'Ja' \
             and fields/smart_Motedato lt '2025-01-08T06:00:00.000Z')"
        );
    }

    #[test]
    fn test_batch_body_drops_reference_ids() {
        let body = batch_body(&[BatchRequest {
            id: "0".into(),
            reference_id: "17".into(),
            method: BatchMethod::Patch,
            url: "/sites/s/lists/l/items/17/fields".into(),
            body: Some(json!({"smart_ArkiverPaaNytt": "Nei"})),
            headers: None,
        }]);
        assert_eq!(
            body,
            json!({"requests": [{
                "id": "0",
                "method": "PATCH",
                "url": "/sites/s/lists/l/items/17/fields",
                "body": {"smart_ArkiverPaaNytt": "Nei"}
            }]})
        );
    }
}
