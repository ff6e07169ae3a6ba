// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Batched source-list updates and reconciliation.
//!
//! Every request carries a business `reference_id` (the list item id) next to
//! the transport `id`. Responses are matched back through the transport id to
//! the reference id, so an item only counts as updated once the remote side
//! confirmed it.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{Error, RemoteError, Result};
use crate::model::ListInfo;

/// Maximum number of requests in one batch.
pub const MAX_BATCH_SIZE: usize = 20;

/// HTTP methods accepted in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BatchMethod {
    Get,
    Patch,
    Post,
    Put,
    Delete,
}

/// One request inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    /// Transport id, unique within one reconciliation call.
    pub id: String,
    /// Business id the request belongs to.
    pub reference_id: String,
    pub method: BatchMethod,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,
}

/// Per-request response from the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponseItem {
    pub id: String,
    pub status: u16,
    #[serde(default)]
    pub body: Value,
}

impl BatchResponseItem {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Submits one batch of requests.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Submit a batch. An `Err` means the whole batch was rejected.
    async fn submit(
        &self,
        requests: &[BatchRequest],
    ) -> std::result::Result<Vec<BatchResponseItem>, RemoteError>;
}

/// An item the remote side confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedItem {
    pub item_id: String,
    pub status: u16,
    #[serde(default)]
    pub payload: Value,
}

/// An item the remote side refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub item_id: String,
    pub status: u16,
    #[serde(default)]
    pub error: Value,
}

/// Outcome of one reconciliation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub finished_items: Vec<FinishedItem>,
    pub failed_items: Vec<FailedItem>,
    pub batch_requests: Vec<Vec<BatchRequest>>,
    /// Batches rejected as a whole, with the transport error.
    #[serde(default)]
    pub rejected_batches: Vec<Value>,
}

/// Split requests into batches of at most `max` in input order.
pub fn chunk(requests: Vec<BatchRequest>, max: usize) -> Result<Vec<Vec<BatchRequest>>> {
    if max == 0 {
        return Err(Error::validation("maxBatchSize", "must be greater than zero"));
    }
    let mut batches = Vec::with_capacity(requests.len().div_ceil(max));
    let mut current = Vec::with_capacity(max.min(requests.len()));
    for request in requests {
        if current.len() == max {
            batches.push(std::mem::take(&mut current));
        }
        current.push(request);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    Ok(batches)
}

/// Field-update requests for the given list items.
pub fn field_update_requests(
    list: &ListInfo,
    item_ids: &[String],
    fields: &Map<String, Value>,
) -> Vec<BatchRequest> {
    let mut headers = Map::new();
    headers.insert("Content-Type".to_string(), Value::from("application/json"));
    item_ids
        .iter()
        .enumerate()
        .map(|(index, item_id)| BatchRequest {
            id: index.to_string(),
            reference_id: item_id.clone(),
            method: BatchMethod::Patch,
            url: format!(
                "/sites/{}/lists/{}/items/{}/fields",
                list.site_id, list.list_id, item_id
            ),
            body: Some(Value::Object(fields.clone())),
            headers: Some(headers.clone()),
        })
        .collect()
}

/// Update `fields` on every item and report which updates were confirmed.
///
/// Batches go out strictly in sequence. A rejected batch is logged and its
/// items are simply absent from the result, so the next attempt picks them up.
pub async fn reconcile(
    transport: &dyn BatchTransport,
    list: &ListInfo,
    item_ids: &[String],
    fields: &Map<String, Value>,
) -> Result<Reconciliation> {
    if item_ids.is_empty() {
        return Err(Error::validation("itemIds", "at least one item id is required"));
    }

    let batches = chunk(field_update_requests(list, item_ids, fields), MAX_BATCH_SIZE)?;
    let mut outcome = Reconciliation {
        batch_requests: batches.clone(),
        ..Default::default()
    };

    for (index, batch) in batches.iter().enumerate() {
        let responses = match transport.submit(batch).await {
            Ok(responses) => responses,
            Err(e) => {
                warn!(batch = index, requests = batch.len(), error = %e, "Batch rejected, items stay unresolved");
                outcome.rejected_batches.push(serde_json::json!({
                    "batch": index,
                    "error": e.to_string(),
                }));
                continue;
            }
        };

        let references: HashMap<&str, &str> = batch
            .iter()
            .map(|request| (request.id.as_str(), request.reference_id.as_str()))
            .collect();

        for response in responses {
            let Some(item_id) = references.get(response.id.as_str()) else {
                warn!(batch = index, response_id = %response.id, "Ignoring response with unknown id");
                continue;
            };
            if response.is_success() {
                outcome.finished_items.push(FinishedItem {
                    item_id: item_id.to_string(),
                    status: response.status,
                    payload: response.body,
                });
            } else {
                outcome.failed_items.push(FailedItem {
                    item_id: item_id.to_string(),
                    status: response.status,
                    error: response.body,
                });
            }
        }
    }

    info!(
        requested = item_ids.len(),
        finished = outcome.finished_items.len(),
        failed = outcome.failed_items.len(),
        rejected_batches = outcome.rejected_batches.len(),
        "Batch reconciliation done"
    );
    Ok(outcome)
}

/// Append newly finished items, keeping the first record per item id.
pub fn merge_finished(accumulated: &mut Vec<FinishedItem>, new: Vec<FinishedItem>) {
    let mut seen: HashSet<String> = accumulated.iter().map(|i| i.item_id.clone()).collect();
    for item in new {
        if seen.insert(item.item_id.clone()) {
            accumulated.push(item);
        }
    }
}

/// Requested ids that are not in `finished`, in request order.
pub fn unresolved(requested: &[String], finished: &[FinishedItem]) -> Vec<String> {
    let done: HashSet<&str> = finished.iter().map(|i| i.item_id.as_str()).collect();
    requested
        .iter()
        .filter(|id| !done.contains(id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requests(n: usize) -> Vec<BatchRequest> {
        (0..n)
            .map(|i| BatchRequest {
                id: i.to_string(),
                reference_id: format!("item-{i}"),
                method: BatchMethod::Patch,
                url: format!("/items/{i}"),
                body: None,
                headers: None,
            })
            .collect()
    }

    #[test]
    fn test_chunk_zero_is_rejected() {
        assert!(chunk(requests(3), 0).is_err());
        assert!(chunk(Vec::new(), 20).unwrap().is_empty());
    }

    #[test]
    fn test_method_serializes_uppercase() {
        assert_eq!(serde_json::to_value(BatchMethod::Patch).unwrap(), "PATCH");
    }

    #[test]
    fn test_field_update_requests() {
        let list = ListInfo {
            site_id: "s".into(),
            site_name: "S".into(),
            list_id: "l".into(),
            list_name: "L".into(),
            list_display_name: "L".into(),
            list_url: "u".into(),
        };
        let mut fields = Map::new();
        fields.insert("smart_DokumentNummer".into(), Value::from("25/1-3"));
        let reqs = field_update_requests(&list, &["7".to_string(), "9".to_string()], &fields);
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[1].id, "1");
        assert_eq!(reqs[1].reference_id, "9");
        assert_eq!(reqs[1].url, "/sites/s/lists/l/items/9/fields");
        assert_eq!(reqs[1].body.as_ref().unwrap()["smart_DokumentNummer"], "25/1-3");
    }

    #[test]
    fn test_merge_and_unresolved() {
        let item = |id: &str| FinishedItem {
            item_id: id.into(),
            status: 200,
            payload: Value::Null,
        };
        let mut acc = vec![item("a")];
        merge_finished(&mut acc, vec![item("a"), item("b")]);
        assert_eq!(acc.len(), 2);

        let requested: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(unresolved(&requested, &acc), vec!["c".to_string()]);
    }
}
