// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared request handling for the HTTP adapters.
//!
//! Non-2xx responses become [`RemoteError::Status`] carrying the parsed body,
//! so the structured error is what lands in a job's `lastError`.

use std::time::Duration;

use minutes_archive_core::error::RemoteError;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

/// Build the HTTP client shared by all adapters.
pub fn build_client(timeout: Duration) -> Result<Client, RemoteError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RemoteError::Transport(format!("Failed to create HTTP client: {e}")))
}

/// Response body as JSON, falling back to a string, or null when empty.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Send a request and fail on transport errors and non-2xx statuses.
pub(crate) async fn send(request: RequestBuilder) -> Result<Response, RemoteError> {
    let response = request
        .send()
        .await
        .map_err(|e| RemoteError::Transport(format!("HTTP request failed: {e}")))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let text = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), url = %url, "Request returned error status");
    Err(RemoteError::Status {
        status: status.as_u16(),
        body: parse_body(&text),
    })
}

/// Send a request and parse the JSON response (null for an empty body).
pub(crate) async fn send_json(request: RequestBuilder) -> Result<Value, RemoteError> {
    let text = send(request)
        .await?
        .text()
        .await
        .map_err(|e| RemoteError::Transport(format!("Failed to read response body: {e}")))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|e| RemoteError::UnexpectedResponse(format!("response is not JSON: {e}")))
}

/// Send a request and return the raw response bytes.
pub(crate) async fn send_bytes(request: RequestBuilder) -> Result<Vec<u8>, RemoteError> {
    send(request)
        .await?
        .bytes()
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(|e| RemoteError::Transport(format!("Failed to read response body: {e}")))
}

/// Required string field of a JSON object.
pub(crate) fn str_field(value: &Value, key: &str, context: &str) -> Result<String, RemoteError> {
    match value.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(RemoteError::UnexpectedResponse(format!(
            "{context}: missing '{key}' in {value}"
        ))),
    }
}

/// Required integer field of a JSON object.
pub(crate) fn int_field(value: &Value, key: &str, context: &str) -> Result<i64, RemoteError> {
    let parsed = match value.get(key) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        RemoteError::UnexpectedResponse(format!("{context}: missing '{key}' in {value}"))
    })
}
