// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Statistics function adapter.

use async_trait::async_trait;
use reqwest::Client;

use minutes_archive_core::collaborators::{RemoteResult, StatisticReceipt, StatisticRecord, StatisticsSink};
use minutes_archive_core::error::RemoteError;

use crate::config::FunctionSettings;
use crate::http::send_json;

#[derive(Clone)]
pub struct StatisticsClient {
    http: Client,
    settings: FunctionSettings,
}

impl StatisticsClient {
    pub fn new(http: Client, settings: FunctionSettings) -> Self {
        Self { http, settings }
    }
}

#[async_trait]
impl StatisticsSink for StatisticsClient {
    async fn emit(&self, record: &StatisticRecord) -> RemoteResult<StatisticReceipt> {
        let response = send_json(
            self.http
                .post(&self.settings.api_url)
                .header("x-functions-key", &self.settings.api_key)
                .json(record),
        )
        .await?;
        serde_json::from_value(response.clone()).map_err(|e| {
            RemoteError::UnexpectedResponse(format!("unexpected statistics receipt {response}: {e}"))
        })
    }
}
