// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Minutes archive service.
//!
//! HTTP adapters for the archive flow engine:
//! - [`graph::GraphClient`]: source lists and `$batch` updates
//! - [`archive::ArchiveClient`]: cases and documents
//! - [`pdf::PdfClient`]: meeting document rendering
//! - [`statistics::StatisticsClient`]: statistics records

pub mod arenas;
pub mod archive;
pub mod config;
pub mod error;
pub mod graph;
pub mod http;
pub mod pdf;
pub mod statistics;
pub mod summary;

use std::sync::Arc;

use minutes_archive_core::Collaborators;
use reqwest::Client;

use crate::archive::ArchiveClient;
use crate::config::Config;
use crate::graph::GraphClient;
use crate::pdf::PdfClient;
use crate::statistics::StatisticsClient;

/// Wire the HTTP adapters into the engine's collaborators.
pub fn collaborators(config: &Config, http: Client) -> Collaborators {
    let graph = Arc::new(GraphClient::new(http.clone(), config.graph.clone()));
    Collaborators {
        list_source: graph.clone(),
        batch: graph,
        archive: Arc::new(ArchiveClient::new(http.clone(), config.archive.clone())),
        renderer: Arc::new(PdfClient::new(http.clone(), config.pdf.clone())),
        statistics: Arc::new(StatisticsClient::new(http, config.statistics.clone())),
    }
}
