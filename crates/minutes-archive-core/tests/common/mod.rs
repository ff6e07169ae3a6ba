// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for the archive flow tests.
//!
//! Provides TestContext with an engine wired to in-memory collaborators and a
//! temporary data directory.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value, json};
use tempfile::TempDir;

use minutes_archive_core::config::{ArenaConfig, EngineConfig, RawArenaConfig};
use minutes_archive_core::mock::{FixedClock, MockCollaborators, MockListSource};
use minutes_archive_core::model::{ListInfo, RawItem};
use minutes_archive_core::retry::BackoffTable;
use minutes_archive_core::{ArchiveEngine, CacheHandle, CacheRegistry};

pub const LIST_URL: &str = "https://contoso.sharepoint.com/sites/SMART%20Motes/Lists/Sakliste";

/// Meeting id of items dated 2025-01-14T23:00Z (rolled to the 15th).
pub const MEETING_ID: &str = "SMART Motes-Sakliste-2025-01-15";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap()
}

pub fn arena() -> ArenaConfig {
    arena_with(LIST_URL, json!({}))
}

/// Arena with extra `archive` settings merged in.
pub fn arena_with(list_url: &str, archive_overrides: Value) -> ArenaConfig {
    let mut archive = json!({
        "responsibleEnterpriseRecno": 200016,
        "caseExternalIdPrefix": "SMART-LG",
        "documentAccessGroup": "Alle"
    });
    if let (Some(base), Some(extra)) = (archive.as_object_mut(), archive_overrides.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    let raw: RawArenaConfig = serde_json::from_value(json!({
        "arena": "Ledergruppe",
        "listUrl": list_url,
        "archive": archive,
        "pdf": { "sector": "Samfunn" }
    }))
    .unwrap();
    raw.resolve().unwrap()
}

/// A valid candidate row.
pub fn raw_item(id: &str, meeting_date: &str, has_attachments: bool) -> RawItem {
    let mut fields = Map::new();
    fields.insert("Title".into(), json!(format!("Sak {id}")));
    fields.insert("smart_Status".into(), json!("Ferdig"));
    fields.insert("smart_Sakstype".into(), json!("Orienteringssak"));
    fields.insert("smart_PublisereReferat".into(), json!("Ja"));
    fields.insert("smart_PublisereVedlegg".into(), json!("Ja"));
    fields.insert("smart_Motedato".into(), json!(meeting_date));
    fields.insert("smart_Sortering".into(), json!(10));
    fields.insert("Attachments".into(), json!(has_attachments));
    RawItem {
        id: id.to_string(),
        fields,
    }
}

pub fn list_info() -> ListInfo {
    let arena = arena();
    MockListSource::list_info_for(&arena.list)
}

/// Test context with an engine, its mocks and a controllable clock.
pub struct TestContext {
    pub mocks: MockCollaborators,
    pub clock: Arc<FixedClock>,
    pub caches: CacheRegistry,
    pub config: EngineConfig,
    pub engine: ArchiveEngine,
    pub arena: ArenaConfig,
    _temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_backoff(BackoffTable::default())
    }

    pub fn with_backoff(backoff: BackoffTable) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = EngineConfig {
            data_dir: temp_dir.path().join("data"),
            backoff,
            ..Default::default()
        };
        let mocks = MockCollaborators::new();
        let clock = Arc::new(FixedClock::new(start_time()));
        let caches = CacheRegistry::new();
        let engine = ArchiveEngine::new(
            config.clone(),
            mocks.collaborators(),
            caches.clone(),
            clock.clone(),
        )
        .unwrap();
        Self {
            mocks,
            clock,
            caches,
            config,
            engine,
            arena: arena(),
            _temp_dir: temp_dir,
        }
    }

    pub fn queue(&self) -> CacheHandle {
        self.caches.open(self.config.layout().queue_root()).unwrap()
    }

    pub fn finished(&self) -> CacheHandle {
        self.caches.open(self.config.layout().finished_root()).unwrap()
    }

    /// Two items for the same meeting, the second with one attachment.
    pub async fn seed_meeting(&self) {
        self.mocks
            .list_source
            .set_candidates(vec![
                raw_item("1", "2025-01-14T23:00:00Z", false),
                raw_item("2", "2025-01-14T23:00:00Z", true),
            ])
            .await;
        self.mocks
            .list_source
            .add_attachment("2", "budsjett.xlsx", b"xlsx bytes")
            .await;
    }
}
