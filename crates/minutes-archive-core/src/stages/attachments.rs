// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `getMeetingAttachments`: download item attachments into the per-meeting cache.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Stage, StageFailure, StageOutput, root_string};
use crate::cache::{CacheRegistry, sanitize_key_component};
use crate::collaborators::ListSource;
use crate::config::{ArenaConfig, CacheLayout};
use crate::flow::JobName;
use crate::model::Meeting;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRecord {
    pub uri: String,
    pub name: String,
    pub extension: String,
    pub cache_key: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemAttachments {
    pub item_id: String,
    pub attachments: Vec<AttachmentRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentsResult {
    pub attachment_cache_dir: String,
    pub item_attachments: Vec<ItemAttachments>,
}

impl AttachmentsResult {
    /// Attachment file names of one item.
    pub fn names_for(&self, item_id: &str) -> Vec<String> {
        self.item_attachments
            .iter()
            .find(|item| item.item_id == item_id)
            .map(|item| item.attachments.iter().map(|a| a.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn all(&self) -> impl Iterator<Item = &AttachmentRecord> {
        self.item_attachments.iter().flat_map(|item| item.attachments.iter())
    }
}

/// Blob stored per attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AttachmentBlob {
    pub base64: String,
}

/// Extension after the last dot, empty when there is none.
fn extension(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_string())
        .unwrap_or_default()
}

pub struct GetMeetingAttachments {
    list_source: Arc<dyn ListSource>,
    caches: CacheRegistry,
    layout: CacheLayout,
}

impl GetMeetingAttachments {
    pub fn new(list_source: Arc<dyn ListSource>, caches: CacheRegistry, layout: CacheLayout) -> Self {
        Self {
            list_source,
            caches,
            layout,
        }
    }
}

#[async_trait]
impl Stage for GetMeetingAttachments {
    fn job(&self) -> JobName {
        JobName::GetMeetingAttachments
    }

    async fn run(&self, meeting: &Meeting, _arena: &ArenaConfig) -> Result<StageOutput, StageFailure> {
        let root = self.layout.attachments_root(&meeting.meeting_id);
        let cache = self.caches.open(&root)?;
        let mut result = AttachmentsResult {
            attachment_cache_dir: root_string(&root),
            item_attachments: Vec::new(),
        };

        for item in meeting.items.iter().filter(|item| item.has_attachments) {
            let listed = self
                .list_source
                .list_attachments(&meeting.list_info, &item.id)
                .await?;
            info!(item_id = %item.id, count = listed.len(), "Found attachments for item");

            let mut records = Vec::with_capacity(listed.len());
            for (index, attachment) in listed.into_iter().enumerate() {
                let cache_key = format!("{}-{}", sanitize_key_component(&item.id), index);
                if cache.has(&cache_key).await? {
                    debug!(item_id = %item.id, name = %attachment.name, "Attachment already cached, skipping download");
                } else {
                    let bytes = self.list_source.fetch_attachment(&attachment).await?;
                    cache
                        .set_as(
                            &cache_key,
                            &AttachmentBlob {
                                base64: STANDARD.encode(&bytes),
                            },
                        )
                        .await?;
                    debug!(item_id = %item.id, name = %attachment.name, bytes = bytes.len(), "Attachment downloaded");
                }
                records.push(AttachmentRecord {
                    extension: extension(&attachment.name),
                    uri: attachment.uri,
                    name: attachment.name,
                    cache_key,
                    index,
                });
            }

            result.item_attachments.push(ItemAttachments {
                item_id: item.id.clone(),
                attachments: records,
            });
        }

        Ok(StageOutput::new(&result)?)
    }
}
