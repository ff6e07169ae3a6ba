// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Archive flow engine for meeting minutes.
//!
//! Items are read from a source list, grouped into meetings and driven
//! through a fixed pipeline of remote operations. Progress is persisted in a
//! tiered cache after every job attempt, so a failure at any stage resumes on
//! a later run without repeating finished work.
//!
//! ```text
//! list source ─► queue builder ─► retry scheduler ─► orchestrator ─► stages
//!                     ▲                                   │
//!                     └──────────── tiered cache ◄────────┘
//! ```
//!
//! The pipeline:
//!
//! 1. `getMeetingAttachments`
//! 2. `syncMeetingArchiveCase`
//! 3. `createPdf`
//! 4. `archiveMeeting`
//! 5. `setMeetingItemsToArchived`
//! 6. `createStatistic`
//! 7. `cleanUpMeeting`

pub mod batch;
pub mod cache;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod flow;
pub mod mock;
pub mod model;
pub mod orchestrator;
pub mod queue;
pub mod retention;
pub mod retry;
pub mod schema;
pub mod stages;

pub use cache::{CacheHandle, CacheRegistry};
pub use config::{ArenaConfig, EngineConfig};
pub use engine::{ArchiveEngine, ArenaReport, Collaborators, MeetingReport};
pub use error::{CacheError, Error, RemoteError, Result, StageError};
pub use flow::{ArchiveFlowStatus, JobName, JobStatus};
pub use model::{Meeting, MeetingItem};
