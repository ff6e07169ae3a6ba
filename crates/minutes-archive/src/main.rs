// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Minutes archive run
//!
//! One pass over every configured arena:
//! - discover meetings ready for archiving
//! - drive each eligible meeting through the archive pipeline
//! - prune finished meetings past retention

use std::sync::Arc;
use tracing::{error, info, warn};

use minutes_archive::arenas::load_arenas;
use minutes_archive::config::Config;
use minutes_archive::http::build_client;
use minutes_archive::summary;
use minutes_archive_core::collaborators::SystemClock;
use minutes_archive_core::{ArchiveEngine, CacheRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minutes_archive=info,minutes_archive_core=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;
    info!(
        tenant = %config.tenant_name,
        data_dir = %config.engine.data_dir.display(),
        arenas_file = %config.arenas_file.display(),
        "Starting minutes archive run"
    );

    let arenas = load_arenas(&config.arenas_file, &config.tenant_host()).await?;
    let http = build_client(config.http_timeout)?;
    let engine = ArchiveEngine::new(
        config.engine.clone(),
        minutes_archive::collaborators(&config, http),
        CacheRegistry::new(),
        Arc::new(SystemClock),
    )?;

    let reports = engine.run(&arenas).await;
    let failed_arenas = reports
        .iter()
        .filter(|report| !summary::log_report(report))
        .count();

    match engine.prune_finished().await {
        Ok(pruned) => info!(
            examined = pruned.examined,
            pruned = pruned.pruned,
            errors = pruned.errors,
            "Pruned finished meetings"
        ),
        Err(e) => error!(error = %e, "Failed to prune finished meetings"),
    }

    info!(arenas = reports.len(), failed_arenas, "Minutes archive run finished");
    Ok(())
}
