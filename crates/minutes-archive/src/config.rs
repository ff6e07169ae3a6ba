// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use minutes_archive_core::config::{ConfigError, EngineConfig};

/// Graph API and SharePoint REST endpoints.
#[derive(Debug, Clone)]
pub struct GraphSettings {
    /// Graph API base URL, e.g. `https://graph.microsoft.com/v1.0`
    pub api_url: String,
    pub access_token: String,
    /// SharePoint REST base URL, e.g. `https://contoso.sharepoint.com`
    pub sharepoint_url: String,
    pub sharepoint_access_token: String,
}

/// Document archive API.
#[derive(Debug, Clone)]
pub struct ArchiveApiSettings {
    pub api_url: String,
    pub access_token: String,
    /// `Type` of the external id put on created cases
    pub case_external_id_type: String,
}

/// An HTTP function authenticated with an `x-functions-key` header.
#[derive(Debug, Clone)]
pub struct FunctionSettings {
    pub api_url: String,
    pub api_key: String,
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SharePoint tenant name (`<tenant>.sharepoint.com`)
    pub tenant_name: String,
    pub graph: GraphSettings,
    pub archive: ArchiveApiSettings,
    pub pdf: FunctionSettings,
    pub statistics: FunctionSettings,
    /// JSON file with the arena definitions
    pub arenas_file: PathBuf,
    /// Timeout applied to every outgoing request
    pub http_timeout: Duration,
    pub engine: EngineConfig,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn optional(name: &str, default: impl FnOnce() -> String) -> String {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(default)
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `SHAREPOINT_TENANT_NAME`
    /// - `GRAPH_ACCESS_TOKEN`, `SHAREPOINT_ACCESS_TOKEN`
    /// - `ARCHIVE_API_URL`, `ARCHIVE_ACCESS_TOKEN`
    /// - `PDF_API_URL`, `PDF_API_KEY`
    /// - `STATISTICS_API_URL`, `STATISTICS_API_KEY`
    /// - `MINUTES_ARCHIVE_ARENAS_FILE`
    ///
    /// Optional:
    /// - `GRAPH_API_URL` (default `https://graph.microsoft.com/v1.0`)
    /// - `SHAREPOINT_REST_URL` (default `https://<tenant>.sharepoint.com`)
    /// - `ARCHIVE_CASE_EXTERNAL_ID_TYPE` (default `SMART-motereferat`)
    /// - `MINUTES_ARCHIVE_HTTP_TIMEOUT_SECS` (default 120)
    /// - the engine variables read by [`EngineConfig::from_env`]
    pub fn from_env() -> Result<Self, ConfigError> {
        let tenant_name = required("SHAREPOINT_TENANT_NAME")?;

        let graph = GraphSettings {
            api_url: trim_url(optional("GRAPH_API_URL", || {
                "https://graph.microsoft.com/v1.0".to_string()
            })),
            access_token: required("GRAPH_ACCESS_TOKEN")?,
            sharepoint_url: trim_url(optional("SHAREPOINT_REST_URL", || {
                format!("https://{tenant_name}.sharepoint.com")
            })),
            sharepoint_access_token: required("SHAREPOINT_ACCESS_TOKEN")?,
        };

        let archive = ArchiveApiSettings {
            api_url: trim_url(required("ARCHIVE_API_URL")?),
            access_token: required("ARCHIVE_ACCESS_TOKEN")?,
            case_external_id_type: optional("ARCHIVE_CASE_EXTERNAL_ID_TYPE", || {
                "SMART-motereferat".to_string()
            }),
        };

        let pdf = FunctionSettings {
            api_url: required("PDF_API_URL")?,
            api_key: required("PDF_API_KEY")?,
        };
        let statistics = FunctionSettings {
            api_url: required("STATISTICS_API_URL")?,
            api_key: required("STATISTICS_API_KEY")?,
        };

        let arenas_file = PathBuf::from(required("MINUTES_ARCHIVE_ARENAS_FILE")?);

        let timeout_secs: u64 = optional("MINUTES_ARCHIVE_HTTP_TIMEOUT_SECS", || "120".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("MINUTES_ARCHIVE_HTTP_TIMEOUT_SECS", "expected a number of seconds")
            })?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "MINUTES_ARCHIVE_HTTP_TIMEOUT_SECS",
                "must be greater than zero",
            ));
        }

        Ok(Self {
            tenant_name,
            graph,
            archive,
            pdf,
            statistics,
            arenas_file,
            http_timeout: Duration::from_secs(timeout_secs),
            engine: EngineConfig::from_env()?,
        })
    }

    /// Host every arena list must live on.
    pub fn tenant_host(&self) -> String {
        format!("{}.sharepoint.com", self.tenant_name.to_ascii_lowercase())
    }
}
