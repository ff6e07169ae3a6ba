// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine and arena configuration.
//!
//! [`EngineConfig`] comes from environment variables. Arena configuration is
//! deserialized into [`RawArenaConfig`] and resolved once into
//! [`ArenaConfig`], where title strategies, the responsible party and the
//! list locator are fixed for the rest of the run.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Deserialize;

use crate::cache::sanitize_key_component;
use crate::retry::BackoffTable;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an unusable value.
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),

    /// An arena entry is invalid.
    #[error("Invalid configuration for arena '{arena}': {message}")]
    Arena {
        /// Arena name (or list URL when the name is missing).
        arena: String,
        /// What is wrong.
        message: String,
    },

    /// Two arenas share a value that must be unique.
    #[error("Duplicate {field} found: {value}")]
    Duplicate {
        /// Field that must be unique.
        field: &'static str,
        /// The repeated value.
        value: String,
    },
}

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Parent directory of all cache roots
    pub data_dir: PathBuf,
    /// Retry backoff table
    pub backoff: BackoffTable,
    /// How long finished records are kept
    pub retention: Duration,
    /// Items become ready for archiving once their meeting is this old
    pub ready_after: Duration,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = PathBuf::from(
            std::env::var("MINUTES_ARCHIVE_DATA_DIR")
                .unwrap_or_else(|_| "./.minutes-archive".to_string()),
        );

        let backoff = match std::env::var("MINUTES_ARCHIVE_BACKOFF_MINUTES") {
            Ok(raw) => BackoffTable::parse(&raw)?,
            Err(_) => BackoffTable::default(),
        };

        let retention_days: i64 = std::env::var("MINUTES_ARCHIVE_RETENTION_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("MINUTES_ARCHIVE_RETENTION_DAYS", "expected a number of days")
            })?;

        let ready_after_days: i64 = std::env::var("MINUTES_ARCHIVE_READY_AFTER_DAYS")
            .unwrap_or_else(|_| "7".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "MINUTES_ARCHIVE_READY_AFTER_DAYS",
                    "expected a number of days",
                )
            })?;

        if retention_days < 0 {
            return Err(ConfigError::Invalid(
                "MINUTES_ARCHIVE_RETENTION_DAYS",
                "must not be negative",
            ));
        }
        if ready_after_days < 0 {
            return Err(ConfigError::Invalid(
                "MINUTES_ARCHIVE_READY_AFTER_DAYS",
                "must not be negative",
            ));
        }

        Ok(Self {
            data_dir,
            backoff,
            retention: Duration::days(retention_days),
            ready_after: Duration::days(ready_after_days),
        })
    }

    pub fn layout(&self) -> CacheLayout {
        CacheLayout::new(self.data_dir.clone())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./.minutes-archive"),
            backoff: BackoffTable::default(),
            retention: Duration::days(30),
            ready_after: Duration::days(7),
        }
    }
}

/// Cache roots under the data directory, one per concern.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    data_dir: PathBuf,
}

impl CacheLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    /// Active (in-progress) meetings.
    pub fn queue_root(&self) -> PathBuf {
        self.data_dir.join("queue")
    }

    /// Meetings whose flow finished.
    pub fn finished_root(&self) -> PathBuf {
        self.data_dir.join("finished")
    }

    /// Downloaded attachments of one meeting.
    pub fn attachments_root(&self, meeting_id: &str) -> PathBuf {
        self.data_dir.join("attachments").join(meeting_id)
    }

    /// Rendered meeting documents.
    pub fn pdf_root(&self) -> PathBuf {
        self.data_dir.join("pdfs")
    }

    /// Resolved list metadata.
    pub fn list_info_root(&self) -> PathBuf {
        self.data_dir.join("list-info")
    }
}

// ============================================================================
// Arena configuration
// ============================================================================

/// Arena entry as it appears in the arenas file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawArenaConfig {
    pub arena: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub list_url: String,
    pub archive: RawArchiveSettings,
    pub pdf: RawPdfSettings,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawArchiveSettings {
    #[serde(default)]
    pub responsible_person_email: Option<String>,
    #[serde(default)]
    pub responsible_enterprise_recno: Option<i64>,
    pub case_external_id_prefix: String,
    pub document_access_group: String,
    #[serde(default)]
    pub case_access_code: Option<String>,
    #[serde(default)]
    pub case_access_group: Option<String>,
    #[serde(default)]
    pub case_paragraph: Option<String>,
    #[serde(default)]
    pub document_access_code: Option<String>,
    #[serde(default)]
    pub document_paragraph: Option<String>,
    #[serde(default)]
    pub case_title: Option<String>,
    #[serde(default)]
    pub document_title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawPdfSettings {
    pub sector: String,
}

/// Resolved configuration for one arena (one source list).
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    pub name: String,
    pub enabled: bool,
    pub list: ListLocator,
    pub archive: ArchiveSettings,
    pub pdf: PdfSettings,
}

/// Archive defaults for cases and documents created for an arena.
#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    pub responsible: Responsible,
    pub case_external_id_prefix: String,
    pub document_access_group: String,
    pub case_access_code: Option<String>,
    pub case_access_group: Option<String>,
    pub case_paragraph: Option<String>,
    pub document_access_code: Option<String>,
    pub document_paragraph: Option<String>,
    pub case_title: TitleStrategy,
    pub document_title: TitleStrategy,
}

#[derive(Debug, Clone)]
pub struct PdfSettings {
    pub sector: String,
}

/// Responsible party for created cases and documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Responsible {
    PersonEmail(String),
    EnterpriseRecno(i64),
}

/// Input to title generation.
#[derive(Debug, Clone, Copy)]
pub struct TitleContext<'a> {
    pub arena: &'a str,
    pub meeting_id: &'a str,
    pub meeting_date: NaiveDate,
}

/// Signature of a programmatic title function.
pub type TitleFn = Arc<dyn Fn(&TitleContext<'_>) -> String + Send + Sync>;

/// How a case or document title is produced.
#[derive(Clone, Default)]
pub enum TitleStrategy {
    /// The built-in title.
    #[default]
    Default,
    /// A template with `{arena}`, `{year}` and `{date}` placeholders.
    Template(String),
    /// A function installed programmatically.
    Custom(TitleFn),
}

impl fmt::Debug for TitleStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TitleStrategy::Default => f.write_str("Default"),
            TitleStrategy::Template(template) => f.debug_tuple("Template").field(template).finish(),
            TitleStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

const TEMPLATE_PLACEHOLDERS: [&str; 3] = ["arena", "year", "date"];

impl TitleStrategy {
    /// Build a template strategy, rejecting unknown placeholders.
    pub fn template(template: impl Into<String>) -> Result<Self, String> {
        let template = template.into();
        let mut rest = template.as_str();
        while let Some(start) = rest.find('{') {
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                return Err(format!("unterminated placeholder in '{template}'"));
            };
            let name = &after[..end];
            if !TEMPLATE_PLACEHOLDERS.contains(&name) {
                return Err(format!(
                    "unknown placeholder '{{{name}}}' in '{template}', expected one of {{arena}}, {{year}}, {{date}}"
                ));
            }
            rest = &after[end + 1..];
        }
        Ok(TitleStrategy::Template(template))
    }

    /// Install a title function.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&TitleContext<'_>) -> String + Send + Sync + 'static,
    {
        TitleStrategy::Custom(Arc::new(f))
    }

    /// Produce a title, using `default` for [`TitleStrategy::Default`].
    pub fn render(&self, ctx: &TitleContext<'_>, default: impl FnOnce() -> String) -> String {
        match self {
            TitleStrategy::Default => default(),
            TitleStrategy::Template(template) => template
                .replace("{arena}", ctx.arena)
                .replace("{year}", &ctx.meeting_date.year().to_string())
                .replace("{date}", &pretty_date(ctx.meeting_date)),
            TitleStrategy::Custom(f) => f(ctx),
        }
    }
}

/// `dd.mm.yyyy`
pub fn pretty_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// Parsed `https://<host>/sites/<site>/lists/<list>...` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListLocator {
    pub url: String,
    pub host: String,
    pub encoded_site_name: String,
    pub encoded_list_name: String,
    pub site_name: String,
    pub list_name: String,
}

impl ListLocator {
    /// Parse a list URL. Anything after the list segment is ignored.
    pub fn parse(url: &str) -> Result<Self, String> {
        let format = "https://<host>/sites/<site>/lists/<list>";
        let rest = url
            .strip_prefix("https://")
            .ok_or_else(|| format!("listUrl must have the format {format}, got: {url}"))?;
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        let mut parts = rest.split('/');
        let host = parts.next().unwrap_or_default();
        let path: Vec<&str> = parts.filter(|p| !p.is_empty()).collect();

        if host.is_empty()
            || path.len() < 4
            || !path[0].eq_ignore_ascii_case("sites")
            || !path[2].eq_ignore_ascii_case("lists")
        {
            return Err(format!("listUrl must have the format {format}, got: {url}"));
        }

        let decode = |raw: &str| {
            urlencoding::decode(raw)
                .map(|s| s.into_owned())
                .map_err(|e| format!("listUrl segment '{raw}' is not valid UTF-8: {e}"))
        };

        Ok(Self {
            url: url.to_string(),
            host: host.to_ascii_lowercase(),
            encoded_site_name: path[1].to_string(),
            encoded_list_name: path[3].to_string(),
            site_name: decode(path[1])?,
            list_name: decode(path[3])?,
        })
    }

    /// Key of the resolved list metadata in the list-info cache.
    pub fn cache_key(&self) -> String {
        format!(
            "{}-{}",
            sanitize_key_component(&self.site_name),
            sanitize_key_component(&self.list_name)
        )
    }
}

impl RawArenaConfig {
    /// Validate one arena entry.
    pub fn resolve(self) -> Result<ArenaConfig, ConfigError> {
        let label = if self.arena.trim().is_empty() {
            self.list_url.clone()
        } else {
            self.arena.clone()
        };
        let invalid = |message: String| ConfigError::Arena {
            arena: label.clone(),
            message,
        };

        if self.arena.trim().is_empty() {
            return Err(invalid("arena must not be empty".to_string()));
        }

        let list = ListLocator::parse(&self.list_url).map_err(&invalid)?;

        let archive = self.archive;
        let responsible = match (
            archive.responsible_person_email,
            archive.responsible_enterprise_recno,
        ) {
            (Some(email), None) => {
                if !email.contains('@') {
                    return Err(invalid(format!(
                        "responsiblePersonEmail '{email}' is not an email address"
                    )));
                }
                Responsible::PersonEmail(email)
            }
            (None, Some(recno)) => Responsible::EnterpriseRecno(recno),
            (Some(_), Some(_)) => {
                return Err(invalid(
                    "only one of responsiblePersonEmail and responsibleEnterpriseRecno may be set"
                        .to_string(),
                ));
            }
            (None, None) => {
                return Err(invalid(
                    "either responsiblePersonEmail or responsibleEnterpriseRecno must be set"
                        .to_string(),
                ));
            }
        };

        if archive.case_external_id_prefix.trim().is_empty() {
            return Err(invalid("caseExternalIdPrefix must not be empty".to_string()));
        }

        let title = |raw: Option<String>| match raw {
            Some(template) => TitleStrategy::template(template).map_err(&invalid),
            None => Ok(TitleStrategy::Default),
        };
        let case_title = title(archive.case_title)?;
        let document_title = title(archive.document_title)?;

        Ok(ArenaConfig {
            name: self.arena,
            enabled: self.enabled,
            list,
            archive: ArchiveSettings {
                responsible,
                case_external_id_prefix: archive.case_external_id_prefix,
                document_access_group: archive.document_access_group,
                case_access_code: archive.case_access_code,
                case_access_group: archive.case_access_group,
                case_paragraph: archive.case_paragraph,
                document_access_code: archive.document_access_code,
                document_paragraph: archive.document_paragraph,
                case_title,
                document_title,
            },
            pdf: PdfSettings {
                sector: self.pdf.sector,
            },
        })
    }
}

/// Resolve every arena and check that names and list URLs are unique.
pub fn resolve_arenas(raw: Vec<RawArenaConfig>) -> Result<Vec<ArenaConfig>, ConfigError> {
    let mut names = HashSet::new();
    let mut urls = HashSet::new();
    let mut arenas = Vec::with_capacity(raw.len());
    for entry in raw {
        let arena = entry.resolve()?;
        if !names.insert(arena.name.clone()) {
            return Err(ConfigError::Duplicate {
                field: "arena",
                value: arena.name,
            });
        }
        if !urls.insert(arena.list.url.to_ascii_lowercase()) {
            return Err(ConfigError::Duplicate {
                field: "listUrl",
                value: arena.list.url,
            });
        }
        arenas.push(arena);
    }
    Ok(arenas)
}
