// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Arena definitions file.
//!
//! The file is a JSON array of arena entries:
//!
//! ```json
//! [
//!   {
//!     "arena": "Ledergruppe",
//!     "listUrl": "https://contoso.sharepoint.com/sites/SMART/Lists/Ledergruppe",
//!     "archive": {
//!       "responsiblePersonEmail": "leder@contoso.no",
//!       "caseExternalIdPrefix": "SMART-LG",
//!       "documentAccessGroup": "Alle"
//!     },
//!     "pdf": { "sector": "Samfunn" }
//!   }
//! ]
//! ```

use std::path::Path;

use minutes_archive_core::config::{ArenaConfig, RawArenaConfig, resolve_arenas};
use tracing::info;

use crate::error::ArenaFileError;

/// Parse and validate arena definitions. Every list must live on `tenant_host`.
pub fn parse_arenas(
    path: &Path,
    contents: &str,
    tenant_host: &str,
) -> Result<Vec<ArenaConfig>, ArenaFileError> {
    let raw: Vec<RawArenaConfig> =
        serde_json::from_str(contents).map_err(|source| ArenaFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let arenas = resolve_arenas(raw)?;

    let expected = tenant_host.to_ascii_lowercase();
    if let Some(arena) = arenas.iter().find(|arena| arena.list.host != expected) {
        return Err(ArenaFileError::WrongTenant {
            arena: arena.name.clone(),
            host: arena.list.host.clone(),
            expected,
        });
    }
    Ok(arenas)
}

/// Read the arenas file.
pub async fn load_arenas(path: &Path, tenant_host: &str) -> Result<Vec<ArenaConfig>, ArenaFileError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ArenaFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let arenas = parse_arenas(path, &contents, tenant_host)?;
    info!(
        path = %path.display(),
        arenas = arenas.len(),
        enabled = arenas.iter().filter(|a| a.enabled).count(),
        "Loaded arena definitions"
    );
    Ok(arenas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minutes_archive_core::config::{ConfigError, Responsible};
    use tempfile::TempDir;

    const FILE: &str = r#"[
        {
            "arena": "Ledergruppe",
            "listUrl": "https://contoso.sharepoint.com/sites/SMART/Lists/Ledergruppe",
            "archive": {
                "responsiblePersonEmail": "leder@contoso.no",
                "caseExternalIdPrefix": "SMART-LG",
                "documentAccessGroup": "Alle"
            },
            "pdf": { "sector": "Samfunn" }
        },
        {
            "arena": "Styret",
            "enabled": false,
            "listUrl": "https://contoso.sharepoint.com/sites/SMART/Lists/Styret",
            "archive": {
                "responsibleEnterpriseRecno": 200016,
                "caseExternalIdPrefix": "SMART-ST",
                "documentAccessGroup": "Alle",
                "documentTitle": "Styremøte {date}"
            },
            "pdf": { "sector": "Samfunn" }
        }
    ]"#;

    #[tokio::test]
    async fn test_load_arenas() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("arenas.json");
        std::fs::write(&path, FILE).unwrap();

        let arenas = load_arenas(&path, "contoso.sharepoint.com").await.unwrap();
        assert_eq!(arenas.len(), 2);
        assert_eq!(arenas[0].name, "Ledergruppe");
        assert_eq!(
            arenas[0].archive.responsible,
            Responsible::PersonEmail("leder@contoso.no".to_string())
        );
        assert!(!arenas[1].enabled);
        assert_eq!(arenas[1].list.list_name, "Styret");
    }

    #[test]
    fn test_wrong_tenant_is_rejected() {
        let err = parse_arenas(Path::new("arenas.json"), FILE, "fabrikam.sharepoint.com").unwrap_err();
        match err {
            ArenaFileError::WrongTenant { arena, host, .. } => {
                assert_eq!(arena, "Ledergruppe");
                assert_eq!(host, "contoso.sharepoint.com");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let contents = FILE.replace("\"sector\"", "\"sectr\"");
        let err = parse_arenas(Path::new("arenas.json"), &contents, "contoso.sharepoint.com").unwrap_err();
        assert!(matches!(err, ArenaFileError::Parse { .. }));
    }

    #[test]
    fn test_duplicate_arena_is_rejected() {
        let contents = FILE.replace("\"Styret\",", "\"Ledergruppe\",");
        let err = parse_arenas(Path::new("arenas.json"), &contents, "contoso.sharepoint.com").unwrap_err();
        assert!(matches!(
            err,
            ArenaFileError::Config(ConfigError::Duplicate { field: "arena", .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_arenas(&dir.path().join("nope.json"), "contoso.sharepoint.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaFileError::Read { .. }));
    }
}
