// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tiered key/value cache: durable JSON files with a shared in-memory overlay.
//!
//! Every durable handle writes one `<key>.json` file per entry under its root
//! directory. Reads are served from the in-memory overlay when possible and
//! backfill it from disk otherwise.
//!
//! Overlays are owned by a [`CacheRegistry`]. All handles opened through the
//! same registry against the same (normalized) root share exactly one overlay,
//! so a write through one handle is visible to the others without touching
//! disk. Handles opened without a root are memory-only and private.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::CacheError;

/// Maximum length of a cache key. `<key>.json` must fit in a 255-byte file name.
pub const MAX_KEY_LEN: usize = 250;

const FILE_SUFFIX: &str = ".json";

/// Suffix of the file a durable write goes through before its rename.
const TMP_SUFFIX: &str = ".tmp";

type Overlay = Arc<RwLock<HashMap<String, Value>>>;

/// Validate a cache key and return it unchanged.
///
/// Keys are restricted to `[a-zA-Z0-9._ -]` and [`MAX_KEY_LEN`] characters,
/// and must not start with a dot.
pub fn validate_key(key: &str) -> Result<&str, CacheError> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey {
            key: key.to_string(),
            reason: "key must not be empty",
        });
    }
    if key.starts_with('.') {
        return Err(CacheError::InvalidKey {
            key: key.to_string(),
            reason: "key must not start with a dot",
        });
    }
    if key.len() > MAX_KEY_LEN {
        return Err(CacheError::InvalidKey {
            key: key.to_string(),
            reason: "key is too long",
        });
    }
    if !key.chars().all(is_key_char) {
        return Err(CacheError::InvalidKey {
            key: key.to_string(),
            reason: "key must only contain [a-zA-Z0-9._ -]",
        });
    }
    Ok(key)
}

/// Strip every character that is not allowed in a cache key.
///
/// Used when building keys from free text such as site and list names.
/// Leading dots are dropped as well.
pub fn sanitize_key_component(raw: &str) -> String {
    let sanitized: String = raw.chars().filter(|c| is_key_char(*c)).collect();
    sanitized.trim_start_matches('.').to_string()
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ' ' | '-')
}

/// Lexically normalize a cache root so equivalent spellings share one overlay.
///
/// `./data/queue/`, `data//queue` and `data/./queue` all normalize to `data/queue`.
pub fn normalize_root(root: &Path) -> Result<PathBuf, CacheError> {
    let mut normalized = PathBuf::new();
    for component in root.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(CacheError::InvalidRoot {
            root: root.display().to_string(),
            reason: "root must name a directory",
        });
    }
    Ok(normalized)
}

/// Registry of in-memory overlays, one per normalized durable root.
///
/// The registry is an explicit object whose lifetime is tied to the run;
/// clones share the same overlays.
#[derive(Debug, Clone, Default)]
pub struct CacheRegistry {
    overlays: Arc<Mutex<HashMap<PathBuf, Overlay>>>,
}

impl CacheRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a durable handle for `root`, sharing the overlay of any other
    /// handle opened on the same normalized root.
    pub fn open(&self, root: impl AsRef<Path>) -> Result<CacheHandle, CacheError> {
        let root = normalize_root(root.as_ref())?;
        let overlay = {
            let mut overlays = self.overlays.lock().unwrap_or_else(|e| e.into_inner());
            overlays
                .entry(root.clone())
                .or_insert_with(|| Arc::new(RwLock::new(HashMap::new())))
                .clone()
        };
        Ok(CacheHandle {
            root: Some(root),
            overlay,
        })
    }

    /// Number of distinct roots with an overlay.
    pub fn len(&self) -> usize {
        self.overlays.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no overlay has been created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A handle to one logical cache.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    root: Option<PathBuf>,
    overlay: Overlay,
}

impl CacheHandle {
    /// Create a memory-only handle. It is never persisted and never shared.
    pub fn memory() -> Self {
        Self {
            root: None,
            overlay: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The normalized durable root, or `None` for memory-only handles.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn file_path(&self, key: &str) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("{key}{FILE_SUFFIX}")))
    }

    fn overlay_get(&self, key: &str) -> Option<Value> {
        self.overlay
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn overlay_insert(&self, key: &str, value: Value) {
        self.overlay
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
    }

    fn overlay_remove(&self, key: &str) {
        self.overlay
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    /// Store a raw JSON value. `null` counts as a missing value.
    ///
    /// The durable file is written (via a temporary file and rename) before
    /// the shared overlay is updated.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        let key = validate_key(key)?;
        if value.is_null() {
            return Err(CacheError::MissingValue(key.to_string()));
        }

        if let (Some(root), Some(path)) = (self.root.as_ref(), self.file_path(key)) {
            tokio::fs::create_dir_all(root)
                .await
                .map_err(|source| CacheError::Io {
                    key: key.to_string(),
                    source,
                })?;
            let json = serde_json::to_vec_pretty(&value).map_err(|source| CacheError::Json {
                key: key.to_string(),
                source,
            })?;
            let tmp_path = root.join(format!("{key}{TMP_SUFFIX}"));
            tokio::fs::write(&tmp_path, json)
                .await
                .map_err(|source| CacheError::Io {
                    key: key.to_string(),
                    source,
                })?;
            tokio::fs::rename(&tmp_path, &path)
                .await
                .map_err(|source| CacheError::Io {
                    key: key.to_string(),
                    source,
                })?;
        }

        self.overlay_insert(key, value);
        Ok(())
    }

    /// Serialize and store a typed value.
    pub async fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let value = serde_json::to_value(value).map_err(|source| CacheError::Json {
            key: key.to_string(),
            source,
        })?;
        self.set(key, value).await
    }

    /// Fetch a raw JSON value, backfilling the overlay from disk on a miss.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let key = validate_key(key)?;
        if let Some(value) = self.overlay_get(key) {
            return Ok(Some(value));
        }

        let Some(path) = self.file_path(key) else {
            return Ok(None);
        };

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    key: key.to_string(),
                    source,
                });
            }
        };
        let value: Value = serde_json::from_slice(&bytes).map_err(|source| CacheError::Json {
            key: key.to_string(),
            source,
        })?;
        debug!(key = %key, "Cache miss in memory, loaded from disk");
        self.overlay_insert(key, value.clone());
        Ok(Some(value))
    }

    /// Fetch and deserialize a typed value.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| CacheError::Json {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Remove a key from both tiers. Absent keys are a no-op.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let key = validate_key(key)?;
        self.overlay_remove(key);
        if let Some(path) = self.file_path(key) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(CacheError::Io {
                        key: key.to_string(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Whether the key exists in memory or on disk.
    pub async fn has(&self, key: &str) -> Result<bool, CacheError> {
        let key = validate_key(key)?;
        if self.overlay_get(key).is_some() {
            return Ok(true);
        }
        match self.file_path(key) {
            Some(path) => tokio::fs::try_exists(&path)
                .await
                .map_err(|source| CacheError::Io {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(false),
        }
    }

    /// Drop the in-memory overlay only. Durable files are untouched.
    pub fn clear_memory(&self) {
        self.overlay
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Destroy the durable root and the overlay.
    pub async fn clear(&self) -> Result<(), CacheError> {
        if let Some(root) = &self.root {
            match tokio::fs::remove_dir_all(root).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(CacheError::Io {
                        key: "*".to_string(),
                        source,
                    });
                }
            }
        }
        self.clear_memory();
        Ok(())
    }

    /// All keys, sorted. Durable handles list the files on disk.
    pub async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let Some(root) = &self.root else {
            let mut keys: Vec<String> = self
                .overlay
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .keys()
                .cloned()
                .collect();
            keys.sort();
            return Ok(keys);
        };

        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CacheError::Io {
                    key: "*".to_string(),
                    source,
                });
            }
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| CacheError::Io {
            key: "*".to_string(),
            source,
        })? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(key) = name.strip_suffix(FILE_SUFFIX) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Number of entries.
    pub async fn size(&self) -> Result<usize, CacheError> {
        Ok(self.keys().await?.len())
    }
}
