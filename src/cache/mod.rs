//! Persistent content-addressable cache of generated step outputs.
//!
//! Each cacheable step (one scene's image, one narration segment, ...) is
//! identified by a stable *step key* and stores the hash of the inputs it
//! was generated from. A lookup only hits when both key and hash match, so
//! editing any parameter of a step regenerates exactly that step on the
//! next run.
//!
//! The cache lives at `<run>/.cache.json`:
//!
//! ```json
//! { "version": 1, "entries": { "image:scene_1": { "hash": "…", "outputPath": "…", "timestamp": 1700000000000 } } }
//! ```
//!
//! Audio entries may also carry `"duration"` in seconds, so a rerun can
//! rebuild the same timeline without measuring the file again.
//!
//! Every `set` persists immediately. A run directory is owned by a single
//! executor (see `assets::RunLayout::lock`), so no locking happens here.

pub mod hash;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CacheError;

pub use hash::{canonical_json, content_hash};

/// File name of the cache inside a run directory.
pub const CACHE_FILE_NAME: &str = ".cache.json";

/// On-disk format version written by this build.
pub const CACHE_VERSION: u32 = 1;

/// Build the step key for a step kind and its target (usually a scene id).
pub fn step_key(step: &str, target: &str) -> String {
    format!("{}:{}", step, target)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub hash: String,
    pub output_path: PathBuf,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, CacheEntry>,
}

#[derive(Debug)]
pub struct ContentCache {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl ContentCache {
    /// Cache for the run directory `run_dir` with no entries loaded.
    pub fn empty(run_dir: &Path) -> Self {
        Self {
            path: run_dir.join(CACHE_FILE_NAME),
            entries: BTreeMap::new(),
        }
    }

    /// Load the cache of `run_dir`. A missing file yields an empty cache.
    pub async fn load(run_dir: &Path) -> Result<Self, CacheError> {
        let mut cache = Self::empty(run_dir);
        let content = match tokio::fs::read_to_string(&cache.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(cache),
            Err(source) => {
                return Err(CacheError::Io {
                    path: cache.path,
                    source,
                });
            }
        };

        // Check the version before trusting the layout of `entries`.
        let raw: Value = serde_json::from_str(&content).map_err(|source| CacheError::Parse {
            path: cache.path.clone(),
            source,
        })?;
        let found = raw.get("version").and_then(Value::as_u64).unwrap_or(0);
        if found != u64::from(CACHE_VERSION) {
            return Err(CacheError::UnsupportedVersion {
                path: cache.path,
                found,
                expected: CACHE_VERSION,
            });
        }

        let file: CacheFile = serde_json::from_value(raw).map_err(|source| CacheError::Parse {
            path: cache.path.clone(),
            source,
        })?;
        cache.entries = file.entries;
        tracing::debug!(path = %cache.path.display(), entries = cache.entries.len(), "Loaded content cache");
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True only if `key` exists and was stored with exactly `hash`.
    pub fn has(&self, key: &str, hash: &str) -> bool {
        self.entries.get(key).is_some_and(|e| e.hash == hash)
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// The entry for `key` if it is a hit for `hash`.
    pub fn lookup(&self, key: &str, hash: &str) -> Option<&CacheEntry> {
        self.entries.get(key).filter(|e| e.hash == hash)
    }

    /// Insert or replace the entry for `key` and persist the cache.
    pub async fn set(
        &mut self,
        key: &str,
        hash: &str,
        output_path: impl Into<PathBuf>,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry {
            hash: hash.to_string(),
            output_path: output_path.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            duration: None,
        };
        self.entries.insert(key.to_string(), entry);
        self.save().await
    }

    /// Attach a duration to the entry for `key` if it is still a hit for
    /// `hash`, persisting only when the stored value changes.
    pub async fn set_duration(
        &mut self,
        key: &str,
        hash: &str,
        seconds: f64,
    ) -> Result<bool, CacheError> {
        let Some(entry) = self.entries.get_mut(key).filter(|e| e.hash == hash) else {
            return Ok(false);
        };
        if entry.duration == Some(seconds) {
            return Ok(false);
        }
        entry.duration = Some(seconds);
        self.save().await?;
        Ok(true)
    }

    /// Remove every entry and persist the empty cache.
    pub async fn clear(&mut self) -> Result<(), CacheError> {
        self.entries.clear();
        self.save().await
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &CacheEntry)> {
        self.entries.iter()
    }

    async fn save(&self) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        let file = CacheFile {
            version: CACHE_VERSION,
            entries: self.entries.clone(),
        };
        let content = serde_json::to_string_pretty(&file).map_err(|source| CacheError::Parse {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}
