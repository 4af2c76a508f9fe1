//! Per-run directory layout and asset paths.
//!
//! ```text
//! <output>/<YYYY-MM-DD>-<slug>/
//!   .cache.json  .lock  workflow.json  cost.json  timeline.json
//!   transcript.json  mix.json
//!   assets/   generated media
//!   logs/     scenecast.log
//! ```

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use fs2::FileExt;

use crate::errors::ExecutorError;

const ASSETS_DIR: &str = "assets";
const LOGS_DIR: &str = "logs";
const LOCK_FILE: &str = ".lock";
const MAX_SLUG_LEN: usize = 48;

/// Prefix of run-level asset names. Scene ids may not start with it, so a
/// scene's files never collide with them.
pub const RESERVED_PREFIX: &str = scenecast_common::RESERVED_ID_PREFIX;

/// Kind of asset a step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Narration,
    Image,
    ReferenceImage,
    Video,
    /// The n-th sound effect of a scene
    SoundEffect(usize),
    Music,
}

/// Maps (scene, asset kind) to a stable local path.
pub trait AssetPathProvider: Send + Sync {
    fn asset_path(&self, scene_id: &str, kind: AssetKind) -> PathBuf;
}

/// Lowercase, ASCII-alphanumeric, dash-separated.
pub fn slugify(name: &str) -> String {
    let slug = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let slug: String = slug.chars().take(MAX_SLUG_LEN).collect();
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "workflow".to_string()
    } else {
        slug
    }
}

#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    /// Layout for a fresh run of `workflow_name` on `date` under `output_dir`.
    /// Re-running the same workflow on the same day reuses the directory,
    /// which is what makes incremental re-runs hit the cache.
    pub fn for_workflow(output_dir: &Path, workflow_name: &str, date: NaiveDate) -> Self {
        let dir = format!("{}-{}", date.format("%Y-%m-%d"), slugify(workflow_name));
        Self {
            root: output_dir.join(dir),
        }
    }

    /// Layout rooted at an explicit run directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the run directory and its subdirectories.
    pub fn create_dirs(&self) -> Result<(), ExecutorError> {
        for dir in [self.root.clone(), self.assets_dir(), self.logs_dir()] {
            std::fs::create_dir_all(&dir).map_err(|source| ExecutorError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join(ASSETS_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn workflow_path(&self) -> PathBuf {
        self.root.join("workflow.json")
    }

    pub fn cost_path(&self) -> PathBuf {
        self.root.join("cost.json")
    }

    pub fn timeline_path(&self) -> PathBuf {
        self.root.join("timeline.json")
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.root.join("transcript.json")
    }

    pub fn mix_path(&self) -> PathBuf {
        self.root.join("mix.json")
    }

    /// Take the exclusive run lock. Fails with `RunLocked` when another
    /// process holds it.
    pub fn lock(&self) -> Result<RunLock, ExecutorError> {
        let path = self.root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| ExecutorError::Io {
                path: path.clone(),
                source,
            })?;
        file.try_lock_exclusive()
            .map_err(|_| ExecutorError::RunLocked {
                path: self.root.clone(),
            })?;
        Ok(RunLock { file })
    }
}

impl AssetPathProvider for RunLayout {
    fn asset_path(&self, scene_id: &str, kind: AssetKind) -> PathBuf {
        let name = match kind {
            AssetKind::Narration => format!("{}-narration.mp3", scene_id),
            AssetKind::Image => format!("{}.png", scene_id),
            AssetKind::Video => format!("{}.mp4", scene_id),
            AssetKind::SoundEffect(n) => format!("{}-sfx-{}.mp3", scene_id, n),
            AssetKind::ReferenceImage => format!("{}reference.png", RESERVED_PREFIX),
            AssetKind::Music => format!("{}music.mp3", RESERVED_PREFIX),
        };
        self.assets_dir().join(name)
    }
}

/// Held for the duration of a run; released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
