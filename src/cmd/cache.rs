//! Content cache commands (`scenecast cache`).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use scenecast::cache::ContentCache;
use std::path::Path;

use crate::CacheCommands;

pub async fn cmd_cache(project_dir: &Path, command: CacheCommands) -> Result<()> {
    match command {
        CacheCommands::Show { run_dir } => {
            let run_dir = project_dir.join(run_dir);
            let cache = load(&run_dir).await?;

            println!();
            println!("Content cache: {}", cache.path().display());
            println!();
            if cache.is_empty() {
                println!("No cached steps.");
                println!();
                return Ok(());
            }
            for (key, entry) in cache.entries() {
                let when = DateTime::<Utc>::from_timestamp_millis(entry.timestamp)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                let hash: String = entry.hash.chars().take(12).collect();
                let missing = if entry.output_path.exists() {
                    ""
                } else {
                    " (file missing)"
                };
                println!("  {:<28} {}  {}  {}{}", key, hash, when, entry.output_path.display(), missing);
            }
            println!();
            println!("{} cached step(s)", cache.len());
            println!();
        }
        CacheCommands::Clear { run_dir } => {
            let run_dir = project_dir.join(run_dir);
            let mut cache = load(&run_dir).await?;
            let count = cache.len();
            cache
                .clear()
                .await
                .context("Failed to clear content cache")?;
            println!("Cleared {} cache entries in {}", count, run_dir.display());
        }
    }
    Ok(())
}

async fn load(run_dir: &Path) -> Result<ContentCache> {
    if !run_dir.is_dir() {
        anyhow::bail!("Run directory not found: {}", run_dir.display());
    }
    ContentCache::load(run_dir)
        .await
        .with_context(|| format!("Failed to load content cache in {}", run_dir.display()))
}
