//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module      | Commands handled |
//! |-------------|------------------|
//! | `generate`  | `Generate`       |
//! | `timing`    | `Timing`         |
//! | `validate`  | `Validate`       |
//! | `cache`     | `Cache`          |
//! | `config`    | `Config`         |

pub mod cache;
pub mod config;
pub mod generate;
pub mod timing;
pub mod validate;

use anyhow::{Context, Result};
use scenecast::Workflow;
use std::path::Path;

pub use cache::cmd_cache;
pub use config::cmd_config;
pub use generate::{GenerateArgs, cmd_generate};
pub use timing::cmd_timing;
pub use validate::cmd_validate;

/// Read and parse a workflow document.
pub fn load_workflow(path: &Path) -> Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow: {}", path.display()))?;
    Workflow::from_json(&content)
        .with_context(|| format!("Failed to parse workflow: {}", path.display()))
}

/// Pretty-print `value` as JSON into `path`.
pub fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))
}
