use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::PathBuf;

use crate::assets::RunLayout;
use crate::cost::PricingTable;
use crate::dispatch::DispatchConfig;
use crate::errors::ConfigError;
use crate::executor::ExecutorOptions;
use crate::generation::fal::FAL_KEY_VAR;
use crate::scenecast_config::ScenecastConfig;

/// Runtime configuration for one `generate` invocation.
///
/// This struct bridges the layered ScenecastConfig with what a run needs:
/// where its directory lives, how remote calls are pooled, and which
/// credential to use.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Explicit run directory for incremental re-runs
    pub run_dir: Option<PathBuf>,
    pub fal_key: Option<String>,
    pub dispatch: DispatchConfig,
    pub executor: ExecutorOptions,
    pub pricing: PricingTable,
    pub verbose: bool,
    /// Problems found in scenecast.toml, reported once logging is up
    pub warnings: Vec<String>,
}

impl Config {
    pub fn new(
        project_dir: PathBuf,
        verbose: bool,
        output_dir: Option<PathBuf>,
        concurrency: Option<usize>,
        skip_cache: bool,
    ) -> Result<Self> {
        let layered = ScenecastConfig::with_cli_args(project_dir, verbose, output_dir, concurrency)
            .context("Failed to load scenecast configuration")?;
        Ok(Self::from_layered(&layered, skip_cache))
    }

    pub fn from_layered(layered: &ScenecastConfig, skip_cache: bool) -> Self {
        Self {
            project_dir: layered.project_dir.clone(),
            output_dir: layered.output_dir.clone(),
            run_dir: None,
            fal_key: layered.fal_key.clone(),
            dispatch: layered.dispatch_config(),
            executor: layered.executor_options(skip_cache),
            pricing: layered.pricing_table(),
            verbose: layered.verbose,
            warnings: layered.validate(),
        }
    }

    pub fn with_run_dir(mut self, run_dir: Option<PathBuf>) -> Self {
        self.run_dir = run_dir;
        self
    }

    /// The credential, or an error naming the variable to set.
    pub fn require_fal_key(&self) -> Result<&str, ConfigError> {
        self.fal_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingCredentials { var: FAL_KEY_VAR })
    }

    /// Layout of the run directory for `workflow_name` started on `date`.
    /// An explicit run directory wins over the dated default.
    pub fn run_layout(&self, workflow_name: &str, date: NaiveDate) -> RunLayout {
        match &self.run_dir {
            Some(dir) => RunLayout::at(self.project_dir.join(dir)),
            None => RunLayout::for_workflow(&self.output_dir, workflow_name, date),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenecast_config::{CONFIG_DIR, ScenecastToml};
    use std::path::Path;
    use tempfile::tempdir;

    fn layered(dir: &Path) -> ScenecastConfig {
        ScenecastConfig {
            project_dir: dir.to_path_buf(),
            config_dir: dir.join(CONFIG_DIR),
            toml: ScenecastToml::default(),
            fal_key: None,
            output_dir: dir.join("output"),
            verbose: false,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    #[test]
    fn test_require_fal_key() {
        let dir = tempdir().unwrap();
        let mut config = Config::from_layered(&layered(dir.path()), false);
        let err = config.require_fal_key().unwrap_err();
        assert!(err.to_string().contains("FAL_KEY"));

        config.fal_key = Some("secret".to_string());
        assert_eq!(config.require_fal_key().unwrap(), "secret");
    }

    #[test]
    fn test_run_layout_defaults_to_dated_dir() {
        let dir = tempdir().unwrap();
        let config = Config::from_layered(&layered(dir.path()), false);
        let layout = config.run_layout("Noir Detective", date());
        assert_eq!(
            layout.root(),
            dir.path().join("output/2026-03-14-noir-detective")
        );
    }

    #[test]
    fn test_run_layout_explicit_run_dir() {
        let dir = tempdir().unwrap();
        let config = Config::from_layered(&layered(dir.path()), true)
            .with_run_dir(Some(PathBuf::from("runs/previous")));
        assert!(config.executor.skip_cache);
        let layout = config.run_layout("ignored", date());
        assert_eq!(layout.root(), dir.path().join("runs/previous"));
    }
}
