//! Project configuration for scenecast.
//!
//! Settings are read from `.scenecast/scenecast.toml` and layered
//! (file → environment → CLI). Every section is optional.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "noir-shorts"
//! output_dir = "output"
//!
//! [dispatch]
//! concurrency = 3
//! max_attempts = 3
//! initial_backoff_ms = 1000
//! max_backoff_ms = 30000
//!
//! [timing]
//! padding = 0.5
//! min_duration = 3.0
//! default_duration = 5.0
//!
//! [models]
//! sound_effects = "fal-ai/elevenlabs/sound-effects"
//! music = "fal-ai/stable-audio"
//!
//! [pricing]
//! "fal-ai/flux/*" = 0.025
//! "fal-ai/kling-video/*" = 0.35
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cost::PricingTable;
use crate::dispatch::{DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DispatchConfig};
use crate::executor::{ExecutorOptions, ModelSettings};
use crate::generation::fal::FAL_KEY_VAR;
use crate::timing::{
    DEFAULT_MIN_DURATION, DEFAULT_PADDING, DEFAULT_SCENE_DURATION, TimingOptions,
};

pub const CONFIG_DIR: &str = ".scenecast";
pub const CONFIG_FILE: &str = "scenecast.toml";
pub const OUTPUT_DIR_VAR: &str = "SCENECAST_OUTPUT_DIR";
pub const CONCURRENCY_VAR: &str = "SCENECAST_CONCURRENCY";

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (optional, defaults to directory name)
    #[serde(default)]
    pub name: Option<String>,
    /// Where run directories are created, relative to the project
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_output_dir() -> String {
    "output".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: None,
            output_dir: default_output_dir(),
        }
    }
}

/// Remote call pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSection {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl DispatchSection {
    pub fn to_dispatch_config(&self) -> DispatchConfig {
        DispatchConfig::default()
            .with_concurrency(self.concurrency)
            .with_max_attempts(self.max_attempts)
            .with_backoff(
                Duration::from_millis(self.initial_backoff_ms),
                Duration::from_millis(self.max_backoff_ms),
            )
    }
}

/// Scene timing settings, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSection {
    /// Silence added after each narration segment
    #[serde(default = "default_padding")]
    pub padding: f64,
    /// Lower bound for narration-driven scenes
    #[serde(default = "default_min_duration")]
    pub min_duration: f64,
    /// Fallback for fixed-mode scenes without a declared duration
    #[serde(default = "default_scene_duration")]
    pub default_duration: f64,
}

fn default_padding() -> f64 {
    DEFAULT_PADDING
}

fn default_min_duration() -> f64 {
    DEFAULT_MIN_DURATION
}

fn default_scene_duration() -> f64 {
    DEFAULT_SCENE_DURATION
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            padding: default_padding(),
            min_duration: default_min_duration(),
            default_duration: default_scene_duration(),
        }
    }
}

impl TimingSection {
    pub fn to_timing_options(&self) -> TimingOptions {
        TimingOptions {
            padding: self.padding,
            min_duration: self.min_duration,
            default_duration: self.default_duration,
        }
    }
}

/// The complete scenecast.toml configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScenecastToml {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub timing: TimingSection,
    /// Models for steps the workflow does not name a model for
    #[serde(default)]
    pub models: ModelSettings,
    /// Price overrides: model id or glob pattern → USD per call
    #[serde(default)]
    pub pricing: BTreeMap<String, f64>,
}

impl ScenecastToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse scenecast.toml")
    }

    /// Load configuration from `<config_dir>/scenecast.toml`.
    /// Returns default configuration if file doesn't exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize scenecast.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn pricing_table(&self) -> PricingTable {
        PricingTable::with_overrides(self.pricing.clone())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.dispatch.concurrency == 0 {
            warnings.push("dispatch.concurrency is 0: at least one request slot is always used".to_string());
        }
        if self.dispatch.max_attempts == 0 {
            warnings.push("dispatch.max_attempts is 0: every call is attempted at least once".to_string());
        }
        if self.dispatch.initial_backoff_ms > self.dispatch.max_backoff_ms {
            warnings.push(format!(
                "dispatch.initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.dispatch.initial_backoff_ms, self.dispatch.max_backoff_ms
            ));
        }

        if self.timing.padding < 0.0 {
            warnings.push(format!(
                "Invalid timing.padding {}: must not be negative",
                self.timing.padding
            ));
        }
        if self.timing.min_duration <= 0.0 {
            warnings.push(format!(
                "Invalid timing.min_duration {}: must be positive",
                self.timing.min_duration
            ));
        }
        if self.timing.default_duration <= 0.0 {
            warnings.push(format!(
                "Invalid timing.default_duration {}: must be positive",
                self.timing.default_duration
            ));
        }

        let models = [
            ("sound_effects", &self.models.sound_effects),
            ("music", &self.models.music),
            ("transcription", &self.models.transcription),
            ("consistency_reference", &self.models.consistency_reference),
            ("consistency_edit", &self.models.consistency_edit),
        ];
        for (key, model) in models {
            if model.trim().is_empty() {
                warnings.push(format!("models.{} is empty", key));
            }
        }

        for (pattern, price) in &self.pricing {
            if *price < 0.0 || !price.is_finite() {
                warnings.push(format!(
                    "Invalid price {} for pattern '{}': must be a non-negative number",
                    price, pattern
                ));
            }
        }

        warnings
    }
}

/// Check if a pattern matches a model id.
/// Supports simple glob patterns:
/// - `*` matches any sequence of characters
/// - `?` matches any single character
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let name: Vec<char> = name.to_lowercase().chars().collect();

    glob_match(&pattern, &name)
}

fn glob_match(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => {
            // Consecutive stars behave like one
            let rest = match rest.iter().position(|c| *c != '*') {
                Some(i) => &rest[i..],
                None => return true,
            };
            (0..=text.len()).any(|i| glob_match(rest, &text[i..]))
        }
        Some(('?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some((c, rest)) => text.first() == Some(c) && glob_match(rest, &text[1..]),
    }
}

/// Unified configuration that combines ScenecastToml with runtime settings.
///
/// Settings are merged from:
/// 1. scenecast.toml file
/// 2. Environment variables (and `.env` in the project directory)
/// 3. CLI arguments
#[derive(Debug, Clone)]
pub struct ScenecastConfig {
    /// Path to the project directory
    pub project_dir: PathBuf,
    /// Path to the .scenecast directory
    pub config_dir: PathBuf,
    /// Parsed scenecast.toml configuration
    pub toml: ScenecastToml,
    /// Generation service credential
    pub fal_key: Option<String>,
    /// Resolved output directory for new runs
    pub output_dir: PathBuf,
    pub verbose: bool,
}

impl ScenecastConfig {
    /// Create a new ScenecastConfig from a project directory.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let config_dir = project_dir.join(CONFIG_DIR);
        let toml = ScenecastToml::load_or_default(&config_dir)?;

        // A missing .env is fine; variables already set take precedence.
        dotenvy::from_path(project_dir.join(".env")).ok();

        let output_dir = project_dir.join(&toml.project.output_dir);
        let mut config = Self {
            project_dir,
            config_dir,
            toml,
            fal_key: None,
            output_dir,
            verbose: false,
        };
        config.apply_env(|var| std::env::var(var).ok());
        Ok(config)
    }

    /// Create ScenecastConfig with CLI overrides.
    pub fn with_cli_args(
        project_dir: PathBuf,
        verbose: bool,
        output_dir: Option<PathBuf>,
        concurrency: Option<usize>,
    ) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        if let Some(dir) = output_dir {
            config.output_dir = config.project_dir.join(dir);
        }
        if let Some(n) = concurrency {
            config.toml.dispatch.concurrency = n;
        }
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(FAL_KEY_VAR).filter(|k| !k.trim().is_empty()) {
            self.fal_key = Some(key);
        }
        if let Some(dir) = lookup(OUTPUT_DIR_VAR).filter(|d| !d.trim().is_empty()) {
            self.output_dir = self.project_dir.join(dir);
        }
        if let Some(raw) = lookup(CONCURRENCY_VAR) {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.toml.dispatch.concurrency = n,
                Err(_) => tracing::warn!(
                    var = CONCURRENCY_VAR,
                    value = %raw,
                    "Ignoring non-numeric concurrency override"
                ),
            }
        }
    }

    /// Get path to the config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        self.toml.dispatch.to_dispatch_config()
    }

    pub fn executor_options(&self, skip_cache: bool) -> ExecutorOptions {
        ExecutorOptions {
            timing: self.toml.timing.to_timing_options(),
            models: self.toml.models.clone(),
            skip_cache,
        }
    }

    pub fn pricing_table(&self) -> PricingTable {
        self.toml.pricing_table()
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // =========================================
    // Pattern matching tests
    // =========================================

    #[test]
    fn test_pattern_matches_exact() {
        assert!(pattern_matches("fal-ai/whisper", "fal-ai/whisper"));
        assert!(!pattern_matches("fal-ai/whisper", "fal-ai/wizper"));
    }

    #[test]
    fn test_pattern_matches_star() {
        assert!(pattern_matches("fal-ai/flux/*", "fal-ai/flux/dev"));
        assert!(pattern_matches("fal-ai/flux/*", "fal-ai/flux/"));
        assert!(pattern_matches("*kling*", "fal-ai/kling-video/v2.1/pro"));
        assert!(pattern_matches("fal-ai/**", "fal-ai/x"));
        assert!(!pattern_matches("fal-ai/flux/*", "fal-ai/recraft/v3"));
    }

    #[test]
    fn test_pattern_matches_question_mark() {
        assert!(pattern_matches("model-v?", "model-v2"));
        assert!(!pattern_matches("model-v?", "model-v10"));
    }

    #[test]
    fn test_pattern_matches_case_insensitive() {
        assert!(pattern_matches("FAL-AI/*", "fal-ai/flux/dev"));
    }

    #[test]
    fn test_pattern_matches_non_ascii() {
        assert!(pattern_matches("modèle-*", "modèle-é"));
        assert!(pattern_matches("?-x", "é-x"));
    }

    // =========================================
    // ScenecastToml tests
    // =========================================

    #[test]
    fn test_parse_empty_uses_defaults() {
        let toml = ScenecastToml::parse("").unwrap();
        assert_eq!(toml.project.output_dir, "output");
        assert_eq!(toml.dispatch.concurrency, 3);
        assert_eq!(toml.dispatch.max_attempts, 3);
        assert_eq!(toml.timing.padding, 0.5);
        assert_eq!(toml.timing.min_duration, 3.0);
        assert_eq!(toml.models, ModelSettings::default());
        assert!(toml.pricing.is_empty());
    }

    #[test]
    fn test_parse_partial_sections() {
        let toml = ScenecastToml::parse(
            r#"
[dispatch]
concurrency = 5

[models]
music = "fal-ai/lyria2"

[pricing]
"fal-ai/flux/*" = 0.025
"#,
        )
        .unwrap();
        assert_eq!(toml.dispatch.concurrency, 5);
        assert_eq!(toml.dispatch.initial_backoff_ms, 1000);
        assert_eq!(toml.models.music, "fal-ai/lyria2");
        assert_eq!(toml.models.transcription, "fal-ai/whisper");
        assert_eq!(toml.pricing.get("fal-ai/flux/*"), Some(&0.025));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let err = ScenecastToml::parse("[dispatch\nconcurrency = ").unwrap_err();
        assert!(err.to_string().contains("scenecast.toml"));
    }

    #[test]
    fn test_to_dispatch_config() {
        let section = DispatchSection {
            concurrency: 2,
            max_attempts: 4,
            initial_backoff_ms: 10,
            max_backoff_ms: 40,
        };
        let config = section.to_dispatch_config();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.initial_backoff, Duration::from_millis(10));
        assert_eq!(config.max_backoff, Duration::from_millis(40));
    }

    #[test]
    fn test_validate_default_is_clean() {
        assert!(ScenecastToml::default().validate().is_empty());
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut toml = ScenecastToml::default();
        toml.dispatch.concurrency = 0;
        toml.dispatch.max_attempts = 0;
        toml.timing.padding = -0.1;
        toml.timing.min_duration = 0.0;
        toml.models.music = " ".to_string();
        toml.pricing.insert("fal-ai/*".to_string(), -1.0);

        let warnings = toml.validate();
        assert_eq!(warnings.len(), 6, "{:?}", warnings);
        assert!(warnings.iter().any(|w| w.contains("concurrency")));
        assert!(warnings.iter().any(|w| w.contains("timing.padding")));
        assert!(warnings.iter().any(|w| w.contains("models.music")));
        assert!(warnings.iter().any(|w| w.contains("fal-ai/*")));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut toml = ScenecastToml::default();
        toml.project.name = Some("noir".to_string());
        toml.pricing.insert("fal-ai/flux/*".to_string(), 0.02);
        toml.save(&path).unwrap();

        let loaded = ScenecastToml::load(&path).unwrap();
        assert_eq!(loaded.project.name.as_deref(), Some("noir"));
        assert_eq!(loaded.pricing.get("fal-ai/flux/*"), Some(&0.02));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let toml = ScenecastToml::load_or_default(dir.path()).unwrap();
        assert_eq!(toml.dispatch.concurrency, 3);
    }

    // =========================================
    // ScenecastConfig tests
    // =========================================

    fn config_in(dir: &Path) -> ScenecastConfig {
        ScenecastConfig {
            project_dir: dir.to_path_buf(),
            config_dir: dir.join(CONFIG_DIR),
            toml: ScenecastToml::default(),
            fal_key: None,
            output_dir: dir.join("output"),
            verbose: false,
        }
    }

    #[test]
    fn test_apply_env_overrides() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.apply_env(|var| match var {
            "FAL_KEY" => Some("key-123".to_string()),
            "SCENECAST_OUTPUT_DIR" => Some("renders".to_string()),
            "SCENECAST_CONCURRENCY" => Some("6".to_string()),
            _ => None,
        });
        assert_eq!(config.fal_key.as_deref(), Some("key-123"));
        assert_eq!(config.output_dir, dir.path().join("renders"));
        assert_eq!(config.dispatch_config().concurrency, 6);
    }

    #[test]
    fn test_apply_env_ignores_blank_and_invalid() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.apply_env(|var| match var {
            "FAL_KEY" => Some("  ".to_string()),
            "SCENECAST_CONCURRENCY" => Some("many".to_string()),
            _ => None,
        });
        assert!(config.fal_key.is_none());
        assert_eq!(config.dispatch_config().concurrency, 3);
    }

    #[test]
    fn test_new_reads_config_file() {
        let dir = tempdir().unwrap();
        let config_dir = dir.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join(CONFIG_FILE),
            "[project]\noutput_dir = \"renders\"\n\n[timing]\npadding = 0.25\n",
        )
        .unwrap();

        let config = ScenecastConfig::with_cli_args(dir.path().to_path_buf(), true, None, Some(1))
            .unwrap();
        assert!(config.verbose);
        assert_eq!(config.executor_options(false).timing.padding, 0.25);
        assert_eq!(config.dispatch_config().concurrency, 1);
        assert!(config.output_dir.ends_with("renders"));
        assert!(config.config_file().ends_with(".scenecast/scenecast.toml"));
    }
}
