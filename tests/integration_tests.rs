//! Integration tests for the scenecast CLI
//!
//! None of these reach the network: they cover every command that works
//! offline and the failure paths of `generate` that stop before the first
//! remote call.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a scenecast Command
fn scenecast() -> Command {
    cargo_bin_cmd!("scenecast")
}

/// Helper to create a temporary project directory
fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

const VALID_WORKFLOW: &str = r#"{
  "name": "Night Shift",
  "template": "noir",
  "duration_target_seconds": 20,
  "timing_mode": "fixed",
  "scenes": [
    {
      "id": "opening",
      "type": "image",
      "timing": { "start": 0, "duration": 6 },
      "narration": "The city never sleeps.",
      "image_generation": {
        "model": "fal-ai/flux/dev",
        "input": { "prompt": "rain-soaked street at night" }
      }
    },
    {
      "id": "alley",
      "type": "video",
      "image_generation": {
        "model": "fal-ai/flux/dev",
        "input": { "prompt": "a narrow alley" }
      },
      "video_generation": {
        "model": "fal-ai/kling-video/v2.1/standard/image-to-video",
        "input": { "prompt": "slow push in" }
      }
    }
  ],
  "audio": { "tts": { "model": "fal-ai/f5-tts" } }
}"#;

const INVALID_WORKFLOW: &str = r#"{
  "name": "Broken",
  "template": "noir",
  "duration_target_seconds": 10,
  "scenes": [
    {
      "id": "a",
      "type": "image",
      "image_generation": { "model": "fal-ai/flux/dev", "input": { "prompt": "x" } }
    },
    {
      "id": "a",
      "type": "video",
      "image_generation": { "model": "", "input": { "prompt": "y" } }
    }
  ],
  "audio": { "tts": { "model": "fal-ai/f5-tts" } }
}"#;

fn write_workflow(dir: &TempDir, name: &str, content: &str) {
    fs::write(dir.path().join(name), content).unwrap();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_scenecast_help() {
        scenecast()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("generate"))
            .stdout(predicate::str::contains("timing"));
    }

    #[test]
    fn test_scenecast_version() {
        scenecast()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_unknown_command_fails() {
        scenecast().arg("render").assert().failure();
    }
}

// =============================================================================
// Workflow Tests
// =============================================================================

mod workflow_commands {
    use super::*;

    #[test]
    fn test_validate_accepts_valid_workflow() {
        let dir = create_temp_project();
        write_workflow(&dir, "workflow.json", VALID_WORKFLOW);

        scenecast()
            .current_dir(dir.path())
            .args(["validate", "workflow.json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("is valid"))
            .stdout(predicate::str::contains("2 scene(s), 1 narrated"));
    }

    #[test]
    fn test_validate_lists_every_issue() {
        let dir = create_temp_project();
        write_workflow(&dir, "broken.json", INVALID_WORKFLOW);

        scenecast()
            .current_dir(dir.path())
            .args(["validate", "broken.json"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("duplicate scene id 'a'"))
            .stdout(predicate::str::contains("scenes[1].image_generation.model"))
            .stdout(predicate::str::contains("scenes[1].video_generation"))
            .stderr(predicate::str::contains("validation issue(s) found"));
    }

    #[test]
    fn test_validate_rejects_malformed_json() {
        let dir = create_temp_project();
        write_workflow(&dir, "bad.json", "{ not json");

        scenecast()
            .current_dir(dir.path())
            .args(["validate", "bad.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse workflow"));
    }

    #[test]
    fn test_validate_missing_file() {
        let dir = create_temp_project();

        scenecast()
            .current_dir(dir.path())
            .args(["validate", "nowhere.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to read workflow"));
    }

    #[test]
    fn test_timing_prints_declared_timeline() {
        let dir = create_temp_project();
        write_workflow(&dir, "workflow.json", VALID_WORKFLOW);

        scenecast()
            .current_dir(dir.path())
            .args(["timing", "workflow.json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("fixed mode"))
            .stdout(predicate::str::contains("opening"))
            .stdout(predicate::str::contains("alley"))
            .stdout(predicate::str::contains("Total: 11.00s"));
    }

    #[test]
    fn test_timing_uses_configured_default_duration() {
        let dir = create_temp_project();
        write_workflow(&dir, "workflow.json", VALID_WORKFLOW);
        fs::create_dir_all(dir.path().join(".scenecast")).unwrap();
        fs::write(
            dir.path().join(".scenecast/scenecast.toml"),
            "[timing]\ndefault_duration = 9.0\n",
        )
        .unwrap();

        scenecast()
            .current_dir(dir.path())
            .args(["timing", "workflow.json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Total: 15.00s"));
    }
}

// =============================================================================
// Generate Tests
// =============================================================================

mod generate {
    use super::*;

    #[test]
    fn test_generate_requires_fal_key() {
        let dir = create_temp_project();
        write_workflow(&dir, "workflow.json", VALID_WORKFLOW);

        scenecast()
            .current_dir(dir.path())
            .env_remove("FAL_KEY")
            .args(["generate", "workflow.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("FAL_KEY"));
    }

    #[test]
    fn test_generate_rejects_invalid_workflow_before_creating_run_dir() {
        let dir = create_temp_project();
        write_workflow(&dir, "broken.json", INVALID_WORKFLOW);

        scenecast()
            .current_dir(dir.path())
            .env("FAL_KEY", "test-key")
            .args(["generate", "broken.json", "--output-dir", "out"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Workflow failed validation"));

        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_generate_rejects_scene_id_outside_assets_dir() {
        let dir = create_temp_project();
        let escaping = VALID_WORKFLOW.replace(r#""id": "opening""#, r#""id": "../escape""#);
        write_workflow(&dir, "workflow.json", &escaping);

        scenecast()
            .current_dir(dir.path())
            .env("FAL_KEY", "test-key")
            .args(["generate", "workflow.json", "--output-dir", "out"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Workflow failed validation"));

        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_generate_snapshots_workflow_into_run_dir() {
        let dir = create_temp_project();
        write_workflow(&dir, "workflow.json", VALID_WORKFLOW);

        // Fails at the credential check, after the run directory is prepared
        scenecast()
            .current_dir(dir.path())
            .env_remove("FAL_KEY")
            .args(["generate", "workflow.json", "--run-dir", "run"])
            .assert()
            .failure();

        let run = dir.path().join("run");
        assert!(run.join("workflow.json").exists());
        assert!(run.join("assets").is_dir());
        assert!(run.join("logs").is_dir());
    }
}

// =============================================================================
// Cache Tests
// =============================================================================

mod cache {
    use super::*;

    fn run_dir_with_cache(dir: &TempDir) {
        let run = dir.path().join("run");
        fs::create_dir_all(run.join("assets")).unwrap();
        fs::write(run.join("assets/opening.png"), b"png").unwrap();
        let cache = serde_json::json!({
            "version": 1,
            "entries": {
                "image:opening": {
                    "hash": "0123456789abcdef0123",
                    "outputPath": run.join("assets/opening.png"),
                    "timestamp": 1760000000000i64
                },
                "narration:opening": {
                    "hash": "fedcba9876543210fedc",
                    "outputPath": run.join("assets/opening-narration.mp3"),
                    "timestamp": 1760000000000i64
                }
            }
        });
        fs::write(run.join(".cache.json"), cache.to_string()).unwrap();
    }

    #[test]
    fn test_cache_show_empty_run() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join("run")).unwrap();

        scenecast()
            .current_dir(dir.path())
            .args(["cache", "show", "--run-dir", "run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached steps."));
    }

    #[test]
    fn test_cache_show_lists_entries() {
        let dir = create_temp_project();
        run_dir_with_cache(&dir);

        scenecast()
            .current_dir(dir.path())
            .args(["cache", "show", "--run-dir", "run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("image:opening"))
            .stdout(predicate::str::contains("0123456789ab"))
            .stdout(predicate::str::contains("(file missing)"))
            .stdout(predicate::str::contains("2 cached step(s)"));
    }

    #[test]
    fn test_cache_clear_keeps_files() {
        let dir = create_temp_project();
        run_dir_with_cache(&dir);

        scenecast()
            .current_dir(dir.path())
            .args(["cache", "clear", "--run-dir", "run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cleared 2 cache entries"));

        let content = fs::read_to_string(dir.path().join("run/.cache.json")).unwrap();
        let cache: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(cache["version"], 1);
        assert!(cache["entries"].as_object().unwrap().is_empty());
        assert!(dir.path().join("run/assets/opening.png").exists());
    }

    #[test]
    fn test_cache_rejects_unknown_version() {
        let dir = create_temp_project();
        let run = dir.path().join("run");
        fs::create_dir_all(&run).unwrap();
        fs::write(run.join(".cache.json"), r#"{"version": 7, "entries": {}}"#).unwrap();

        scenecast()
            .current_dir(dir.path())
            .args(["cache", "show", "--run-dir", "run"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("unsupported version 7"));
    }

    #[test]
    fn test_cache_missing_run_dir() {
        let dir = create_temp_project();

        scenecast()
            .current_dir(dir.path())
            .args(["cache", "show", "--run-dir", "nope"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Run directory not found"));
    }
}

// =============================================================================
// Config Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_init_creates_file() {
        let dir = create_temp_project();

        scenecast()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created scenecast.toml"));

        let path = dir.path().join(".scenecast/scenecast.toml");
        assert!(path.exists());
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("[dispatch]"));
        assert!(content.contains("[timing]"));
    }

    #[test]
    fn test_config_init_does_not_overwrite() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".scenecast")).unwrap();
        fs::write(
            dir.path().join(".scenecast/scenecast.toml"),
            "[dispatch]\nconcurrency = 7\n",
        )
        .unwrap();

        scenecast()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        let content = fs::read_to_string(dir.path().join(".scenecast/scenecast.toml")).unwrap();
        assert!(content.contains("concurrency = 7"));
    }

    #[test]
    fn test_config_validate_defaults() {
        let dir = create_temp_project();

        scenecast()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Using defaults (valid)"));
    }

    #[test]
    fn test_config_validate_after_init() {
        let dir = create_temp_project();
        scenecast()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success();

        scenecast()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".scenecast")).unwrap();
        fs::write(
            dir.path().join(".scenecast/scenecast.toml"),
            "[dispatch]\nconcurrency = 0\n",
        )
        .unwrap();

        scenecast()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("dispatch.concurrency is 0"));
    }

    #[test]
    fn test_config_show_with_env_override() {
        let dir = create_temp_project();
        scenecast()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success();

        scenecast()
            .current_dir(dir.path())
            .env("SCENECAST_CONCURRENCY", "5")
            .env_remove("FAL_KEY")
            .arg("config")
            .assert()
            .success()
            .stdout(predicate::str::contains("concurrency = 5"))
            .stdout(predicate::str::contains("FAL_KEY = not set"));
    }

    #[test]
    fn test_config_show_without_file() {
        let dir = create_temp_project();

        scenecast()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No scenecast.toml found"))
            .stdout(predicate::str::contains("[dispatch]"));
    }
}
