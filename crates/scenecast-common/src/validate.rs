//! Structural validation of workflow documents.
//!
//! Validation collects every problem it finds instead of stopping at the
//! first one, so that `scenecast validate` can print a complete report.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::workflow::{SceneKind, Workflow};

/// Prefix reserved for run-level asset names; scene ids may not use it.
pub const RESERVED_ID_PREFIX: &str = "_";

/// Scene ids become file names under the assets directory, so they are
/// limited to characters that cannot leave it.
fn id_problem(id: &str) -> Option<String> {
    if let Some(bad) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Some(format!(
            "scene id '{}' contains '{}'; use letters, digits, '-' or '_'",
            id, bad
        ));
    }
    if id.starts_with(RESERVED_ID_PREFIX) {
        return Some(format!(
            "scene id '{}' must not start with '{}'",
            id, RESERVED_ID_PREFIX
        ));
    }
    None
}

/// A single validation problem, addressed by a JSON-path-like location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, Clone, Error)]
#[error("workflow is invalid ({} issue(s)): {}", .issues.len(), summary(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

fn summary(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validate a workflow, returning every issue found.
pub fn validate_workflow(workflow: &Workflow) -> Result<(), ValidationError> {
    let mut issues = Vec::new();

    if workflow.name.trim().is_empty() {
        issues.push(ValidationIssue::new("name", "must not be empty"));
    }
    if !(workflow.duration_target_seconds > 0.0) {
        issues.push(ValidationIssue::new(
            "duration_target_seconds",
            "must be positive",
        ));
    }
    if workflow.scenes.is_empty() {
        issues.push(ValidationIssue::new("scenes", "at least one scene is required"));
    }

    let mut seen = HashSet::new();
    for (i, scene) in workflow.scenes.iter().enumerate() {
        let at = format!("scenes[{}]", i);

        if scene.id.trim().is_empty() {
            issues.push(ValidationIssue::new(format!("{at}.id"), "must not be empty"));
        } else if let Some(problem) = id_problem(&scene.id) {
            issues.push(ValidationIssue::new(format!("{at}.id"), problem));
        } else if !seen.insert(scene.id.as_str()) {
            issues.push(ValidationIssue::new(
                format!("{at}.id"),
                format!("duplicate scene id '{}'", scene.id),
            ));
        }

        if let Some(start) = scene.timing.start
            && start < 0.0
        {
            issues.push(ValidationIssue::new(
                format!("{at}.timing.start"),
                "must not be negative",
            ));
        }
        if let Some(duration) = scene.timing.duration
            && !(duration > 0.0)
        {
            issues.push(ValidationIssue::new(
                format!("{at}.timing.duration"),
                "must be positive",
            ));
        }

        if scene.image_generation.model.trim().is_empty() {
            issues.push(ValidationIssue::new(
                format!("{at}.image_generation.model"),
                "must not be empty",
            ));
        }
        if scene.image_generation.input.prompt.trim().is_empty() {
            issues.push(ValidationIssue::new(
                format!("{at}.image_generation.input.prompt"),
                "must not be empty",
            ));
        }

        match (&scene.kind, &scene.video_generation) {
            (SceneKind::Video, None) => issues.push(ValidationIssue::new(
                format!("{at}.video_generation"),
                "video scenes require a video_generation block",
            )),
            (_, Some(video)) => {
                if video.model.trim().is_empty() {
                    issues.push(ValidationIssue::new(
                        format!("{at}.video_generation.model"),
                        "must not be empty",
                    ));
                }
                if video.input.prompt.trim().is_empty() {
                    issues.push(ValidationIssue::new(
                        format!("{at}.video_generation.input.prompt"),
                        "must not be empty",
                    ));
                }
            }
            _ => {}
        }

        for (j, effect) in scene.sound_effects.iter().enumerate() {
            let at = format!("{at}.sound_effects[{j}]");
            if effect.prompt.trim().is_empty() {
                issues.push(ValidationIssue::new(format!("{at}.prompt"), "must not be empty"));
            }
            if effect.timing_offset < 0.0 {
                issues.push(ValidationIssue::new(
                    format!("{at}.timing_offset"),
                    "must not be negative",
                ));
            }
            if !(1.0..=35.0).contains(&effect.duration) {
                issues.push(ValidationIssue::new(
                    format!("{at}.duration"),
                    "must be between 1 and 35 seconds",
                ));
            }
            if let Some(volume) = effect.volume
                && !(0.0..=1.0).contains(&volume)
            {
                issues.push(ValidationIssue::new(
                    format!("{at}.volume"),
                    "must be between 0 and 1",
                ));
            }
        }
    }

    if workflow.audio.tts.model.trim().is_empty() {
        issues.push(ValidationIssue::new("audio.tts.model", "must not be empty"));
    }

    if let Some(music) = &workflow.audio.music {
        if let Some(volume) = music.volume
            && !(0.0..=1.0).contains(&volume)
        {
            issues.push(ValidationIssue::new(
                "audio.music.volume",
                "must be between 0 and 1",
            ));
        }
        if let Some(duration) = music.duration
            && !(5.0..=150.0).contains(&duration)
        {
            issues.push(ValidationIssue::new(
                "audio.music.duration",
                "must be between 5 and 150 seconds",
            ));
        }
        if music.generate == Some(true)
            && music.prompt.as_deref().map(str::trim).unwrap_or("").is_empty()
        {
            issues.push(ValidationIssue::new(
                "audio.music.prompt",
                "generated music requires a prompt",
            ));
        }
    }

    if let Some(consistency) = &workflow.consistency
        && consistency.reference_prompt.trim().is_empty()
    {
        issues.push(ValidationIssue::new(
            "consistency.reference_prompt",
            "must not be empty",
        ));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { issues })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::*;

    fn scene(id: &str) -> Scene {
        Scene {
            id: id.to_string(),
            description: None,
            kind: SceneKind::Image,
            timing: SceneTiming::default(),
            narration: Some("Once upon a time".to_string()),
            image_generation: ImageGeneration {
                model: "fal-ai/flux/dev".to_string(),
                input: ImageInput {
                    prompt: "A lighthouse at dusk".to_string(),
                    ..Default::default()
                },
            },
            video_generation: None,
            sound_effects: vec![],
        }
    }

    fn workflow(scenes: Vec<Scene>) -> Workflow {
        Workflow {
            name: "Lighthouse".to_string(),
            template: "documentary".to_string(),
            duration_target_seconds: 30.0,
            scenes,
            audio: AudioConfig {
                tts: TtsConfig {
                    model: "fal-ai/f5-tts".to_string(),
                    ..Default::default()
                },
                music: None,
            },
            consistency: None,
            timing_mode: None,
        }
    }

    #[test]
    fn test_valid_workflow_passes() {
        assert!(validate_workflow(&workflow(vec![scene("a"), scene("b")])).is_ok());
    }

    #[test]
    fn test_empty_scenes_rejected() {
        let err = validate_workflow(&workflow(vec![])).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].path, "scenes");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = validate_workflow(&workflow(vec![scene("a"), scene("a")])).unwrap_err();
        assert!(err.issues[0].message.contains("duplicate scene id 'a'"));
        assert_eq!(err.issues[0].path, "scenes[1].id");
    }

    #[test]
    fn test_ids_that_escape_assets_dir_rejected() {
        for id in ["../x", "a/b", "..", "a b", "scene.1"] {
            let err = validate_workflow(&workflow(vec![scene(id)])).unwrap_err();
            assert_eq!(err.issues.len(), 1, "id {:?}", id);
            assert_eq!(err.issues[0].path, "scenes[0].id");
        }
    }

    #[test]
    fn test_reserved_prefix_rejected() {
        let err = validate_workflow(&workflow(vec![scene("_reference")])).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert!(err.issues[0].message.contains("must not start with '_'"));

        // Underscores elsewhere are fine
        assert!(validate_workflow(&workflow(vec![scene("scene_1"), scene("b-2")])).is_ok());
    }

    #[test]
    fn test_video_scene_requires_video_generation() {
        let mut s = scene("a");
        s.kind = SceneKind::Video;
        let err = validate_workflow(&workflow(vec![s])).unwrap_err();
        assert_eq!(err.issues[0].path, "scenes[0].video_generation");
    }

    #[test]
    fn test_sound_effect_ranges() {
        let mut s = scene("a");
        s.sound_effects.push(SoundEffectSpec {
            prompt: "thunder".to_string(),
            negative_prompt: None,
            timing_offset: 0.5,
            duration: 40.0,
            volume: Some(1.5),
        });
        let err = validate_workflow(&workflow(vec![s])).unwrap_err();
        let paths: Vec<_> = err.issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "scenes[0].sound_effects[0].duration",
                "scenes[0].sound_effects[0].volume"
            ]
        );
    }

    #[test]
    fn test_generated_music_requires_prompt() {
        let mut wf = workflow(vec![scene("a")]);
        wf.audio.music = Some(MusicConfig {
            generate: Some(true),
            duration: Some(200.0),
            ..Default::default()
        });
        let err = validate_workflow(&wf).unwrap_err();
        assert_eq!(err.issues.len(), 2);
        assert!(err.to_string().contains("audio.music.prompt"));
    }

    #[test]
    fn test_negative_start_and_zero_duration() {
        let mut s = scene("a");
        s.timing = SceneTiming {
            start: Some(-1.0),
            duration: Some(0.0),
        };
        let err = validate_workflow(&workflow(vec![s])).unwrap_err();
        assert_eq!(err.issues.len(), 2);
    }
}
