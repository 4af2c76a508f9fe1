//! The workflow document model.
//!
//! A workflow describes an ordered list of scenes plus the audio settings
//! shared by all of them. It is deserialized once and never mutated; the
//! engine derives everything else (timings, assets, costs) from it.
//!
//! Every optional field is skipped on serialization when absent so that the
//! serialized form of a generation input only depends on the values the author set.

use serde::{Deserialize, Serialize};

/// How scene start/duration values are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingMode {
    /// Durations follow the measured narration length (default).
    #[default]
    TtsDriven,
    /// Declared start/duration values are used verbatim.
    Fixed,
}

impl std::fmt::Display for TimingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimingMode::TtsDriven => write!(f, "tts_driven"),
            TimingMode::Fixed => write!(f, "fixed"),
        }
    }
}

/// Top-level workflow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    /// Render template identifier (consumed by the renderer, not the engine)
    pub template: String,
    pub duration_target_seconds: f64,
    pub scenes: Vec<Scene>,
    pub audio: AudioConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency: Option<ConsistencyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_mode: Option<TimingMode>,
}

impl Workflow {
    /// Parse a workflow from its JSON representation.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Effective timing mode (`tts_driven` unless the document says otherwise).
    pub fn timing_mode(&self) -> TimingMode {
        self.timing_mode.unwrap_or_default()
    }

    /// Look up a scene by id.
    pub fn scene(&self, id: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == id)
    }

    /// Whether any scene carries narration text.
    pub fn has_narration(&self) -> bool {
        self.scenes.iter().any(|s| s.narration_text().is_some())
    }

    /// Music generation prompt, if the workflow asks for generated music.
    pub fn music_prompt(&self) -> Option<&str> {
        let music = self.audio.music.as_ref()?;
        if music.generate != Some(true) {
            return None;
        }
        music
            .prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Scene visual type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneKind {
    Image,
    Video,
}

/// Declared (legacy) timing of a scene.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneTiming {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// A single logical scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: SceneKind,
    #[serde(default)]
    pub timing: SceneTiming,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
    pub image_generation: ImageGeneration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_generation: Option<VideoGeneration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sound_effects: Vec<SoundEffectSpec>,
}

impl Scene {
    /// Narration text, if present and not blank.
    pub fn narration_text(&self) -> Option<&str> {
        self.narration
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Declared duration from the legacy timing block.
    pub fn legacy_duration(&self) -> Option<f64> {
        self.timing.duration
    }

    /// Declared start from the legacy timing block.
    pub fn legacy_start(&self) -> Option<f64> {
        self.timing.start
    }

    pub fn is_video(&self) -> bool {
        self.kind == SceneKind::Video
    }
}

/// Image generation step of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGeneration {
    pub model: String,
    pub input: ImageInput,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageInput {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_images: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

/// Image-to-video step of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoGeneration {
    pub model: String,
    pub input: VideoInput,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoInput {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// Clip length as the provider expects it (e.g. `"5"` or `"5s"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_inference_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfg_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement_amplitude: Option<String>,
}

/// A sound effect placed inside a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundEffectSpec {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// Offset in seconds from the start of the owning scene
    pub timing_offset: f64,
    /// Length in seconds (1-35)
    pub duration: f64,
    /// Mix volume (0-1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

/// Audio section of the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub tts: TtsConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<MusicConfig>,
}

/// Speech synthesis settings shared by every narrated scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TtsConfig {
    pub model: String,
    /// Reference audio used for voice cloning; when absent the first
    /// synthesized segment becomes the reference for the rest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

/// Background music, either supplied (`file`/`url`) or generated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MusicConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_in: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_out: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Explicit length in seconds (5-150); defaults to the timeline length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Consistency mode: one reference image, every scene image an edit of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    pub reference_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "name": "Test Video",
        "template": "horror",
        "duration_target_seconds": 60,
        "scenes": [
            {
                "id": "scene_1",
                "type": "image",
                "timing": { "start": 0, "duration": 10 },
                "narration": "Test narration",
                "image_generation": {
                    "model": "fal-ai/flux/dev",
                    "input": { "prompt": "A dark room" }
                }
            }
        ],
        "audio": { "tts": { "model": "fal-ai/f5-tts", "speed": 0.9 } }
    }"#;

    #[test]
    fn test_parse_minimal_workflow() {
        let workflow = Workflow::from_json(MINIMAL).unwrap();
        assert_eq!(workflow.name, "Test Video");
        assert_eq!(workflow.scenes.len(), 1);
        assert_eq!(workflow.scenes[0].kind, SceneKind::Image);
        assert_eq!(workflow.scenes[0].legacy_duration(), Some(10.0));
        assert_eq!(workflow.timing_mode(), TimingMode::TtsDriven);
        assert!(workflow.has_narration());
    }

    #[test]
    fn test_null_and_blank_narration_are_absent() {
        let mut workflow = Workflow::from_json(MINIMAL).unwrap();
        workflow.scenes[0].narration = Some("   ".to_string());
        assert!(workflow.scenes[0].narration_text().is_none());
        workflow.scenes[0].narration = None;
        assert!(!workflow.has_narration());
    }

    #[test]
    fn test_timing_mode_parse() {
        let json = MINIMAL.replace(
            r#""template": "horror","#,
            r#""template": "horror", "timing_mode": "fixed","#,
        );
        let workflow = Workflow::from_json(&json).unwrap();
        assert_eq!(workflow.timing_mode(), TimingMode::Fixed);
    }

    #[test]
    fn test_music_prompt_requires_generate_flag() {
        let mut workflow = Workflow::from_json(MINIMAL).unwrap();
        workflow.audio.music = Some(MusicConfig {
            prompt: Some("dark ambient drones".to_string()),
            ..Default::default()
        });
        assert_eq!(workflow.music_prompt(), None);

        if let Some(music) = workflow.audio.music.as_mut() {
            music.generate = Some(true);
        }
        assert_eq!(workflow.music_prompt(), Some("dark ambient drones"));
    }

    #[test]
    fn test_absent_optionals_are_not_serialized() {
        let input = ImageInput {
            prompt: "A dark room".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&input).unwrap();
        assert_eq!(json, r#"{"prompt":"A dark room"}"#);
    }
}
