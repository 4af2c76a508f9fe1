//! Remote generation service boundary.
//!
//! Every kind of generation step is a variant of [`StepRequest`] with a
//! typed input struct, so request payloads are built from explicit optional
//! fields rather than assembled key by key. The executor only talks to the
//! [`GenerationService`] trait; `fal::FalClient` is the HTTP implementation.

pub mod fal;

use std::path::Path;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use scenecast_common::{ImageInput, TtsConfig, VideoInput};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cost::CostCategory;
use crate::errors::ServiceError;

pub use fal::FalClient;

/// Speech synthesis input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechInput {
    pub gen_text: String,
    /// Voice-cloning reference audio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_audio_url: Option<String>,
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

impl SpeechInput {
    /// Build the input for `text` from the workflow's TTS settings.
    pub fn from_config(text: &str, tts: &TtsConfig) -> Self {
        Self {
            gen_text: text.to_string(),
            ref_audio_url: tts.voice_reference.clone(),
            voice_prompt: tts.voice_prompt.clone(),
            language: tts.language.clone(),
            speed: tts.speed,
            temperature: tts.temperature,
            top_k: tts.top_k,
            top_p: tts.top_p,
        }
    }

    pub fn with_voice_reference(mut self, reference: Option<String>) -> Self {
        if reference.is_some() {
            self.ref_audio_url = reference;
        }
        self
    }
}

/// Image-to-image edit input (consistency mode).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageEditInput {
    pub prompt: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

/// Image-to-video input: the scene's video spec plus its source image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoRequestInput {
    pub image_url: String,
    #[serde(flatten)]
    pub spec: VideoInput,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoundEffectInput {
    pub text: String,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MusicInput {
    pub prompt: String,
    pub seconds_total: f64,
}

/// One remote generation step: a model id plus its typed input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepRequest {
    Speech { model: String, input: SpeechInput },
    Image { model: String, input: ImageInput },
    ImageEdit { model: String, input: ImageEditInput },
    Video { model: String, input: VideoRequestInput },
    SoundEffect { model: String, input: SoundEffectInput },
    Music { model: String, input: MusicInput },
}

impl StepRequest {
    pub fn model(&self) -> &str {
        match self {
            StepRequest::Speech { model, .. }
            | StepRequest::Image { model, .. }
            | StepRequest::ImageEdit { model, .. }
            | StepRequest::Video { model, .. }
            | StepRequest::SoundEffect { model, .. }
            | StepRequest::Music { model, .. } => model,
        }
    }

    pub fn category(&self) -> CostCategory {
        match self {
            StepRequest::Speech { .. } => CostCategory::Speech,
            StepRequest::Image { .. } => CostCategory::Image,
            StepRequest::ImageEdit { .. } => CostCategory::ImageEdit,
            StepRequest::Video { .. } => CostCategory::Video,
            StepRequest::SoundEffect { .. } => CostCategory::SoundEffect,
            StepRequest::Music { .. } => CostCategory::Music,
        }
    }

    /// The JSON body sent to the model endpoint.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            StepRequest::Speech { input, .. } => serde_json::to_value(input),
            StepRequest::Image { input, .. } => serde_json::to_value(input),
            StepRequest::ImageEdit { input, .. } => serde_json::to_value(input),
            StepRequest::Video { input, .. } => serde_json::to_value(input),
            StepRequest::SoundEffect { input, .. } => serde_json::to_value(input),
            StepRequest::Music { input, .. } => serde_json::to_value(input),
        }
    }
}

/// What a generation call produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub url: String,
    /// Duration in seconds, for audio/video outputs when the service reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionRequest {
    pub model: String,
    pub audio_url: String,
}

/// One timed phrase of a transcript, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptChunk {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub chunks: Vec<TranscriptChunk>,
}

/// Abstraction over the remote generation provider for testability.
/// Real implementation: `FalClient`. Test doubles live in the executor tests.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Run one generation step. A response without a usable output
    /// reference is an error.
    async fn generate(&self, request: &StepRequest) -> Result<GenerationOutput, ServiceError>;

    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcript, ServiceError>;

    /// Fetch a generated output to `dest`, creating parent directories.
    async fn download(&self, url: &str, dest: &Path) -> Result<(), ServiceError>;

    /// Turn a local file into a reference the service accepts as input.
    async fn upload(&self, path: &Path) -> Result<String, ServiceError>;
}

/// Encode a local file as a `data:` URI with its guessed MIME type.
pub async fn data_uri(path: &Path) -> Result<String, ServiceError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| ServiceError::Upload {
            path: path.to_path_buf(),
            source,
        })?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Ok(format!("data:{};base64,{}", mime.essence_str(), STANDARD.encode(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_speech_input_from_config() {
        let tts = TtsConfig {
            model: "fal-ai/f5-tts".to_string(),
            speed: Some(0.9),
            ..Default::default()
        };
        let input = SpeechInput::from_config("Hello there", &tts)
            .with_voice_reference(Some("https://cdn/first.mp3".to_string()));
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["gen_text"], "Hello there");
        assert_eq!(json["ref_audio_url"], "https://cdn/first.mp3");
        assert_eq!(json["speed"], 0.9);
        assert!(json.get("language").is_none());
    }

    #[test]
    fn test_declared_voice_reference_kept_when_none_given() {
        let tts = TtsConfig {
            model: "fal-ai/f5-tts".to_string(),
            voice_reference: Some("https://cdn/voice.wav".to_string()),
            ..Default::default()
        };
        let input = SpeechInput::from_config("x", &tts).with_voice_reference(None);
        assert_eq!(input.ref_audio_url.as_deref(), Some("https://cdn/voice.wav"));
    }

    #[test]
    fn test_video_payload_flattens_spec() {
        let request = StepRequest::Video {
            model: "fal-ai/kling-video/v2.1/standard/image-to-video".to_string(),
            input: VideoRequestInput {
                image_url: "https://cdn/scene_1.png".to_string(),
                spec: VideoInput {
                    prompt: "slow push in".to_string(),
                    duration: Some("5".to_string()),
                    ..Default::default()
                },
            },
        };
        let payload = request.payload().unwrap();
        assert_eq!(payload["image_url"], "https://cdn/scene_1.png");
        assert_eq!(payload["prompt"], "slow push in");
        assert_eq!(payload["duration"], "5");
        assert_eq!(request.category(), CostCategory::Video);
        assert_eq!(request.model(), "fal-ai/kling-video/v2.1/standard/image-to-video");
    }

    #[test]
    fn test_step_request_is_tagged() {
        let request = StepRequest::Music {
            model: "fal-ai/stable-audio".to_string(),
            input: MusicInput {
                prompt: "ambient".to_string(),
                seconds_total: 30.0,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["kind"], "music");
        assert_eq!(json["input"]["seconds_total"], 30.0);
    }

    #[tokio::test]
    async fn test_data_uri_uses_mime_type() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("voice.mp3");
        std::fs::write(&path, b"abc").unwrap();
        let uri = data_uri(&path).await.unwrap();
        assert_eq!(uri, "data:audio/mpeg;base64,YWJj");
    }

    #[tokio::test]
    async fn test_data_uri_missing_file() {
        let err = data_uri(Path::new("/definitely/not/here.png")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Upload { .. }));
    }
}
