//! fal.ai HTTP client.
//!
//! Models are invoked synchronously through `https://fal.run/<model-id>`
//! with the API key in an `Authorization: Key …` header. Responses differ
//! per model family, so output references are looked up in the handful of
//! shapes fal.ai uses (`images[0]`, `image`, `video`, `audio`, `audio_url`,
//! `audio_file`).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    GenerationOutput, GenerationService, StepRequest, Transcript, TranscriptChunk,
    TranscriptionRequest, data_uri,
};
use crate::errors::{ConfigError, ServiceError};

pub const FAL_KEY_VAR: &str = "FAL_KEY";
pub const DEFAULT_BASE_URL: &str = "https://fal.run";

/// Generous ceiling: video models can take several minutes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Fields that may hold the output object, in lookup order.
const OUTPUT_FIELDS: &[&str] = &["image", "video", "audio", "audio_url", "audio_file"];

#[derive(Debug, Clone)]
pub struct FalClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FalClient {
    /// Create a client. An empty key is rejected up front so that no request
    /// is ever sent without credentials.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ConfigError> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(ConfigError::MissingCredentials { var: FAL_KEY_VAR });
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "http".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Create a client from `FAL_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let key = std::env::var(FAL_KEY_VAR)
            .map_err(|_| ConfigError::MissingCredentials { var: FAL_KEY_VAR })?;
        Self::new(key)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call(&self, model: &str, payload: &Value) -> Result<Value, ServiceError> {
        let url = format!("{}/{}", self.base_url, model);
        tracing::debug!(endpoint = model, "Calling fal.ai");

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Key {}", self.api_key))
            .json(payload)
            .send()
            .await
            .map_err(|source| ServiceError::Transport {
                endpoint: model.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                endpoint: model.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<Value>().await.map_err(|e| ServiceError::Decode {
            endpoint: model.to_string(),
            message: e.to_string(),
        })
    }
}

/// Find the output reference (and duration, if reported) in a response.
pub fn extract_output(endpoint: &str, body: &Value) -> Result<GenerationOutput, ServiceError> {
    let candidate = body
        .get("images")
        .and_then(|images| images.get(0))
        .into_iter()
        .chain(OUTPUT_FIELDS.iter().filter_map(|f| body.get(*f)))
        .find_map(|node| {
            // Some endpoints return the URL directly instead of a file object.
            let url = node
                .as_str()
                .or_else(|| node.get("url").and_then(Value::as_str))?;
            Some((url, node))
        });

    let Some((url, node)) = candidate else {
        return Err(ServiceError::MissingOutput {
            endpoint: endpoint.to_string(),
        });
    };
    if url.trim().is_empty() {
        return Err(ServiceError::MissingOutput {
            endpoint: endpoint.to_string(),
        });
    }

    let duration = node
        .get("duration")
        .and_then(Value::as_f64)
        .or_else(|| body.get("duration").and_then(Value::as_f64))
        .filter(|d| *d > 0.0);

    Ok(GenerationOutput {
        url: url.to_string(),
        duration,
    })
}

/// Parse a whisper-style response (`{text, chunks: [{timestamp: [s, e], text}]}`).
pub fn parse_transcript(endpoint: &str, body: &Value) -> Result<Transcript, ServiceError> {
    let text = body
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::Decode {
            endpoint: endpoint.to_string(),
            message: "missing 'text' field".to_string(),
        })?
        .to_string();

    let mut chunks = Vec::new();
    for chunk in body
        .get("chunks")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
    {
        let Some(start) = chunk.pointer("/timestamp/0").and_then(Value::as_f64) else {
            continue;
        };
        // Whisper leaves the end of the final chunk open.
        let end = chunk
            .pointer("/timestamp/1")
            .and_then(Value::as_f64)
            .unwrap_or(start);
        let text = chunk
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        chunks.push(TranscriptChunk { start, end, text });
    }

    Ok(Transcript { text, chunks })
}

#[async_trait]
impl GenerationService for FalClient {
    async fn generate(&self, request: &StepRequest) -> Result<GenerationOutput, ServiceError> {
        let endpoint = request.model();
        let payload = request.payload().map_err(|e| ServiceError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;
        let body = self.call(endpoint, &payload).await?;
        extract_output(endpoint, &body)
    }

    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcript, ServiceError> {
        let payload = serde_json::json!({
            "audio_url": request.audio_url,
            "task": "transcribe",
            "chunk_level": "word",
        });
        let body = self.call(&request.model, &payload).await?;
        parse_transcript(&request.model, &body)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), ServiceError> {
        let download_err = |message: String| ServiceError::Download {
            url: url.to_string(),
            path: dest.to_path_buf(),
            message,
        };

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(download_err(format!("HTTP {}", resp.status())));
        }
        let bytes = resp.bytes().await.map_err(|e| download_err(e.to_string()))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| download_err(e.to_string()))?;
        }
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| download_err(e.to_string()))?;
        tracing::debug!(url, path = %dest.display(), bytes = bytes.len(), "Downloaded output");
        Ok(())
    }

    async fn upload(&self, path: &Path) -> Result<String, ServiceError> {
        data_uri(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_key_rejected() {
        let err = FalClient::new("   ").unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredentials { var: "FAL_KEY" }));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = FalClient::new("key").unwrap().with_base_url("http://localhost:9000/");
        assert_eq!(client.base_url, "http://localhost:9000");
    }

    #[test]
    fn test_extract_image_list() {
        let body = json!({"images": [{"url": "https://cdn/a.png", "width": 1024}], "seed": 3});
        let out = extract_output("fal-ai/flux/dev", &body).unwrap();
        assert_eq!(out.url, "https://cdn/a.png");
        assert_eq!(out.duration, None);
    }

    #[test]
    fn test_extract_audio_with_duration() {
        let body = json!({"audio_url": {"url": "https://cdn/n.mp3", "duration": 4.2}});
        let out = extract_output("fal-ai/f5-tts", &body).unwrap();
        assert_eq!(out.url, "https://cdn/n.mp3");
        assert_eq!(out.duration, Some(4.2));
    }

    #[test]
    fn test_extract_video_object() {
        let body = json!({"video": {"url": "https://cdn/v.mp4"}});
        let out = extract_output("fal-ai/kling-video", &body).unwrap();
        assert_eq!(out.url, "https://cdn/v.mp4");
    }

    #[test]
    fn test_extract_plain_string_field() {
        let body = json!({"audio": "https://cdn/sfx.mp3", "duration": 2.0});
        let out = extract_output("fal-ai/elevenlabs/sound-effects", &body).unwrap();
        assert_eq!(out.url, "https://cdn/sfx.mp3");
        assert_eq!(out.duration, Some(2.0));
    }

    #[test]
    fn test_missing_output_is_error() {
        let err = extract_output("fal-ai/flux/dev", &json!({"images": []})).unwrap_err();
        assert!(matches!(err, ServiceError::MissingOutput { .. }));

        let err = extract_output("fal-ai/flux/dev", &json!({"image": {"url": ""}})).unwrap_err();
        assert!(matches!(err, ServiceError::MissingOutput { .. }));
    }

    #[test]
    fn test_parse_whisper_chunks() {
        let body = json!({
            "text": "Hello dark world",
            "chunks": [
                {"timestamp": [0.0, 0.4], "text": " Hello"},
                {"timestamp": [0.4, 0.9], "text": " dark"},
                {"timestamp": [0.9, null], "text": " world"}
            ]
        });
        let transcript = parse_transcript("fal-ai/whisper", &body).unwrap();
        assert_eq!(transcript.text, "Hello dark world");
        assert_eq!(transcript.chunks.len(), 3);
        assert_eq!(transcript.chunks[1].start, 0.4);
        assert_eq!(transcript.chunks[2].end, 0.9);
    }

    #[test]
    fn test_parse_transcript_requires_text() {
        let err = parse_transcript("fal-ai/whisper", &json!({"chunks": []})).unwrap_err();
        assert!(matches!(err, ServiceError::Decode { .. }));
    }
}
