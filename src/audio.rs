//! Audio helpers: duration probing and the mixer input manifest.
//!
//! Mixing itself is done by an external transcoder; the engine only
//! produces the [`MixInput`] describing what to mix.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

pub const DEFAULT_MUSIC_VOLUME: f64 = 0.25;
pub const DEFAULT_EFFECT_VOLUME: f64 = 1.0;

/// Measures the length of a local media file.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Duration in seconds, or `None` if it cannot be determined.
    async fn probe(&self, path: &Path) -> Option<f64>;
}

/// Probe backed by `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: PathBuf,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffprobe"),
        }
    }
}

impl FfprobeProbe {
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl DurationProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Option<f64> {
        let output = Command::new(&self.binary)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                parse_ffprobe_duration(&String::from_utf8_lossy(&out.stdout))
            }
            Ok(out) => {
                tracing::warn!(
                    path = %path.display(),
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "ffprobe failed"
                );
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not run ffprobe");
                None
            }
        }
    }
}

/// Parse the bare duration ffprobe prints with `nokey=1`.
pub fn parse_ffprobe_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Probe that never measures anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

#[async_trait]
impl DurationProbe for NoProbe {
    async fn probe(&self, _path: &Path) -> Option<f64> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixMusic {
    /// Local path or URL
    pub source: String,
    pub volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_in: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_out: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixSoundEffect {
    pub path: PathBuf,
    /// Absolute position on the timeline in milliseconds
    pub start_ms: u64,
    pub volume: f64,
}

/// Everything the external mixer needs to produce the final audio track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MixInput {
    /// Narration segments in timeline order, each placed at its scene's
    /// computed start; the gaps are the timing padding
    pub narration_segments: Vec<MixNarration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<MixMusic>,
    pub sound_effects: Vec<MixSoundEffect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixNarration {
    pub path: PathBuf,
    pub start_ms: u64,
}

/// Seconds to whole milliseconds, clamped at zero.
pub fn seconds_to_ms(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ffprobe_duration() {
        assert_eq!(parse_ffprobe_duration("4.205000\n"), Some(4.205));
        assert_eq!(parse_ffprobe_duration("\n  6.8 \n"), Some(6.8));
        assert_eq!(parse_ffprobe_duration("N/A\n"), None);
        assert_eq!(parse_ffprobe_duration(""), None);
        assert_eq!(parse_ffprobe_duration("0.0"), None);
    }

    #[test]
    fn test_seconds_to_ms() {
        assert_eq!(seconds_to_ms(4.7), 4700);
        assert_eq!(seconds_to_ms(5.2001), 5200);
        assert_eq!(seconds_to_ms(-1.0), 0);
    }

    #[tokio::test]
    async fn test_missing_ffprobe_binary_yields_none() {
        let probe = FfprobeProbe::with_binary("/nonexistent/ffprobe-binary");
        assert_eq!(probe.probe(Path::new("/tmp/x.mp3")).await, None);
    }

    #[tokio::test]
    async fn test_no_probe() {
        assert_eq!(NoProbe.probe(Path::new("/tmp/x.mp3")).await, None);
    }
}
