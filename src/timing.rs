//! Scene timeline derivation.
//!
//! [`compute_timing`] is a pure function of the workflow and the measured
//! narration segments. It never performs I/O; the executor measures the
//! narration first and hands the durations in.

use std::fmt;
use std::path::PathBuf;

use scenecast_common::{TimingMode, Workflow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PADDING: f64 = 0.5;
pub const DEFAULT_MIN_DURATION: f64 = 3.0;
pub const DEFAULT_SCENE_DURATION: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingOptions {
    /// Silence appended after each narration segment (seconds)
    pub padding: f64,
    /// Floor for any tts-derived or defaulted scene duration (seconds)
    pub min_duration: f64,
    /// Duration for `fixed` scenes that declare none (seconds)
    pub default_duration: f64,
}

impl Default for TimingOptions {
    fn default() -> Self {
        Self {
            padding: DEFAULT_PADDING,
            min_duration: DEFAULT_MIN_DURATION,
            default_duration: DEFAULT_SCENE_DURATION,
        }
    }
}

/// Synthesized narration for one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationSegment {
    pub scene_id: String,
    pub text: String,
    pub audio_path: PathBuf,
    /// Remote reference, when the audio came from the service in this run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// Measured length in seconds; `None` when it could not be measured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Where a computed duration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingSource {
    Tts,
    Workflow,
    Default,
}

impl fmt::Display for TimingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingSource::Tts => write!(f, "tts"),
            TimingSource::Workflow => write!(f, "workflow"),
            TimingSource::Default => write!(f, "default"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedSceneTiming {
    pub scene_id: String,
    pub start: f64,
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_duration: Option<f64>,
    pub source: TimingSource,
}

impl ComputedSceneTiming {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// The computed timeline of a workflow, in scene order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneTimeline {
    pub mode: TimingMode,
    pub scenes: Vec<ComputedSceneTiming>,
}

impl SceneTimeline {
    pub fn get(&self, scene_id: &str) -> Option<&ComputedSceneTiming> {
        self.scenes.iter().find(|t| t.scene_id == scene_id)
    }

    pub fn start_of(&self, scene_id: &str) -> Option<f64> {
        self.get(scene_id).map(|t| t.start)
    }

    /// End of the latest scene. With `tts_driven` timing this is the sum of
    /// all scene durations.
    pub fn total_duration(&self) -> f64 {
        self.scenes.iter().map(ComputedSceneTiming::end).fold(0.0, f64::max)
    }

    /// Sum of all scene durations. Differs from `total_duration` only when
    /// fixed timing leaves gaps or overlaps between scenes.
    pub fn summed_duration(&self) -> f64 {
        self.scenes.iter().map(|t| t.duration).sum()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

fn measured(segment: &NarrationSegment) -> Option<f64> {
    segment.duration.filter(|d| d.is_finite() && *d > 0.0)
}

/// Derive the scene timeline from the workflow and measured narration.
pub fn compute_timing(
    workflow: &Workflow,
    segments: &[NarrationSegment],
    options: &TimingOptions,
) -> SceneTimeline {
    let mode = workflow.timing_mode();
    let tts_for = |scene_id: &str| {
        segments
            .iter()
            .find(|s| s.scene_id == scene_id)
            .and_then(measured)
    };

    let mut scenes = Vec::with_capacity(workflow.scenes.len());
    let mut cursor = 0.0;

    for scene in &workflow.scenes {
        let tts_duration = tts_for(&scene.id);

        let timing = match mode {
            TimingMode::TtsDriven => {
                let (duration, source) = match (tts_duration, scene.legacy_duration()) {
                    (Some(d), _) => ((d + options.padding).max(options.min_duration), TimingSource::Tts),
                    (None, Some(declared)) => (declared, TimingSource::Workflow),
                    (None, None) => (options.min_duration, TimingSource::Default),
                };
                ComputedSceneTiming {
                    scene_id: scene.id.clone(),
                    start: cursor,
                    duration,
                    tts_duration,
                    source,
                }
            }
            TimingMode::Fixed => {
                let (duration, source) = match scene.legacy_duration() {
                    Some(declared) => (declared, TimingSource::Workflow),
                    None => (options.default_duration, TimingSource::Default),
                };
                // Declared starts are trusted as-is, gaps and overlaps included.
                let start = scene.legacy_start().unwrap_or(cursor);
                ComputedSceneTiming {
                    scene_id: scene.id.clone(),
                    start,
                    duration,
                    tts_duration,
                    source,
                }
            }
        };

        cursor = timing.end();
        scenes.push(timing);
    }

    SceneTimeline { mode, scenes }
}
