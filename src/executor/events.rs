//! Progress events emitted while a workflow runs.

use std::fmt;

/// The six phases of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Narration,
    Timing,
    SceneAssets,
    SoundEffects,
    Music,
    Transcription,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Narration,
        Phase::Timing,
        Phase::SceneAssets,
        Phase::SoundEffects,
        Phase::Music,
        Phase::Transcription,
    ];

    /// 1-based position in the run.
    pub fn number(self) -> usize {
        match self {
            Phase::Narration => 1,
            Phase::Timing => 2,
            Phase::SceneAssets => 3,
            Phase::SoundEffects => 4,
            Phase::Music => 5,
            Phase::Transcription => 6,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Narration => "narration",
            Phase::Timing => "timing",
            Phase::SceneAssets => "scene assets",
            Phase::SoundEffects => "sound effects",
            Phase::Music => "music",
            Phase::Transcription => "transcription",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorEvent {
    PhaseStarted {
        phase: Phase,
        /// Number of work items the phase will handle
        items: usize,
    },
    PhaseCompleted {
        phase: Phase,
    },
    /// A step was satisfied from the content cache.
    StepCached {
        step: &'static str,
        target: String,
    },
    /// A step was generated remotely.
    StepGenerated {
        step: &'static str,
        target: String,
        model: String,
    },
    /// A non-fatal step failed and its output was dropped.
    StepDegraded {
        step: &'static str,
        target: String,
        error: String,
    },
    RunCompleted {
        total_cost: f64,
        degraded: usize,
    },
}
