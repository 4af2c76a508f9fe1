//! Shared domain types for scenecast.
//!
//! This crate holds the declarative workflow document (`workflow.json`) and
//! its structural validation. It carries no I/O and no async code so that
//! both the engine and any tooling around it can depend on it cheaply.

pub mod validate;
pub mod workflow;

pub use validate::{RESERVED_ID_PREFIX, ValidationError, ValidationIssue, validate_workflow};
pub use workflow::{
    AudioConfig, ConsistencyConfig, ImageGeneration, ImageInput, MusicConfig, Scene, SceneKind,
    SceneTiming, SoundEffectSpec, TimingMode, TtsConfig, VideoGeneration, VideoInput, Workflow,
};
