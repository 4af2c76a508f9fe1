//! Phase-ordered workflow execution.
//!
//! A run goes through six phases, strictly one after another:
//!
//! 1. narration (first segment alone, then the rest with its voice)
//! 2. timing
//! 3. scene assets (direct or consistency-anchored)
//! 4. sound effects
//! 5. music
//! 6. transcription
//!
//! Work inside a phase fans out to at most the dispatcher's concurrency and
//! results are consumed in scene order. Cache writes and cost records only
//! happen in that consuming loop, so they are never concurrent.
//!
//! Failures carry a [`Severity`]: fatal ones end the run with the original
//! error, degradable ones are logged, recorded in
//! [`WorkflowResult::degraded`] and the phase carries on.

mod effects;
pub mod events;
mod narration;
mod scenes;
mod transcription;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use scenecast_common::{Workflow, validate_workflow};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::assets::AssetPathProvider;
use crate::audio::{
    DEFAULT_EFFECT_VOLUME, DEFAULT_MUSIC_VOLUME, DurationProbe, FfprobeProbe, MixInput, MixMusic,
    MixNarration, MixSoundEffect, seconds_to_ms,
};
use crate::cache::ContentCache;
use crate::cost::{CostCategory, CostLedger, CostSummary, PricingTable};
use crate::dispatch::RequestDispatcher;
use crate::errors::{ExecutorError, ServiceError, Severity, StepError};
use crate::generation::{GenerationOutput, GenerationService, StepRequest, TranscriptChunk};
use crate::timing::{NarrationSegment, SceneTimeline, TimingOptions, compute_timing};

pub use events::{ExecutorEvent, Phase};
pub use transcription::offset_chunks;

/// Model ids for steps whose model the workflow may leave unspecified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub sound_effects: String,
    pub music: String,
    pub transcription: String,
    pub consistency_reference: String,
    pub consistency_edit: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            sound_effects: "fal-ai/elevenlabs/sound-effects".to_string(),
            music: "fal-ai/stable-audio".to_string(),
            transcription: "fal-ai/whisper".to_string(),
            consistency_reference: "fal-ai/flux/dev".to_string(),
            consistency_edit: "fal-ai/flux-pro/kontext".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    pub timing: TimingOptions,
    pub models: ModelSettings,
    /// Treat every cached step as a miss (fresh outputs still update the cache)
    pub skip_cache: bool,
}

/// Generated visuals of one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneAssets {
    pub scene_id: String,
    pub image_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

/// A generated sound effect at its absolute timeline position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedSoundEffect {
    pub scene_id: String,
    /// Position of the effect within its scene's list
    pub index: usize,
    pub path: PathBuf,
    /// Absolute start in seconds
    pub start: f64,
    pub duration: f64,
    pub volume: f64,
}

/// Background music, generated or supplied by the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicTrack {
    /// Local path or URL
    pub source: String,
    pub generated: bool,
    pub duration: Option<f64>,
    pub volume: f64,
    pub fade_in: Option<f64>,
    pub fade_out: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedStep {
    pub step: String,
    pub target: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub narration: Vec<NarrationSegment>,
    pub timeline: SceneTimeline,
    pub scene_assets: Vec<SceneAssets>,
    pub sound_effects: Vec<PlacedSoundEffect>,
    pub music: Option<MusicTrack>,
    /// Subtitle chunks with absolute timeline timestamps
    pub transcript: Vec<TranscriptChunk>,
    pub costs: CostSummary,
    pub degraded: Vec<DegradedStep>,
}

impl WorkflowResult {
    pub fn scene(&self, scene_id: &str) -> Option<&SceneAssets> {
        self.scene_assets.iter().find(|a| a.scene_id == scene_id)
    }

    /// Input manifest for the external audio mixer.
    pub fn mix_input(&self) -> MixInput {
        let narration_segments = self
            .narration
            .iter()
            .map(|segment| MixNarration {
                path: segment.audio_path.clone(),
                start_ms: seconds_to_ms(self.timeline.start_of(&segment.scene_id).unwrap_or(0.0)),
            })
            .collect();

        let music = self.music.as_ref().map(|track| MixMusic {
            source: track.source.clone(),
            volume: track.volume,
            fade_in: track.fade_in,
            fade_out: track.fade_out,
        });

        let sound_effects = self
            .sound_effects
            .iter()
            .map(|effect| MixSoundEffect {
                path: effect.path.clone(),
                start_ms: seconds_to_ms(effect.start),
                volume: effect.volume,
            })
            .collect();

        MixInput {
            narration_segments,
            music,
            sound_effects,
        }
    }
}

/// Runs one workflow against one run directory.
///
/// The executor owns the run's content cache and cost ledger; a run
/// directory must not be shared between concurrent executors.
pub struct WorkflowExecutor {
    service: Arc<dyn GenerationService>,
    dispatcher: RequestDispatcher,
    paths: Arc<dyn AssetPathProvider>,
    probe: Arc<dyn DurationProbe>,
    pricing: PricingTable,
    options: ExecutorOptions,
    cache: ContentCache,
    costs: CostLedger,
    degraded: Vec<DegradedStep>,
    event_tx: Option<mpsc::Sender<ExecutorEvent>>,
}

impl WorkflowExecutor {
    pub fn new(
        service: Arc<dyn GenerationService>,
        dispatcher: RequestDispatcher,
        paths: Arc<dyn AssetPathProvider>,
        cache: ContentCache,
    ) -> Self {
        Self {
            service,
            dispatcher,
            paths,
            probe: Arc::new(FfprobeProbe::default()),
            pricing: PricingTable::default(),
            options: ExecutorOptions::default(),
            cache,
            costs: CostLedger::new(),
            degraded: Vec::new(),
            event_tx: None,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn DurationProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the event channel for progress updates.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<ExecutorEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Execute every phase of `workflow`.
    pub async fn run(mut self, workflow: &Workflow) -> Result<WorkflowResult, ExecutorError> {
        validate_workflow(workflow).map_err(|e| ExecutorError::InvalidWorkflow(e.to_string()))?;
        tracing::info!(
            workflow = %workflow.name,
            scenes = workflow.scenes.len(),
            mode = %workflow.timing_mode(),
            "Starting workflow run"
        );

        let (ctx, mut state) = self.parts();

        // 1. Narration
        let narrated = workflow
            .scenes
            .iter()
            .filter(|s| s.narration_text().is_some())
            .count();
        ctx.phase_started(Phase::Narration, narrated).await;
        let narration = narration::run(&ctx, &mut state, workflow).await?;
        ctx.phase_completed(Phase::Narration).await;

        // 2. Timing
        ctx.phase_started(Phase::Timing, workflow.scenes.len()).await;
        let timeline = compute_timing(workflow, &narration, &ctx.options.timing);
        for timing in &timeline.scenes {
            tracing::debug!(
                scene_id = %timing.scene_id,
                start = timing.start,
                duration = timing.duration,
                source = %timing.source,
                "Computed scene timing"
            );
        }
        ctx.phase_completed(Phase::Timing).await;

        // 3. Scene assets
        ctx.phase_started(Phase::SceneAssets, workflow.scenes.len()).await;
        let scene_assets = scenes::run(&ctx, &mut state, workflow).await?;
        ctx.phase_completed(Phase::SceneAssets).await;

        // 4. Sound effects
        let effect_count = workflow.scenes.iter().map(|s| s.sound_effects.len()).sum();
        ctx.phase_started(Phase::SoundEffects, effect_count).await;
        let sound_effects = effects::sound_effects(&ctx, &mut state, workflow, &timeline).await?;
        ctx.phase_completed(Phase::SoundEffects).await;

        // 5. Music
        ctx.phase_started(Phase::Music, usize::from(workflow.audio.music.is_some()))
            .await;
        let music = effects::music(&ctx, &mut state, workflow, &timeline).await?;
        ctx.phase_completed(Phase::Music).await;

        // 6. Transcription
        ctx.phase_started(Phase::Transcription, narration.len()).await;
        let transcript = transcription::run(&ctx, &mut state, &narration, &timeline).await?;
        ctx.phase_completed(Phase::Transcription).await;

        let costs = state.costs.summary();
        let degraded = std::mem::take(&mut *state.degraded);
        ctx.emit(ExecutorEvent::RunCompleted {
            total_cost: costs.total,
            degraded: degraded.len(),
        })
        .await;
        tracing::info!(
            total_cost = costs.total,
            degraded = degraded.len(),
            "Workflow run complete"
        );

        Ok(WorkflowResult {
            narration,
            timeline,
            scene_assets,
            sound_effects,
            music,
            transcript,
            costs,
            degraded,
        })
    }

    fn parts(&mut self) -> (Ctx<'_>, RunState<'_>) {
        let Self {
            service,
            dispatcher,
            paths,
            probe,
            pricing,
            options,
            cache,
            costs,
            degraded,
            event_tx,
        } = self;
        (
            Ctx {
                service: &**service,
                dispatcher,
                paths: &**paths,
                probe: &**probe,
                options,
                events: event_tx.as_ref(),
            },
            RunState {
                cache,
                costs,
                degraded,
                pricing,
            },
        )
    }
}

/// Read-only collaborators shared by every in-flight step of a phase.
struct Ctx<'a> {
    service: &'a dyn GenerationService,
    dispatcher: &'a RequestDispatcher,
    paths: &'a dyn AssetPathProvider,
    probe: &'a dyn DurationProbe,
    options: &'a ExecutorOptions,
    events: Option<&'a mpsc::Sender<ExecutorEvent>>,
}

/// Mutable run bookkeeping, touched only between steps.
struct RunState<'a> {
    cache: &'a mut ContentCache,
    costs: &'a mut CostLedger,
    degraded: &'a mut Vec<DegradedStep>,
    pricing: &'a PricingTable,
}

/// A cache-checked step before it runs.
#[derive(Debug, Clone)]
struct PlannedStep {
    step: &'static str,
    target: String,
    key: String,
    hash: String,
    dest: PathBuf,
    /// Output path of a valid cache hit
    hit: Option<PathBuf>,
    /// Duration stored with the hit, if one was measured
    hit_duration: Option<f64>,
}

/// What a step left on disk.
#[derive(Debug, Clone)]
struct StepOutput {
    path: PathBuf,
    /// Remote reference when generated in this run
    url: Option<String>,
    duration: Option<f64>,
}

/// A remote call that succeeded and still needs to be booked.
#[derive(Debug, Clone)]
struct Generated {
    step: &'static str,
    target: String,
    model: String,
    category: CostCategory,
    /// (key, hash, output path) for cacheable steps
    cache: Option<(String, String, PathBuf)>,
}

impl PlannedStep {
    fn new(
        cache: &ContentCache,
        skip_cache: bool,
        step: &'static str,
        target: &str,
        hash: String,
        dest: PathBuf,
    ) -> Self {
        let key = crate::cache::step_key(step, target);
        // A hit whose file has gone missing is regenerated.
        let entry = if skip_cache {
            None
        } else {
            cache
                .lookup(&key, &hash)
                .filter(|entry| entry.output_path.exists())
        };
        Self {
            step,
            target: target.to_string(),
            hit: entry.map(|e| e.output_path.clone()),
            hit_duration: entry.and_then(|e| e.duration),
            key,
            hash,
            dest,
        }
    }

    fn reuse(&self) -> Option<StepOutput> {
        self.hit.as_ref().map(|path| StepOutput {
            path: path.clone(),
            url: None,
            duration: self.hit_duration,
        })
    }

    fn error(&self, severity: Severity, source: ServiceError) -> StepError {
        StepError {
            step: self.step,
            target: self.target.clone(),
            severity,
            source,
        }
    }
}

impl Ctx<'_> {
    async fn emit(&self, event: ExecutorEvent) {
        if let Some(tx) = self.events {
            tx.send(event).await.ok();
        }
    }

    async fn phase_started(&self, phase: Phase, items: usize) {
        tracing::info!(phase = %phase, items, "Phase started");
        self.emit(ExecutorEvent::PhaseStarted { phase, items }).await;
    }

    async fn phase_completed(&self, phase: Phase) {
        self.emit(ExecutorEvent::PhaseCompleted { phase }).await;
    }

    /// Generate through the dispatcher and download the output to `dest`.
    async fn generate(
        &self,
        request: &StepRequest,
        dest: &Path,
    ) -> Result<GenerationOutput, ServiceError> {
        let service = self.service;
        let output = self
            .dispatcher
            .submit(request.model(), move || service.generate(request))
            .await?;
        let url = output.url.as_str();
        self.dispatcher
            .submit("download", move || service.download(url, dest))
            .await?;
        Ok(output)
    }

    /// Generate a planned, cacheable step.
    async fn produce(
        &self,
        plan: &PlannedStep,
        request: &StepRequest,
    ) -> Result<(StepOutput, Generated), ServiceError> {
        let output = self.generate(request, &plan.dest).await?;
        let generated = Generated {
            step: plan.step,
            target: plan.target.clone(),
            model: request.model().to_string(),
            category: request.category(),
            cache: Some((plan.key.clone(), plan.hash.clone(), plan.dest.clone())),
        };
        Ok((
            StepOutput {
                path: plan.dest.clone(),
                url: Some(output.url),
                duration: output.duration,
            },
            generated,
        ))
    }

    /// A reference to `output` the service accepts as input.
    async fn reference_for(&self, output: &StepOutput) -> Result<String, ServiceError> {
        match &output.url {
            Some(url) => Ok(url.clone()),
            None => self.service.upload(&output.path).await,
        }
    }
}

impl RunState<'_> {
    /// Persist the cache entry and cost of a generated step.
    async fn commit(&mut self, ctx: &Ctx<'_>, generated: Generated) -> Result<(), ExecutorError> {
        if let Some((key, hash, path)) = &generated.cache {
            self.cache.set(key, hash, path.clone()).await?;
        }
        let cost = self.pricing.estimate(&generated.model, generated.category);
        self.costs.record(generated.model.clone(), cost);
        tracing::info!(
            step = generated.step,
            target = %generated.target,
            model = %generated.model,
            cost,
            "Step generated"
        );
        ctx.emit(ExecutorEvent::StepGenerated {
            step: generated.step,
            target: generated.target,
            model: generated.model,
        })
        .await;
        Ok(())
    }

    async fn cached(&mut self, ctx: &Ctx<'_>, plan: &PlannedStep) {
        tracing::info!(step = plan.step, target = %plan.target, step_key = %plan.key, "Cache hit");
        ctx.emit(ExecutorEvent::StepCached {
            step: plan.step,
            target: plan.target.clone(),
        })
        .await;
    }

    /// Book a generated step or a cache hit.
    async fn settle(
        &mut self,
        ctx: &Ctx<'_>,
        plan: &PlannedStep,
        generated: Option<Generated>,
    ) -> Result<(), ExecutorError> {
        match generated {
            Some(generated) => self.commit(ctx, generated).await,
            None => {
                self.cached(ctx, plan).await;
                Ok(())
            }
        }
    }

    /// Store a measured duration with the step's cache entry.
    async fn remember_duration(
        &mut self,
        plan: &PlannedStep,
        seconds: Option<f64>,
    ) -> Result<(), ExecutorError> {
        if let Some(seconds) = seconds.filter(|s| s.is_finite() && *s > 0.0)
            && plan.hit_duration != Some(seconds)
        {
            self.cache.set_duration(&plan.key, &plan.hash, seconds).await?;
        }
        Ok(())
    }

    /// Fatal errors end the run; degradable ones are recorded and dropped.
    async fn absorb<T>(
        &mut self,
        ctx: &Ctx<'_>,
        result: Result<T, StepError>,
    ) -> Result<Option<T>, ExecutorError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(err) => {
                tracing::warn!(
                    step = err.step,
                    target = %err.target,
                    error = %err.source,
                    "Degradable step failed, continuing without it"
                );
                ctx.emit(ExecutorEvent::StepDegraded {
                    step: err.step,
                    target: err.target.clone(),
                    error: err.source.to_string(),
                })
                .await;
                self.degraded.push(DegradedStep {
                    step: err.step.to_string(),
                    target: err.target,
                    error: err.source.to_string(),
                });
                Ok(None)
            }
        }
    }
}

/// Default volumes applied when the workflow leaves them out.
fn effect_volume(volume: Option<f64>) -> f64 {
    volume.unwrap_or(DEFAULT_EFFECT_VOLUME)
}

fn music_volume(volume: Option<f64>) -> f64 {
    volume.unwrap_or(DEFAULT_MUSIC_VOLUME)
}
