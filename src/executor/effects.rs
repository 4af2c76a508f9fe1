//! Phases 4 and 5: sound effects and background music.
//!
//! Both are degradable: a failed effect or music call is logged and left
//! out of the result. Effects are always regenerated; music is cached.

use futures::StreamExt;
use scenecast_common::{MusicConfig, Scene, SoundEffectSpec, Workflow};
use serde_json::json;

use super::{
    Ctx, Generated, MusicTrack, PlacedSoundEffect, PlannedStep, RunState, effect_volume,
    music_volume,
};
use crate::assets::AssetKind;
use crate::cache::content_hash;
use crate::errors::{ExecutorError, Severity, StepError};
use crate::generation::{MusicInput, SoundEffectInput, StepRequest};
use crate::timing::SceneTimeline;

const EFFECT_STEP: &str = "sound_effect";
const MUSIC_STEP: &str = "music";
const MUSIC_TARGET: &str = "workflow";

/// One effect waiting to be generated.
struct EffectJob<'a> {
    scene: &'a Scene,
    index: usize,
    spec: &'a SoundEffectSpec,
    start: f64,
}

impl EffectJob<'_> {
    fn target(&self) -> String {
        format!("{}#{}", self.scene.id, self.index)
    }
}

pub(super) async fn sound_effects(
    ctx: &Ctx<'_>,
    state: &mut RunState<'_>,
    workflow: &Workflow,
    timeline: &SceneTimeline,
) -> Result<Vec<PlacedSoundEffect>, ExecutorError> {
    let jobs: Vec<EffectJob<'_>> = workflow
        .scenes
        .iter()
        .flat_map(|scene| {
            let scene_start = timeline.start_of(&scene.id).unwrap_or(0.0);
            scene
                .sound_effects
                .iter()
                .enumerate()
                .map(move |(index, spec)| EffectJob {
                    scene,
                    index,
                    spec,
                    start: scene_start + spec.timing_offset,
                })
        })
        .collect();

    if jobs.is_empty() {
        return Ok(Vec::new());
    }

    let mut results = futures::stream::iter(jobs.iter())
        .map(|job| generate_effect(ctx, job))
        .buffered(ctx.dispatcher.concurrency());

    let mut placed = Vec::with_capacity(jobs.len());
    while let Some(result) = results.next().await {
        if let Some((effect, generated)) = state.absorb(ctx, result).await? {
            state.commit(ctx, generated).await?;
            placed.push(effect);
        }
    }
    Ok(placed)
}

async fn generate_effect(
    ctx: &Ctx<'_>,
    job: &EffectJob<'_>,
) -> Result<(PlacedSoundEffect, Generated), StepError> {
    let model = ctx.options.models.sound_effects.clone();
    let request = StepRequest::SoundEffect {
        model: model.clone(),
        input: SoundEffectInput {
            text: job.spec.prompt.clone(),
            duration_seconds: job.spec.duration,
            negative_prompt: job.spec.negative_prompt.clone(),
        },
    };
    let path = ctx
        .paths
        .asset_path(&job.scene.id, AssetKind::SoundEffect(job.index));

    let output = ctx
        .generate(&request, &path)
        .await
        .map_err(|source| StepError::degradable(EFFECT_STEP, job.target(), source))?;

    let effect = PlacedSoundEffect {
        scene_id: job.scene.id.clone(),
        index: job.index,
        path,
        start: job.start,
        duration: output.duration.unwrap_or(job.spec.duration),
        volume: effect_volume(job.spec.volume),
    };
    let generated = Generated {
        step: EFFECT_STEP,
        target: job.target(),
        model,
        category: request.category(),
        cache: None,
    };
    Ok((effect, generated))
}

fn music_hash(model: &str, prompt: &str, duration: f64) -> String {
    content_hash(&json!({
        "model": model,
        "prompt": prompt,
        "duration": duration,
    }))
}

pub(super) async fn music(
    ctx: &Ctx<'_>,
    state: &mut RunState<'_>,
    workflow: &Workflow,
    timeline: &SceneTimeline,
) -> Result<Option<MusicTrack>, ExecutorError> {
    let Some(config) = workflow.audio.music.as_ref() else {
        return Ok(None);
    };

    let Some(prompt) = workflow.music_prompt() else {
        return Ok(supplied_track(config));
    };

    let duration = config.duration.unwrap_or_else(|| timeline.summed_duration());
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| ctx.options.models.music.clone());
    let plan = PlannedStep::new(
        &*state.cache,
        ctx.options.skip_cache,
        MUSIC_STEP,
        MUSIC_TARGET,
        music_hash(&model, prompt, duration),
        ctx.paths.asset_path("", AssetKind::Music),
    );

    let result = match plan.reuse() {
        Some(output) => Ok((output, None)),
        None => {
            let request = StepRequest::Music {
                model,
                input: MusicInput {
                    prompt: prompt.to_string(),
                    seconds_total: duration,
                },
            };
            ctx.produce(&plan, &request)
                .await
                .map(|(output, generated)| (output, Some(generated)))
                .map_err(|e| plan.error(Severity::Degradable, e))
        }
    };

    let Some((output, generated)) = state.absorb(ctx, result).await? else {
        return Ok(None);
    };
    state.settle(ctx, &plan, generated).await?;

    Ok(Some(MusicTrack {
        source: output.path.display().to_string(),
        generated: true,
        duration: Some(output.duration.unwrap_or(duration)),
        volume: music_volume(config.volume),
        fade_in: config.fade_in,
        fade_out: config.fade_out,
    }))
}

/// Music the workflow supplies as a file or URL, passed straight to the mix.
fn supplied_track(config: &MusicConfig) -> Option<MusicTrack> {
    let source = config
        .file
        .as_deref()
        .or(config.url.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())?;
    Some(MusicTrack {
        source: source.to_string(),
        generated: false,
        duration: config.duration,
        volume: music_volume(config.volume),
        fade_in: config.fade_in,
        fade_out: config.fade_out,
    })
}
