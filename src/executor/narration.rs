//! Phase 1: narration.
//!
//! The first narrated scene is synthesized alone. Unless the workflow
//! declares a voice reference, its audio then becomes the voice-cloning
//! reference for every other segment, which run concurrently.

use futures::StreamExt;
use scenecast_common::{Scene, TtsConfig, Workflow};
use serde_json::json;

use super::{Ctx, PlannedStep, RunState, StepOutput};
use crate::assets::AssetKind;
use crate::cache::content_hash;
use crate::errors::{ExecutorError, Severity, StepError};
use crate::generation::{SpeechInput, StepRequest};
use crate::timing::NarrationSegment;

const STEP: &str = "narration";

/// Content hash of a narration step. `voice_clone_of` is the hash of the
/// segment whose audio is injected as the voice reference, if any.
fn narration_hash(text: &str, tts: &TtsConfig, voice_clone_of: Option<&str>) -> String {
    content_hash(&json!({
        "model": tts.model,
        "input": SpeechInput::from_config(text, tts),
        "voice_clone_of": voice_clone_of,
    }))
}

pub(super) async fn run(
    ctx: &Ctx<'_>,
    state: &mut RunState<'_>,
    workflow: &Workflow,
) -> Result<Vec<NarrationSegment>, ExecutorError> {
    let tts = &workflow.audio.tts;
    let narrated: Vec<(&Scene, &str)> = workflow
        .scenes
        .iter()
        .filter_map(|scene| scene.narration_text().map(|text| (scene, text)))
        .collect();

    let Some(((first_scene, first_text), rest)) = narrated.split_first() else {
        tracing::info!("No narration in workflow");
        return Ok(Vec::new());
    };

    let plan = |scene: &Scene, hash: String| {
        PlannedStep::new(
            &*state.cache,
            ctx.options.skip_cache,
            STEP,
            &scene.id,
            hash,
            ctx.paths.asset_path(&scene.id, AssetKind::Narration),
        )
    };

    let first_plan = plan(*first_scene, narration_hash(first_text, tts, None));
    let rest_plans: Vec<(PlannedStep, &str)> = {
        let clone_of = tts.voice_reference.is_none().then_some(first_plan.hash.as_str());
        rest.iter()
            .map(|(scene, text)| (plan(*scene, narration_hash(text, tts, clone_of)), *text))
            .collect()
    };

    // First segment: its output becomes the voice reference.
    let (first_output, generated) = synthesize(ctx, &first_plan, first_text, tts, None).await?;
    state.settle(ctx, &first_plan, generated).await?;

    // Only sent when a later segment actually has to be synthesized.
    let needs_reference = rest_plans.iter().any(|(plan, _)| plan.hit.is_none());
    let voice_reference = if tts.voice_reference.is_none() && needs_reference {
        let reference = ctx
            .reference_for(&first_output)
            .await
            .map_err(|e| first_plan.error(Severity::Fatal, e))?;
        tracing::info!(scene_id = %first_plan.target, "Using first narration segment as voice reference");
        Some(reference)
    } else {
        None
    };

    let mut segments = Vec::with_capacity(narrated.len());
    let first_segment = segment(ctx, &first_plan, first_text, first_output).await;
    state.remember_duration(&first_plan, first_segment.duration).await?;
    segments.push(first_segment);

    let voice_reference = voice_reference.as_deref();
    let mut results = futures::stream::iter(rest_plans.iter())
        .map(|(plan, text)| async move {
            synthesize(ctx, plan, text, tts, voice_reference)
                .await
                .map(|(output, generated)| (plan, *text, output, generated))
        })
        .buffered(ctx.dispatcher.concurrency());

    while let Some(result) = results.next().await {
        let (plan, text, output, generated) = result?;
        state.settle(ctx, plan, generated).await?;
        let built = segment(ctx, plan, text, output).await;
        state.remember_duration(plan, built.duration).await?;
        segments.push(built);
    }

    Ok(segments)
}

/// Reuse or generate one narration segment. Any failure is fatal.
async fn synthesize(
    ctx: &Ctx<'_>,
    plan: &PlannedStep,
    text: &str,
    tts: &TtsConfig,
    voice_reference: Option<&str>,
) -> Result<(StepOutput, Option<super::Generated>), StepError> {
    if let Some(output) = plan.reuse() {
        return Ok((output, None));
    }

    let request = StepRequest::Speech {
        model: tts.model.clone(),
        input: SpeechInput::from_config(text, tts)
            .with_voice_reference(voice_reference.map(str::to_string)),
    };
    let (output, generated) = ctx
        .produce(plan, &request)
        .await
        .map_err(|e| plan.error(Severity::Fatal, e))?;
    Ok((output, Some(generated)))
}

/// Build the segment, measuring the audio when neither the service nor the
/// cache supplied a duration.
async fn segment(
    ctx: &Ctx<'_>,
    plan: &PlannedStep,
    text: &str,
    output: StepOutput,
) -> NarrationSegment {
    let duration = match output.duration {
        Some(d) => Some(d),
        None => {
            let measured = ctx.probe.probe(&output.path).await;
            if measured.is_none() {
                tracing::warn!(
                    scene_id = %plan.target,
                    path = %output.path.display(),
                    "Could not measure narration duration, falling back to declared timing"
                );
            }
            measured
        }
    };

    NarrationSegment {
        scene_id: plan.target.clone(),
        text: text.to_string(),
        audio_path: output.path,
        audio_url: output.url,
        duration,
    }
}
