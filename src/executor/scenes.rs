//! Phase 3: scene images and videos.
//!
//! Direct mode generates every scene image from its own spec. Consistency
//! mode generates a single reference image and derives each scene image as
//! an edit of it. In both modes video scenes are then animated from their
//! image. Every failure in this phase is fatal.

use futures::StreamExt;
use scenecast_common::{ConsistencyConfig, Scene, Workflow};
use serde_json::json;

use super::{Ctx, Generated, PlannedStep, RunState, SceneAssets, StepOutput};
use crate::assets::AssetKind;
use crate::cache::content_hash;
use crate::errors::{ExecutorError, ServiceError, Severity, StepError};
use crate::generation::{ImageEditInput, StepRequest, VideoRequestInput};

const REFERENCE_TARGET: &str = "consistency";

/// Image source of a scene: its own spec, or an edit of the shared reference.
enum ImageSource<'a> {
    Direct,
    Edit {
        model: &'a str,
        reference_url: Option<&'a str>,
        consistency: &'a ConsistencyConfig,
    },
}

/// Plans for one scene's image and optional video.
struct ScenePlan<'a> {
    scene: &'a Scene,
    image: PlannedStep,
    video: Option<PlannedStep>,
}

/// Everything a scene produced, including steps that succeeded before a
/// later step of the same scene failed.
struct SceneOutcome<'a> {
    plan: &'a ScenePlan<'a>,
    completed: Vec<(&'a PlannedStep, Option<Generated>)>,
    result: Result<SceneAssets, StepError>,
}

pub(super) async fn run(
    ctx: &Ctx<'_>,
    state: &mut RunState<'_>,
    workflow: &Workflow,
) -> Result<Vec<SceneAssets>, ExecutorError> {
    match &workflow.consistency {
        None => {
            let plans: Vec<ScenePlan<'_>> = workflow
                .scenes
                .iter()
                .map(|scene| plan_scene(ctx, state, scene, image_hash(scene)))
                .collect();
            generate_scenes(ctx, state, &plans, ImageSource::Direct).await
        }
        Some(consistency) => anchored(ctx, state, workflow, consistency).await,
    }
}

fn image_hash(scene: &Scene) -> String {
    content_hash(&json!({
        "model": scene.image_generation.model,
        "input": scene.image_generation.input,
    }))
}

fn reference_model<'a>(ctx: &'a Ctx<'_>, consistency: &'a ConsistencyConfig) -> &'a str {
    consistency
        .reference_model
        .as_deref()
        .unwrap_or(&ctx.options.models.consistency_reference)
}

fn edit_model<'a>(ctx: &'a Ctx<'_>, consistency: &'a ConsistencyConfig) -> &'a str {
    consistency
        .edit_model
        .as_deref()
        .unwrap_or(&ctx.options.models.consistency_edit)
}

fn reference_hash(model: &str, consistency: &ConsistencyConfig) -> String {
    content_hash(&json!({
        "model": model,
        "prompt": consistency.reference_prompt,
        "seed": consistency.seed,
        "aspect_ratio": consistency.aspect_ratio,
    }))
}

fn edit_input(scene: &Scene, consistency: &ConsistencyConfig, image_url: String) -> ImageEditInput {
    let spec = &scene.image_generation.input;
    ImageEditInput {
        prompt: spec.prompt.clone(),
        image_url,
        seed: consistency.seed.or(spec.seed),
        aspect_ratio: consistency
            .aspect_ratio
            .clone()
            .or_else(|| spec.aspect_ratio.clone()),
    }
}

fn edit_hash(scene: &Scene, consistency: &ConsistencyConfig, model: &str, reference: &str) -> String {
    // The image_url is left out: the reference is identified by its hash.
    let input = edit_input(scene, consistency, String::new());
    content_hash(&json!({
        "model": model,
        "reference": reference,
        "prompt": input.prompt,
        "seed": input.seed,
        "aspect_ratio": input.aspect_ratio,
    }))
}

fn video_hash(scene: &Scene, image_hash: &str) -> Option<String> {
    let video = scene.video_generation.as_ref()?;
    Some(content_hash(&json!({
        "model": video.model,
        "input": video.input,
        "image": image_hash,
    })))
}

fn plan_scene<'a>(
    ctx: &Ctx<'_>,
    state: &RunState<'_>,
    scene: &'a Scene,
    image_hash: String,
) -> ScenePlan<'a> {
    let skip = ctx.options.skip_cache;
    let video = if scene.is_video() {
        video_hash(scene, &image_hash).map(|hash| {
            PlannedStep::new(
                &*state.cache,
                skip,
                "video",
                &scene.id,
                hash,
                ctx.paths.asset_path(&scene.id, AssetKind::Video),
            )
        })
    } else {
        None
    };
    let image = PlannedStep::new(
        &*state.cache,
        skip,
        "image",
        &scene.id,
        image_hash,
        ctx.paths.asset_path(&scene.id, AssetKind::Image),
    );
    ScenePlan { scene, image, video }
}

async fn anchored(
    ctx: &Ctx<'_>,
    state: &mut RunState<'_>,
    workflow: &Workflow,
    consistency: &ConsistencyConfig,
) -> Result<Vec<SceneAssets>, ExecutorError> {
    let ref_model = reference_model(ctx, consistency);
    let reference = PlannedStep::new(
        &*state.cache,
        ctx.options.skip_cache,
        "reference",
        REFERENCE_TARGET,
        reference_hash(ref_model, consistency),
        ctx.paths.asset_path(REFERENCE_TARGET, AssetKind::ReferenceImage),
    );

    let edit_model_id = edit_model(ctx, consistency);
    let plans: Vec<ScenePlan<'_>> = workflow
        .scenes
        .iter()
        .map(|scene| {
            let hash = edit_hash(scene, consistency, edit_model_id, &reference.hash);
            plan_scene(ctx, state, scene, hash)
        })
        .collect();

    let (reference_output, generated) = match reference.reuse() {
        Some(output) => (output, None),
        None => {
            let request = StepRequest::Image {
                model: ref_model.to_string(),
                input: scenecast_common::ImageInput {
                    prompt: consistency.reference_prompt.clone(),
                    seed: consistency.seed,
                    aspect_ratio: consistency.aspect_ratio.clone(),
                    ..Default::default()
                },
            };
            let (output, generated) = ctx
                .produce(&reference, &request)
                .await
                .map_err(|e| reference.error(Severity::Fatal, e))?;
            (output, Some(generated))
        }
    };
    state.settle(ctx, &reference, generated).await?;

    // The reference only has to be sent when some scene image is a miss.
    let reference_url = if plans.iter().any(|p| p.image.hit.is_none()) {
        let url = ctx
            .reference_for(&reference_output)
            .await
            .map_err(|e| reference.error(Severity::Fatal, e))?;
        Some(url)
    } else {
        None
    };

    let source = ImageSource::Edit {
        model: edit_model_id,
        reference_url: reference_url.as_deref(),
        consistency,
    };
    generate_scenes(ctx, state, &plans, source).await
}

async fn generate_scenes(
    ctx: &Ctx<'_>,
    state: &mut RunState<'_>,
    plans: &[ScenePlan<'_>],
    source: ImageSource<'_>,
) -> Result<Vec<SceneAssets>, ExecutorError> {
    let source = &source;
    let mut outcomes = futures::stream::iter(plans.iter())
        .map(|plan| scene_assets(ctx, plan, source))
        .buffered(ctx.dispatcher.concurrency());

    let mut assets = Vec::with_capacity(plans.len());
    while let Some(outcome) = outcomes.next().await {
        for (step, generated) in outcome.completed {
            state.settle(ctx, step, generated).await?;
        }
        let scene = outcome.result?;
        tracing::debug!(scene_id = %outcome.plan.scene.id, "Scene assets ready");
        assets.push(scene);
    }
    Ok(assets)
}

async fn scene_assets<'a>(
    ctx: &Ctx<'_>,
    plan: &'a ScenePlan<'a>,
    source: &ImageSource<'_>,
) -> SceneOutcome<'a> {
    let mut completed = Vec::new();
    let result = scene_steps(ctx, plan, source, &mut completed).await;
    SceneOutcome {
        plan,
        completed,
        result,
    }
}

async fn scene_steps<'a>(
    ctx: &Ctx<'_>,
    plan: &'a ScenePlan<'a>,
    source: &ImageSource<'_>,
    completed: &mut Vec<(&'a PlannedStep, Option<Generated>)>,
) -> Result<SceneAssets, StepError> {
    let scene = plan.scene;
    let fatal = |step: &PlannedStep, e: ServiceError| step.error(Severity::Fatal, e);

    let image = match plan.image.reuse() {
        Some(output) => {
            completed.push((&plan.image, None));
            output
        }
        None => {
            let request = match source {
                ImageSource::Direct => StepRequest::Image {
                    model: scene.image_generation.model.clone(),
                    input: scene.image_generation.input.clone(),
                },
                ImageSource::Edit {
                    model,
                    reference_url,
                    consistency,
                } => StepRequest::ImageEdit {
                    model: model.to_string(),
                    input: edit_input(
                        scene,
                        consistency,
                        reference_url.unwrap_or_default().to_string(),
                    ),
                },
            };
            let (output, generated) = ctx
                .produce(&plan.image, &request)
                .await
                .map_err(|e| fatal(&plan.image, e))?;
            completed.push((&plan.image, Some(generated)));
            output
        }
    };

    let video = match (&plan.video, &scene.video_generation) {
        (Some(step), Some(spec)) => Some(match step.reuse() {
            Some(output) => {
                completed.push((step, None));
                output
            }
            None => {
                let image_url = ctx
                    .reference_for(&image)
                    .await
                    .map_err(|e| fatal(step, e))?;
                let request = StepRequest::Video {
                    model: spec.model.clone(),
                    input: VideoRequestInput {
                        image_url,
                        spec: spec.input.clone(),
                    },
                };
                let (output, generated) =
                    ctx.produce(step, &request).await.map_err(|e| fatal(step, e))?;
                completed.push((step, Some(generated)));
                output
            }
        }),
        _ => None,
    };

    Ok(assets_for(scene, image, video))
}

fn assets_for(scene: &Scene, image: StepOutput, video: Option<StepOutput>) -> SceneAssets {
    SceneAssets {
        scene_id: scene.id.clone(),
        image_path: image.path,
        image_url: image.url,
        video_path: video.as_ref().map(|v| v.path.clone()),
        video_url: video.and_then(|v| v.url),
    }
}
