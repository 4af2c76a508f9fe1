//! Phase 6: per-segment transcription.
//!
//! Each narration segment is transcribed on its own and its chunks are
//! shifted by the computed start of the segment's scene, so subtitles line
//! up with the rendered timeline including padding.

use futures::StreamExt;

use super::{Ctx, Generated, RunState};
use crate::cost::CostCategory;
use crate::errors::{ExecutorError, ServiceError, StepError};
use crate::generation::{TranscriptChunk, TranscriptionRequest};
use crate::timing::{NarrationSegment, SceneTimeline};

const STEP: &str = "transcription";

/// Shift segment-relative chunks onto the timeline.
pub fn offset_chunks(chunks: &[TranscriptChunk], scene_start: f64) -> Vec<TranscriptChunk> {
    chunks
        .iter()
        .map(|chunk| TranscriptChunk {
            start: chunk.start + scene_start,
            end: chunk.end + scene_start,
            text: chunk.text.clone(),
        })
        .collect()
}

pub(super) async fn run(
    ctx: &Ctx<'_>,
    state: &mut RunState<'_>,
    narration: &[NarrationSegment],
    timeline: &SceneTimeline,
) -> Result<Vec<TranscriptChunk>, ExecutorError> {
    if narration.is_empty() {
        return Ok(Vec::new());
    }

    let mut results = futures::stream::iter(narration.iter())
        .map(|segment| transcribe_segment(ctx, segment))
        .buffered(ctx.dispatcher.concurrency());

    let mut transcript = Vec::new();
    while let Some(result) = results.next().await {
        let Some((segment, chunks, generated)) = state.absorb(ctx, result).await? else {
            continue;
        };
        state.commit(ctx, generated).await?;

        let scene_start = timeline.start_of(&segment.scene_id).unwrap_or(0.0);
        tracing::debug!(
            scene_id = %segment.scene_id,
            chunks = chunks.len(),
            offset = scene_start,
            "Segment transcribed"
        );
        transcript.extend(offset_chunks(&chunks, scene_start));
    }
    Ok(transcript)
}

async fn transcribe_segment<'s>(
    ctx: &Ctx<'_>,
    segment: &'s NarrationSegment,
) -> Result<(&'s NarrationSegment, Vec<TranscriptChunk>, Generated), StepError> {
    let degraded = |source: ServiceError| StepError::degradable(STEP, &segment.scene_id, source);

    let audio_url = match &segment.audio_url {
        Some(url) => url.clone(),
        None => ctx.service.upload(&segment.audio_path).await.map_err(degraded)?,
    };
    let request = TranscriptionRequest {
        model: ctx.options.models.transcription.clone(),
        audio_url,
    };

    let service = ctx.service;
    let request = &request;
    let transcript = ctx
        .dispatcher
        .submit(&request.model, move || service.transcribe(request))
        .await
        .map_err(degraded)?;

    let generated = Generated {
        step: STEP,
        target: segment.scene_id.clone(),
        model: request.model.clone(),
        category: CostCategory::Transcription,
        cache: None,
    };
    Ok((segment, transcript.chunks, generated))
}
