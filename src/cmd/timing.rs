//! Timeline preview command (`scenecast timing`).

use anyhow::Result;
use scenecast::scenecast_config::ScenecastConfig;
use scenecast::timing::compute_timing;
use std::path::Path;

use super::load_workflow;

/// Compute the timeline from declared durations only. Narration has not
/// been synthesized yet, so narrated scenes fall back like unmeasured ones.
pub fn cmd_timing(project_dir: &Path, workflow_path: &Path) -> Result<()> {
    let workflow = load_workflow(workflow_path)?;
    let config = ScenecastConfig::new(project_dir.to_path_buf())?;
    let options = config.toml.timing.to_timing_options();

    let timeline = compute_timing(&workflow, &[], &options);

    println!();
    println!("Timeline for '{}' ({} mode)", workflow.name, timeline.mode);
    println!();
    println!(
        "  {:<20} {:>9} {:>9} {:>9}  source",
        "scene", "start", "duration", "end"
    );
    for scene in &timeline.scenes {
        println!(
            "  {:<20} {:>9.2} {:>9.2} {:>9.2}  {}",
            scene.scene_id,
            scene.start,
            scene.duration,
            scene.end(),
            scene.source
        );
    }
    println!();
    println!(
        "Total: {:.2}s (target {:.2}s)",
        timeline.total_duration(),
        workflow.duration_target_seconds
    );
    println!();
    Ok(())
}
