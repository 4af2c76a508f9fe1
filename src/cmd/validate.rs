//! Workflow validation command (`scenecast validate`).

use anyhow::Result;
use scenecast::validate_workflow;
use std::path::Path;

use super::load_workflow;

pub fn cmd_validate(workflow_path: &Path) -> Result<()> {
    let workflow = load_workflow(workflow_path)?;

    println!();
    println!("Validating {}...", workflow_path.display());
    println!();

    match validate_workflow(&workflow) {
        Ok(()) => {
            let narrated = workflow
                .scenes
                .iter()
                .filter(|s| s.narration_text().is_some())
                .count();
            println!(
                "Workflow '{}' is valid: {} scene(s), {} narrated, timing mode {}.",
                workflow.name,
                workflow.scenes.len(),
                narrated,
                workflow.timing_mode()
            );
            println!();
            Ok(())
        }
        Err(e) => {
            println!("Workflow '{}' has problems:", workflow.name);
            for issue in &e.issues {
                println!("  - {}", issue);
            }
            println!();
            anyhow::bail!("{} validation issue(s) found", e.issues.len())
        }
    }
}
