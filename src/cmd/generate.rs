//! Workflow execution command (`scenecast generate`).

use anyhow::{Context, Result};
use scenecast::cache::ContentCache;
use scenecast::config::Config;
use scenecast::dispatch::RequestDispatcher;
use scenecast::executor::{ExecutorEvent, WorkflowExecutor};
use scenecast::generation::FalClient;
use scenecast::logging::{LogOptions, init_logging};
use scenecast::ui::RunUI;
use scenecast::validate_workflow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{load_workflow, write_json};
use crate::Cli;

pub struct GenerateArgs {
    pub workflow: PathBuf,
    pub skip_cache: bool,
    pub output_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub run_dir: Option<PathBuf>,
}

pub async fn cmd_generate(project_dir: &Path, cli: &Cli, args: GenerateArgs) -> Result<()> {
    let config = Config::new(
        project_dir.to_path_buf(),
        cli.verbose,
        args.output_dir,
        args.concurrency,
        args.skip_cache,
    )?
    .with_run_dir(args.run_dir);

    let workflow = load_workflow(&args.workflow)?;
    validate_workflow(&workflow).context("Workflow failed validation")?;

    let layout = config.run_layout(&workflow.name, chrono::Local::now().date_naive());
    layout.create_dirs()?;

    let _guard = init_logging(&LogOptions {
        verbose: cli.verbose,
        format: cli.log_format,
        log_dir: Some(layout.logs_dir()),
    })?;
    for warning in &config.warnings {
        tracing::warn!(warning = %warning, "Configuration warning");
    }

    let _lock = layout.lock()?;
    write_json(&layout.workflow_path(), &workflow)?;

    let service = FalClient::new(config.require_fal_key()?)?;
    let cache = ContentCache::load(layout.root())
        .await
        .context("Failed to load content cache")?;
    tracing::info!(
        run_dir = %layout.root().display(),
        cached_steps = cache.len(),
        skip_cache = config.executor.skip_cache,
        "Prepared run directory"
    );

    let ui = RunUI::new(cli.verbose);
    ui.print_header(&workflow.name, layout.root());

    let (tx, mut rx) = mpsc::channel::<ExecutorEvent>(64);
    let ui_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            ui.handle(&event);
        }
        ui
    });

    let executor = WorkflowExecutor::new(
        Arc::new(service),
        RequestDispatcher::new(config.dispatch.clone()),
        Arc::new(layout.clone()),
        cache,
    )
    .with_pricing(config.pricing.clone())
    .with_options(config.executor.clone())
    .with_event_channel(tx);

    // The executor owns the sender, so the UI task ends when the run does.
    let result = executor.run(&workflow).await;
    let ui = ui_task.await.context("Progress UI task panicked")?;

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            ui.fail(&e.to_string());
            return Err(e).context("Workflow run failed");
        }
    };

    write_json(&layout.cost_path(), &result.costs)?;
    write_json(&layout.timeline_path(), &result.timeline)?;
    write_json(&layout.transcript_path(), &result.transcript)?;
    write_json(&layout.mix_path(), &result.mix_input())?;

    ui.finish(&result.costs, layout.root());
    if !result.degraded.is_empty() {
        println!(
            "{} step(s) were skipped after failing; see {}",
            result.degraded.len(),
            layout.logs_dir().display()
        );
    }
    Ok(())
}
