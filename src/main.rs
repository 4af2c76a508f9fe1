use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scenecast::logging::{LogFormat, LogOptions, init_logging};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "scenecast")]
#[command(version, about = "Workflow execution engine for generated narrated video")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format on stderr
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a workflow and generate all of its assets
    Generate {
        /// Path to the workflow JSON document
        workflow: PathBuf,

        /// Regenerate every step even when a cached output exists
        #[arg(long)]
        skip_cache: bool,

        /// Directory new run directories are created in
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Maximum concurrent remote calls
        #[arg(long)]
        concurrency: Option<usize>,

        /// Reuse an existing run directory (incremental re-run)
        #[arg(long)]
        run_dir: Option<PathBuf>,
    },
    /// Show the scene timeline from declared durations, without remote calls
    Timing {
        workflow: PathBuf,
    },
    /// Check a workflow document for structural problems
    Validate {
        workflow: PathBuf,
    },
    /// Inspect or clear a run's content cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum CacheCommands {
    /// List cached steps
    Show {
        #[arg(long)]
        run_dir: PathBuf,
    },
    /// Remove every cache entry (generated files are kept)
    Clear {
        #[arg(long)]
        run_dir: PathBuf,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default scenecast.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    // `generate` installs its own subscriber once the run directory is known.
    let _guard = if matches!(cli.command, Commands::Generate { .. }) {
        None
    } else {
        init_logging(&LogOptions {
            verbose: cli.verbose,
            format: cli.log_format,
            log_dir: None,
        })?
    };

    match &cli.command {
        Commands::Generate {
            workflow,
            skip_cache,
            output_dir,
            concurrency,
            run_dir,
        } => {
            let args = cmd::GenerateArgs {
                workflow: workflow.clone(),
                skip_cache: *skip_cache,
                output_dir: output_dir.clone(),
                concurrency: *concurrency,
                run_dir: run_dir.clone(),
            };
            cmd::cmd_generate(&project_dir, &cli, args).await?;
        }
        Commands::Timing { workflow } => cmd::cmd_timing(&project_dir, workflow)?,
        Commands::Validate { workflow } => cmd::cmd_validate(workflow)?,
        Commands::Cache { command } => cmd::cmd_cache(&project_dir, command.clone()).await?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
