//! Configuration view and validation commands (`scenecast config`).

use anyhow::Result;
use scenecast::scenecast_config::{CONFIG_DIR, CONFIG_FILE, ScenecastConfig, ScenecastToml};

use crate::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_dir = project_dir.join(CONFIG_DIR);
    let config_path = config_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Scenecast Configuration");
            println!("=======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                print_toml(&ScenecastToml::load(&config_path)?);

                // Show effective values (including env overrides)
                println!("Effective values (with env overrides):");
                let config = ScenecastConfig::new(project_dir.to_path_buf())?;
                println!("  output_dir = \"{}\"", config.output_dir.display());
                println!(
                    "  concurrency = {}",
                    config.dispatch_config().concurrency
                );
                println!(
                    "  FAL_KEY = {}",
                    if config.fal_key.is_some() { "set" } else { "not set" }
                );
                println!();
            } else {
                println!("No scenecast.toml found at {}", config_path.display());
                println!();
                println!("Using default configuration:");
                print_toml(&ScenecastToml::default());
                println!("Run 'scenecast config init' to create a scenecast.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No scenecast.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = ScenecastToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("scenecast.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !config_dir.exists() {
                std::fs::create_dir_all(&config_dir)?;
            }

            let toml = ScenecastToml::default();
            toml.save(&config_path)?;

            println!("Created scenecast.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [dispatch] concurrency, max_attempts, backoff");
            println!("  - [timing] padding, min_duration, default_duration");
            println!("  - [models] default model ids per step");
            println!("  - [pricing] \"model-pattern/*\" = price per call");
            println!();
        }
    }

    Ok(())
}

fn print_toml(toml: &ScenecastToml) {
    println!("[project]");
    if let Some(name) = &toml.project.name {
        println!("  name = \"{}\"", name);
    }
    println!("  output_dir = \"{}\"", toml.project.output_dir);
    println!();

    println!("[dispatch]");
    println!("  concurrency = {}", toml.dispatch.concurrency);
    println!("  max_attempts = {}", toml.dispatch.max_attempts);
    println!("  initial_backoff_ms = {}", toml.dispatch.initial_backoff_ms);
    println!("  max_backoff_ms = {}", toml.dispatch.max_backoff_ms);
    println!();

    println!("[timing]");
    println!("  padding = {}", toml.timing.padding);
    println!("  min_duration = {}", toml.timing.min_duration);
    println!("  default_duration = {}", toml.timing.default_duration);
    println!();

    println!("[models]");
    println!("  sound_effects = \"{}\"", toml.models.sound_effects);
    println!("  music = \"{}\"", toml.models.music);
    println!("  transcription = \"{}\"", toml.models.transcription);
    println!(
        "  consistency_reference = \"{}\"",
        toml.models.consistency_reference
    );
    println!("  consistency_edit = \"{}\"", toml.models.consistency_edit);
    println!();

    if !toml.pricing.is_empty() {
        println!("[pricing]");
        for (pattern, price) in &toml.pricing {
            println!("  \"{}\" = {}", pattern, price);
        }
        println!();
    }
}
